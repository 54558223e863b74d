pub mod closed_form;
pub mod monte_carlo;
pub mod payoff;

use crate::errors::PricerResult;
use crate::request::PricingRequest;
use portable_atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// All cliquet estimators implement this trait.
/// estimate() must not mutate shared state: the same estimator can serve
/// any number of sequential calls. Send + Sync for use from the blocking pool.
pub trait CliquetEstimator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Discounted expected payoff for `request`.
    /// Validates before doing any work; honours `cancel` where the work is long.
    fn estimate(&self, request: &PricingRequest, cancel: &CancelToken) -> PricerResult<Estimate>;
}

/// Result of one pricing call.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Estimate {
    pub price: f64,
    /// Standard error of the discounted mean. `None` for closed-form estimates.
    pub std_error: Option<f64>,
    /// Paths simulated. `None` for closed-form estimates.
    pub n_paths: Option<u64>,
    /// Base seed of the random stream, enough to reproduce the run.
    pub seed: Option<u64>,
}

/// Cooperative cancellation flag shared between a caller and a running estimator.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
