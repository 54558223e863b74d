use crate::errors::{PricerError, PricerResult};
use crate::models::payoff::{BoundsPolicy, Cap};
use crate::models::{CancelToken, CliquetEstimator, Estimate};
use crate::request::PricingRequest;
use statrs::distribution::{ContinuousCDF, Normal};

/// Closed-form cliquet approximation.
///
/// Each period is priced as a single lognormal step from S0 over dt:
///
/// E[min(max(S_dt - S0, 0), cap)] = C(S0) - C(S0 + cap)
///
/// where C(K) = S0 * e^{r*dt} * Phi(d1) - K * Phi(d2) is the undiscounted call.
/// The period expectation is floored, multiplied by n_resets, bounded
/// globally and discounted once over T.
///
/// Exact for n_resets = 1 without floors or a global cap. For more periods it
/// ignores the drift of the reset strike and applies floors/global bounds to
/// expectations rather than to realizations.
pub struct ClosedFormCliquet {
    normal: Normal,
    policy: BoundsPolicy,
}

impl ClosedFormCliquet {
    pub fn new() -> Self {
        Self { normal: Normal::standard(), policy: BoundsPolicy::default() }
    }

    pub fn with_policy(mut self, policy: BoundsPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn price(&self, request: &PricingRequest) -> PricerResult<f64> {
        request.validate(self.policy)?;

        let dt = request.dt();
        let mut period = self.undiscounted_call(request.s0, request.s0, request.r, request.sigma, dt);
        if let Cap::At(cap) = request.local_cap {
            period -= self.undiscounted_call(request.s0, request.s0 + cap, request.r, request.sigma, dt);
        }
        let period = request.local_bounds().apply(period.max(0.0));

        let total = request.global_bounds().apply(period * request.n_resets as f64);
        let price = request.discount_factor() * total;
        if !price.is_finite() {
            return Err(PricerError::invalid("request", format!("closed-form price overflows f64: {price}")));
        }
        Ok(price)
    }

    /// E[max(S_dt - K, 0)] for a lognormal step from `spot`.
    fn undiscounted_call(&self, spot: f64, strike: f64, r: f64, sigma: f64, dt: f64) -> f64 {
        let forward = spot * (r * dt).exp();
        let vol = sigma * dt.sqrt();
        if vol < 1e-12 {
            return (forward - strike).max(0.0);
        }
        let d1 = ((spot / strike).ln() + (r + 0.5 * sigma * sigma) * dt) / vol;
        let d2 = d1 - vol;
        forward * self.normal.cdf(d1) - strike * self.normal.cdf(d2)
    }
}

impl Default for ClosedFormCliquet {
    fn default() -> Self {
        Self::new()
    }
}

impl CliquetEstimator for ClosedFormCliquet {
    #[inline]
    fn name(&self) -> &'static str {
        "closed_form"
    }

    fn estimate(&self, request: &PricingRequest, _cancel: &CancelToken) -> PricerResult<Estimate> {
        Ok(Estimate {
            price: self.price(request)?,
            std_error: None,
            n_paths: None,
            seed: None,
        })
    }
}
