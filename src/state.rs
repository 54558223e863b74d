use crate::config::AppConfig;
use crate::errors::{PricerError, PricerResult};
use crate::models::closed_form::ClosedFormCliquet;
use crate::models::monte_carlo::MonteCarloCliquet;
use crate::models::{CancelToken, CliquetEstimator, Estimate};
use crate::request::PricingRequest;
use crate::trades::TradeRegistry;
use portable_atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

// ── Estimator selection ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    #[default]
    Mc,
    ClosedForm,
}

impl std::str::FromStr for EstimatorKind {
    type Err = PricerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mc" => Ok(Self::Mc),
            "closed_form" => Ok(Self::ClosedForm),
            other => Err(PricerError::BadRequest(format!(
                "unknown estimator '{other}' (expected 'mc' or 'closed_form')"
            ))),
        }
    }
}

impl std::fmt::Display for EstimatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mc => write!(f, "mc"),
            Self::ClosedForm => write!(f, "closed_form"),
        }
    }
}

// ── Performance Counters (lock-free) ──

pub struct PerfCounters {
    pub pricings_completed: AtomicU64,
    pub pricings_failed: AtomicU64,
    pub paths_simulated: AtomicU64,
    pub trades_registered: AtomicU64,
}

impl PerfCounters {
    pub fn new() -> Self {
        Self {
            pricings_completed: AtomicU64::new(0),
            pricings_failed: AtomicU64::new(0),
            paths_simulated: AtomicU64::new(0),
            trades_registered: AtomicU64::new(0),
        }
    }
}

impl Default for PerfCounters {
    fn default() -> Self {
        Self::new()
    }
}

// ── Application shared state ──

pub struct AppState {
    pub config: AppConfig,
    pub trades: TradeRegistry,
    pub counters: PerfCounters,
    /// One permit: pricing calls run one at a time.
    pricing_gate: Semaphore,
}

impl AppState {
    pub fn new(config: AppConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            trades: TradeRegistry::new(),
            counters: PerfCounters::new(),
            pricing_gate: Semaphore::new(1),
        })
    }

    fn estimator(&self, kind: EstimatorKind) -> Box<dyn CliquetEstimator> {
        let policy = self.config.bounds_policy;
        match kind {
            EstimatorKind::Mc => {
                let engine = match self.config.rng_seed {
                    Some(seed) => MonteCarloCliquet::new(seed),
                    None => MonteCarloCliquet::from_entropy(),
                };
                Box::new(engine.with_policy(policy))
            }
            EstimatorKind::ClosedForm => Box::new(ClosedFormCliquet::new().with_policy(policy)),
        }
    }

    /// Price on the blocking pool, serialized behind the pricing gate and
    /// bounded by the configured timeout. A timed-out run is cancelled and
    /// drained before the gate is released.
    pub async fn price(&self, request: PricingRequest, kind: EstimatorKind) -> PricerResult<Estimate> {
        let _permit = self
            .pricing_gate
            .acquire()
            .await
            .map_err(|e| PricerError::Internal(format!("pricing gate closed: {e}")))?;

        let estimator = self.estimator(kind);
        let name = estimator.name();
        let n_resets = request.n_resets;
        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();
        let started = Instant::now();

        let mut handle =
            tokio::task::spawn_blocking(move || estimator.estimate(&request, &worker_cancel));

        let timeout_secs = self.config.pricing_timeout_secs;
        let result = match tokio::time::timeout(Duration::from_secs(timeout_secs), &mut handle).await {
            Ok(joined) => joined.map_err(PricerError::from).and_then(|r| r),
            Err(_) => {
                cancel.cancel();
                if let Err(e) = handle.await {
                    tracing::warn!(error = %e, "pricing task failed while draining after timeout");
                }
                Err(PricerError::Timeout(timeout_secs))
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(est) => {
                self.counters.pricings_completed.fetch_add(1, Ordering::Relaxed);
                if let Some(n) = est.n_paths {
                    self.counters.paths_simulated.fetch_add(n, Ordering::Relaxed);
                }
                tracing::info!(
                    estimator = name,
                    n_resets,
                    n_paths = ?est.n_paths,
                    seed = ?est.seed,
                    price = est.price,
                    elapsed_ms,
                    "pricing complete"
                );
            }
            Err(e) => {
                self.counters.pricings_failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(estimator = name, elapsed_ms, error = %e, "pricing failed");
            }
        }

        result
    }
}
