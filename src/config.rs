use crate::errors::{PricerError, PricerResult};
use crate::models::payoff::BoundsPolicy;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_port: u16,
    pub default_n_paths: u64,
    pub default_n_resets: u32,
    pub bounds_policy: BoundsPolicy,
    pub pricing_timeout_secs: u64,
    /// Fixed base seed for every pricing call. `None` draws a fresh seed per call.
    pub rng_seed: Option<u64>,
}

impl AppConfig {
    pub fn from_env() -> PricerResult<Self> {
        dotenvy::dotenv().ok();

        let server_port = env_var_or("SERVER_PORT", "8000")
            .parse::<u16>()
            .map_err(|e| PricerError::Config(format!("SERVER_PORT: {e}")))?;

        let default_n_paths = env_var_or("DEFAULT_N_PATHS", "50000")
            .parse::<u64>()
            .map_err(|e| PricerError::Config(format!("DEFAULT_N_PATHS: {e}")))?;

        let default_n_resets = env_var_or("DEFAULT_N_RESETS", "12")
            .parse::<u32>()
            .map_err(|e| PricerError::Config(format!("DEFAULT_N_RESETS: {e}")))?;

        let strict_bounds = env_var_or("STRICT_BOUNDS", "false")
            .parse::<bool>()
            .map_err(|e| PricerError::Config(format!("STRICT_BOUNDS: {e}")))?;

        let pricing_timeout_secs = env_var_or("PRICING_TIMEOUT_SECS", "30")
            .parse::<u64>()
            .map_err(|e| PricerError::Config(format!("PRICING_TIMEOUT_SECS: {e}")))?;

        let rng_seed = match std::env::var("RNG_SEED") {
            Ok(s) => Some(
                s.parse::<u64>()
                    .map_err(|e| PricerError::Config(format!("RNG_SEED: {e}")))?,
            ),
            Err(_) => None,
        };

        if default_n_paths == 0 {
            return Err(PricerError::Config("DEFAULT_N_PATHS must be > 0".into()));
        }
        if default_n_resets == 0 {
            return Err(PricerError::Config("DEFAULT_N_RESETS must be > 0".into()));
        }
        if pricing_timeout_secs == 0 {
            return Err(PricerError::Config("PRICING_TIMEOUT_SECS must be > 0".into()));
        }

        Ok(Self {
            server_port,
            default_n_paths,
            default_n_resets,
            bounds_policy: if strict_bounds {
                BoundsPolicy::Strict
            } else {
                BoundsPolicy::CapThenFloor
            },
            pricing_timeout_secs,
            rng_seed,
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_port: 8000,
            default_n_paths: 50_000,
            default_n_resets: 12,
            bounds_policy: BoundsPolicy::CapThenFloor,
            pricing_timeout_secs: 30,
            rng_seed: None,
        }
    }
}

fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
