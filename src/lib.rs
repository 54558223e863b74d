//! Cliquet (ratchet) option pricing: a Monte Carlo engine over reset-period
//! GBM paths with local and global floor/cap policy, a closed-form cross-check,
//! and a small HTTP service around them.

pub mod config;
pub mod errors;
pub mod models;
pub mod request;
pub mod server;
pub mod state;
pub mod trades;

pub use errors::{PricerError, PricerResult};
pub use models::monte_carlo::{price, MonteCarloCliquet};
pub use models::payoff::{BoundsPolicy, Cap};
pub use request::PricingRequest;
