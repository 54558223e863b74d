/// Error taxonomy for the pricer.
/// Pricing errors are deterministic given the same inputs: a failed call
/// never yields a partially averaged price and is never worth retrying.
#[derive(Debug, thiserror::Error)]
pub enum PricerError {
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("inconsistent bounds: {0}")]
    InconsistentBounds(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("pricing cancelled after {paths_done} paths")]
    Cancelled { paths_done: u64 },

    #[error("pricing timed out after {0}s")]
    Timeout(u64),

    #[error("config error: {0}")]
    Config(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PricerError {
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        PricerError::InvalidParameter { name, reason: reason.into() }
    }
}

impl From<reqwest::Error> for PricerError {
    fn from(e: reqwest::Error) -> Self {
        PricerError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for PricerError {
    fn from(e: serde_json::Error) -> Self {
        PricerError::Parse(e.to_string())
    }
}

impl From<std::io::Error> for PricerError {
    fn from(e: std::io::Error) -> Self {
        PricerError::Internal(e.to_string())
    }
}

impl From<tokio::task::JoinError> for PricerError {
    fn from(e: tokio::task::JoinError) -> Self {
        PricerError::Internal(format!("pricing task failed: {e}"))
    }
}

pub type PricerResult<T> = Result<T, PricerError>;
