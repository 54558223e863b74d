use crate::errors::{PricerError, PricerResult};
use crate::request::PricingRequest;
use std::collections::HashMap;
use tokio::sync::RwLock;

const TRADE_ID_LEN: usize = 12;

/// A booked cliquet. `terms` carries the stored market inputs; `S0` and
/// `sigma` move often and can be overridden per pricing call.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Trade {
    pub trade_id: String,
    pub ticker: String,
    #[serde(flatten)]
    pub terms: PricingRequest,
}

impl Trade {
    pub fn new(ticker: impl Into<String>, terms: PricingRequest) -> Self {
        Self {
            trade_id: generate_trade_id(),
            ticker: ticker.into(),
            terms,
        }
    }

    /// The demo book entry seeded at startup.
    pub fn demo() -> Self {
        Self::new("XYZ", PricingRequest::new(100.0, 0.03, 0.2, 1.0, 12, 100_000))
    }

    /// Pricing request with the stored terms and optional spot/vol overrides.
    pub fn pricing_request(&self, s0_override: Option<f64>, sigma_override: Option<f64>) -> PricingRequest {
        PricingRequest {
            s0: s0_override.unwrap_or(self.terms.s0),
            sigma: sigma_override.unwrap_or(self.terms.sigma),
            ..self.terms.clone()
        }
    }
}

/// Body of `POST /trades`.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct NewTrade {
    pub ticker: String,
    #[serde(flatten)]
    pub terms: PricingRequest,
}

/// 12 alphanumeric characters from a v4 UUID.
pub fn generate_trade_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(TRADE_ID_LEN);
    id
}

/// In-memory trade book. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct TradeRegistry {
    trades: RwLock<HashMap<String, Trade>>,
}

impl TradeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, trade: Trade) -> PricerResult<()> {
        let mut trades = self.trades.write().await;
        if trades.contains_key(&trade.trade_id) {
            return Err(PricerError::BadRequest(format!("trade '{}' already exists", trade.trade_id)));
        }
        tracing::info!(trade_id = %trade.trade_id, ticker = %trade.ticker, "trade registered");
        trades.insert(trade.trade_id.clone(), trade);
        Ok(())
    }

    pub async fn get(&self, trade_id: &str) -> Option<Trade> {
        self.trades.read().await.get(trade_id).cloned()
    }

    pub async fn require(&self, trade_id: &str) -> PricerResult<Trade> {
        self.get(trade_id)
            .await
            .ok_or_else(|| PricerError::NotFound(format!("Trade '{trade_id}' not found")))
    }

    /// All trades, ordered by id so listings are stable.
    pub async fn list(&self) -> Vec<Trade> {
        let mut all: Vec<Trade> = self.trades.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.trade_id.cmp(&b.trade_id));
        all
    }

    pub async fn remove(&self, trade_id: &str) -> PricerResult<Trade> {
        let removed = self.trades.write().await.remove(trade_id);
        match removed {
            Some(t) => {
                tracing::info!(trade_id, "trade removed");
                Ok(t)
            }
            None => Err(PricerError::NotFound(format!("Trade '{trade_id}' not found"))),
        }
    }
}
