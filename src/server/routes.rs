use crate::errors::{PricerError, PricerResult};
use crate::models::Estimate;
use crate::request::PricingRequest;
use crate::state::{AppState, EstimatorKind};
use crate::trades::{NewTrade, Trade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use portable_atomic::Ordering;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

type QueryParams = HashMap<String, String>;

/// Quote returned by the pricing endpoints, echoing the inputs actually used.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PriceResponse {
    pub estimated_price: f64,
    pub std_error: Option<f64>,
    pub seed: Option<u64>,
    pub estimator: EstimatorKind,
    pub inputs_used: PricingRequest,
    pub as_of: String,
}

impl PriceResponse {
    fn new(estimate: Estimate, estimator: EstimatorKind, inputs_used: PricingRequest) -> Self {
        Self {
            estimated_price: estimate.price,
            std_error: estimate.std_error,
            seed: estimate.seed,
            estimator,
            inputs_used,
            as_of: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TradePriceResponse {
    pub trade_id: String,
    pub ticker: String,
    #[serde(flatten)]
    pub quote: PriceResponse,
}

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "time": chrono::Utc::now().to_rfc3339(),
    }))
}

/// GET /trades
pub async fn list_trades(State(state): State<Arc<AppState>>) -> Json<Vec<Trade>> {
    Json(state.trades.list().await)
}

/// POST /trades -- validate terms, assign an id, book in memory
pub async fn create_trade(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewTrade>,
) -> PricerResult<(StatusCode, Json<Trade>)> {
    body.terms.validate(state.config.bounds_policy)?;
    let trade = Trade::new(body.ticker, body.terms);
    state.trades.insert(trade.clone()).await?;
    state.counters.trades_registered.fetch_add(1, Ordering::Relaxed);
    Ok((StatusCode::CREATED, Json(trade)))
}

/// GET /trades/{trade_id}
pub async fn get_trade(
    State(state): State<Arc<AppState>>,
    Path(trade_id): Path<String>,
) -> PricerResult<Json<Trade>> {
    state.trades.require(&trade_id).await.map(Json)
}

/// DELETE /trades/{trade_id}
pub async fn delete_trade(
    State(state): State<Arc<AppState>>,
    Path(trade_id): Path<String>,
) -> PricerResult<Json<Trade>> {
    state.trades.remove(&trade_id).await.map(Json)
}

/// GET /trades/{trade_id}/price?S0=..&sigma=.. -- stored terms, spot/vol overridable
pub async fn price_trade(
    State(state): State<Arc<AppState>>,
    Path(trade_id): Path<String>,
    Query(params): Query<QueryParams>,
) -> PricerResult<Json<TradePriceResponse>> {
    let trade = state.trades.require(&trade_id).await?;
    let s0 = parse_param::<f64>(&params, "S0")?;
    let sigma = parse_param::<f64>(&params, "sigma")?;

    let request = trade.pricing_request(s0, sigma);
    let estimate = state.price(request.clone(), EstimatorKind::Mc).await?;

    Ok(Json(TradePriceResponse {
        trade_id: trade.trade_id,
        ticker: trade.ticker,
        quote: PriceResponse::new(estimate, EstimatorKind::Mc, request),
    }))
}

/// GET /price -- everything passed as query params, e.g.
/// /price?S0=100&r=0.03&sigma=0.2&T=1&n_resets=12&n_paths=50000&global_cap=30&local_cap=5
pub async fn ad_hoc_price(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> PricerResult<Json<PriceResponse>> {
    const REQUIRED: [&str; 5] = ["S0", "r", "sigma", "T", "n_resets"];
    let missing: SmallVec<[&str; 5]> =
        REQUIRED.iter().copied().filter(|k| !params.contains_key(*k)).collect();
    if !missing.is_empty() {
        return Err(PricerError::BadRequest(format!(
            "Missing required query params: {}",
            missing.join(", ")
        )));
    }

    let estimator = match params.get("estimator") {
        Some(s) => s.parse::<EstimatorKind>()?,
        None => EstimatorKind::Mc,
    };

    let request = PricingRequest {
        s0: require_param(&params, "S0")?,
        r: require_param(&params, "r")?,
        sigma: require_param(&params, "sigma")?,
        t: require_param(&params, "T")?,
        n_resets: require_param(&params, "n_resets")?,
        n_paths: parse_param(&params, "n_paths")?.unwrap_or(state.config.default_n_paths),
        local_floor: parse_param(&params, "local_floor")?.unwrap_or(0.0),
        local_cap: parse_param::<f64>(&params, "local_cap")?.into(),
        global_floor: parse_param(&params, "global_floor")?.unwrap_or(0.0),
        global_cap: parse_param::<f64>(&params, "global_cap")?.into(),
    };

    let estimate = state.price(request.clone(), estimator).await?;
    Ok(Json(PriceResponse::new(estimate, estimator, request)))
}

/// GET /tradeprice?trade_id=..&S0=..&sigma=..&r=..&T=..
/// Resets/paths come from the stored trade when it exists, else config defaults.
/// No floors or caps. Price rounded to cents.
pub async fn price_trade_minimal(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> PricerResult<Json<serde_json::Value>> {
    let trade_id = params
        .get("trade_id")
        .filter(|s| !s.is_empty())
        .cloned()
        .ok_or_else(|| PricerError::BadRequest("Missing required query param 'trade_id'".into()))?;

    let s0 = require_param(&params, "S0")?;
    let sigma = require_param(&params, "sigma")?;
    let r = require_param(&params, "r")?;
    let t = require_param(&params, "T")?;

    let (n_resets, n_paths) = match state.trades.get(&trade_id).await {
        Some(trade) => (trade.terms.n_resets, trade.terms.n_paths),
        None => (state.config.default_n_resets, state.config.default_n_paths),
    };

    let request = PricingRequest::new(s0, r, sigma, t, n_resets, n_paths);
    let estimate = state.price(request, EstimatorKind::Mc).await?;

    Ok(Json(serde_json::json!({
        "trade_id": trade_id,
        "price": round_cents(estimate.price),
    })))
}

/// GET /counters -- performance counters (lock-free reads)
pub async fn get_counters(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    use portable_atomic::Ordering::Relaxed;
    Json(serde_json::json!({
        "pricings_completed": state.counters.pricings_completed.load(Relaxed),
        "pricings_failed": state.counters.pricings_failed.load(Relaxed),
        "paths_simulated": state.counters.paths_simulated.load(Relaxed),
        "trades_registered": state.counters.trades_registered.load(Relaxed),
    }))
}

fn parse_param<T: FromStr>(params: &QueryParams, key: &str) -> PricerResult<Option<T>> {
    match params.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| PricerError::BadRequest(format!("Query param '{key}' must be a number"))),
    }
}

fn require_param<T: FromStr>(params: &QueryParams, key: &str) -> PricerResult<T> {
    parse_param(params, key)?
        .ok_or_else(|| PricerError::BadRequest(format!("Missing required query param '{key}'")))
}

#[inline]
fn round_cents(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
