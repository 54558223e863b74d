pub mod routes;

use crate::errors::PricerError;
use crate::state::AppState;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;

/// Build the HTTP surface. Shared by the binary and the route tests.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/trades", get(routes::list_trades).post(routes::create_trade))
        .route("/trades/{trade_id}", get(routes::get_trade).delete(routes::delete_trade))
        .route("/trades/{trade_id}/price", get(routes::price_trade))
        .route("/price", get(routes::ad_hoc_price))
        .route("/tradeprice", get(routes::price_trade_minimal))
        .route("/counters", get(routes::get_counters))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .with_state(state)
}

impl PricerError {
    pub fn status(&self) -> StatusCode {
        match self {
            PricerError::InvalidParameter { .. }
            | PricerError::InconsistentBounds(_)
            | PricerError::BadRequest(_)
            | PricerError::Parse(_) => StatusCode::BAD_REQUEST,
            PricerError::NotFound(_) => StatusCode::NOT_FOUND,
            PricerError::Cancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,
            PricerError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            PricerError::Config(_) | PricerError::Network(_) | PricerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for PricerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
