//! Market API
//!
//! Read-only endpoints over the simulated feed:
//!
//! - GET /api/market/price/:symbol - Last tick price
//! - GET /api/market/candles/:symbol - Daily candle history
//! - GET /api/market/signal/:symbol - Moving-average advisor signal

use crate::api::ApiResponse;
use crate::error::{AppError, Result};
use crate::services::signals;
use crate::types::{Candle, TradeSignal};
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

/// Create market router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/price/:symbol", get(get_price))
        .route("/candles/:symbol", get(get_candles))
        .route("/signal/:symbol", get(get_signal))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceResponse {
    pub symbol: String,
    pub price: f64,
    pub timestamp: i64,
}

/// GET /api/market/price/:symbol
///
/// Last tick price for a symbol, seeding it on first sight.
async fn get_price(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<PriceResponse>>> {
    state.feed.ensure_symbol(&symbol);
    let price = state
        .feed
        .get_price(&symbol)
        .ok_or_else(|| AppError::NotFound(format!("No price data for {}", symbol)))?;

    Ok(Json(ApiResponse {
        data: PriceResponse {
            symbol,
            price,
            timestamp: chrono::Utc::now().timestamp_millis(),
        },
    }))
}

/// GET /api/market/candles/:symbol
async fn get_candles(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Json<ApiResponse<Vec<Candle>>> {
    state.feed.ensure_symbol(&symbol);
    let candles = state.feed.history(&symbol).unwrap_or_default();
    Json(ApiResponse { data: candles })
}

/// GET /api/market/signal/:symbol
///
/// Advisory crossover signal over the symbol's candle history.
async fn get_signal(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Json<ApiResponse<TradeSignal>> {
    state.feed.ensure_symbol(&symbol);
    let candles = state.feed.history(&symbol).unwrap_or_default();
    let signal = signals::crossover_signal(&candles);
    Json(ApiResponse { data: signal })
}
