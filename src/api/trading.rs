//! Trading API
//!
//! Endpoints for the paper-trading account:
//!
//! - GET /api/trading/account - Load (or initialize) the account snapshot
//! - GET /api/trading/valuation - Mark-to-market equity and unrealized P&L
//! - POST /api/trading/orders - Place a new order
//! - DELETE /api/trading/orders/:id - Cancel an open order
//! - POST /api/trading/orders/clear - Drop the order history
//!
//! Every endpoint is scoped by the (userKey, challengeId) pair; an absent
//! userKey falls back to the shared guest slot.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::ApiResponse;
use crate::services::{OrderPlacement, TradingError};
use crate::types::{Order, PaperState, PlaceOrderRequest, Valuation};
use crate::AppState;

/// Create trading router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/account", get(get_account))
        .route("/valuation", get(get_valuation))
        .route("/orders", post(place_order))
        .route("/orders/:id", delete(cancel_order))
        .route("/orders/clear", post(clear_orders))
}

// =============================================================================
// Response Types
// =============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Convert TradingError to HTTP response.
impl IntoResponse for TradingError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = match &self {
            TradingError::AccountNotFound(_) => (StatusCode::NOT_FOUND, "ACCOUNT_NOT_FOUND"),
            TradingError::OrderNotFound(_) => (StatusCode::NOT_FOUND, "ORDER_NOT_FOUND"),
            TradingError::InsufficientFunds { .. } => {
                (StatusCode::BAD_REQUEST, "INSUFFICIENT_FUNDS")
            }
            TradingError::InsufficientHoldings { .. } => {
                (StatusCode::BAD_REQUEST, "INSUFFICIENT_HOLDINGS")
            }
            TradingError::InvalidOrder(_) => (StatusCode::BAD_REQUEST, "INVALID_ORDER"),
            TradingError::CannotCancelOrder(_) => (StatusCode::BAD_REQUEST, "CANNOT_CANCEL_ORDER"),
            TradingError::NoPriceData(_) => (StatusCode::SERVICE_UNAVAILABLE, "NO_PRICE_DATA"),
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}

// =============================================================================
// Query Parameters
// =============================================================================

/// Account scope for every trading endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountQuery {
    pub challenge_id: i64,
    /// Absent for anonymous sessions (guest slot).
    pub user_key: Option<String>,
    /// Starting balance when the account does not exist yet; the
    /// server default applies otherwise.
    pub initial_balance: Option<f64>,
}

impl AccountQuery {
    fn user_key(&self) -> &str {
        self.user_key.as_deref().unwrap_or("")
    }

    fn initial_balance(&self, state: &AppState) -> f64 {
        self.initial_balance
            .unwrap_or(state.config.default_initial_balance)
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /api/trading/account
///
/// Load the snapshot for a (user, challenge) pair, initializing it with
/// the challenge's starting balance on first access.
async fn get_account(
    State(state): State<AppState>,
    Query(query): Query<AccountQuery>,
) -> Json<ApiResponse<PaperState>> {
    let account = state.paper.load_account(
        query.user_key(),
        query.challenge_id,
        query.initial_balance(&state),
    );
    Json(ApiResponse { data: account })
}

/// GET /api/trading/valuation
///
/// Mark-to-market valuation against the feed's current price map.
async fn get_valuation(
    State(state): State<AppState>,
    Query(query): Query<AccountQuery>,
) -> Json<ApiResponse<Valuation>> {
    let prices = state.feed.all_prices();
    let valuation = state.paper.valuation(
        query.user_key(),
        query.challenge_id,
        query.initial_balance(&state),
        &prices,
    );
    Json(ApiResponse { data: valuation })
}

/// Order placement body: account scope plus the order parameters.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderBody {
    pub user_key: Option<String>,
    pub initial_balance: Option<f64>,
    #[serde(flatten)]
    pub order: PlaceOrderRequest,
}

/// POST /api/trading/orders
///
/// Validate and place an order. Market orders fill immediately at the
/// feed's last price; limit and stop-limit orders rest until a tick
/// triggers them.
async fn place_order(
    State(state): State<AppState>,
    Json(body): Json<PlaceOrderBody>,
) -> Result<Json<ApiResponse<OrderPlacement>>, TradingError> {
    state.feed.ensure_symbol(&body.order.symbol);
    let current_price = state.feed.get_price(&body.order.symbol);

    let placement = state.paper.place_order(
        body.user_key.as_deref().unwrap_or(""),
        body.order.challenge_id,
        body.initial_balance
            .unwrap_or(state.config.default_initial_balance),
        &body.order,
        current_price,
    )?;

    Ok(Json(ApiResponse { data: placement }))
}

/// DELETE /api/trading/orders/:id
///
/// Cancel an open order. Executed and already-cancelled orders are
/// rejected.
async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<AccountQuery>,
) -> Result<Json<ApiResponse<Order>>, TradingError> {
    let cancelled = state
        .paper
        .cancel_order(query.user_key(), query.challenge_id, &id)?;
    Ok(Json(ApiResponse { data: cancelled }))
}

/// POST /api/trading/orders/clear
///
/// Drop the account's order history, keeping balance and positions.
async fn clear_orders(
    State(state): State<AppState>,
    Query(query): Query<AccountQuery>,
) -> Result<Json<ApiResponse<PaperState>>, TradingError> {
    let account = state
        .paper
        .clear_orders(query.user_key(), query.challenge_id)?;
    Ok(Json(ApiResponse { data: account }))
}
