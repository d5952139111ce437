//! Trading Types
//!
//! Types for the paper-trading engine: orders, positions, and the
//! per-challenge account snapshot that the matching engine advances.

use serde::{Deserialize, Serialize};

// =============================================================================
// Enums
// =============================================================================

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Order kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderKind {
    /// Execute on the next tick at the tick price
    Market,
    /// Execute when the tick price is at or better than the limit
    Limit,
    /// Arm at the stop price, then behave like a limit order
    StopLimit,
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderKind::Market => write!(f, "MARKET"),
            OrderKind::Limit => write!(f, "LIMIT"),
            OrderKind::StopLimit => write!(f, "STOP_LIMIT"),
        }
    }
}

/// Order status.
///
/// `Active` is reachable only by stop-limit orders whose stop has been
/// touched. `Executed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Waiting for its trigger condition
    Pending,
    /// Stop touched, limit leg live
    Active,
    /// Filled; balance and positions updated
    Executed,
    /// Cancelled externally
    Cancelled,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "PENDING"),
            OrderStatus::Active => write!(f, "ACTIVE"),
            OrderStatus::Executed => write!(f, "EXECUTED"),
            OrderStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

// =============================================================================
// Orders
// =============================================================================

/// A simulated order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Unique order ID
    pub id: String,
    /// Challenge this order belongs to
    pub challenge_id: i64,
    /// Symbol being traded (e.g., "AAPL", "BTC-USD")
    pub symbol: String,
    /// Buy or sell
    pub side: OrderSide,
    /// Order kind
    #[serde(rename = "type")]
    pub kind: OrderKind,
    /// Quantity to fill (strictly positive)
    pub quantity: f64,
    /// Limit price (limit and stop-limit orders)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<f64>,
    /// Stop/trigger price (stop-limit orders)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<f64>,
    /// Current order status
    pub status: OrderStatus,
    /// When the order was created (ms)
    pub created_at: i64,
    /// When the order was executed (ms)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<i64>,
    /// Price the order filled at
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_price: Option<f64>,
}

impl Order {
    /// Create a new market order.
    pub fn market(challenge_id: i64, symbol: String, side: OrderSide, quantity: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            challenge_id,
            symbol,
            side,
            kind: OrderKind::Market,
            quantity,
            limit_price: None,
            stop_price: None,
            status: OrderStatus::Pending,
            created_at: chrono::Utc::now().timestamp_millis(),
            executed_at: None,
            executed_price: None,
        }
    }

    /// Create a new limit order.
    pub fn limit(
        challenge_id: i64,
        symbol: String,
        side: OrderSide,
        quantity: f64,
        limit_price: f64,
    ) -> Self {
        let mut order = Self::market(challenge_id, symbol, side, quantity);
        order.kind = OrderKind::Limit;
        order.limit_price = Some(limit_price);
        order
    }

    /// Create a new stop-limit order.
    pub fn stop_limit(
        challenge_id: i64,
        symbol: String,
        side: OrderSide,
        quantity: f64,
        stop_price: f64,
        limit_price: f64,
    ) -> Self {
        let mut order = Self::market(challenge_id, symbol, side, quantity);
        order.kind = OrderKind::StopLimit;
        order.stop_price = Some(stop_price);
        order.limit_price = Some(limit_price);
        order
    }

    /// Whether the order is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, OrderStatus::Executed | OrderStatus::Cancelled)
    }
}

// =============================================================================
// Positions
// =============================================================================

/// A held position, one entry per symbol.
///
/// `avg_price` is the weighted-average cost across every buy that built the
/// position; sells reduce quantity without touching it. An entry reduced to
/// zero quantity is removed from the snapshot, never kept as a zero row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    /// Symbol held
    pub symbol: String,
    /// Quantity held (> 0 while the entry exists)
    pub quantity: f64,
    /// Weighted-average entry price
    pub avg_price: f64,
}

// =============================================================================
// Account snapshot
// =============================================================================

/// One user's one challenge's paper-trading state at an instant.
///
/// This is an immutable value: every engine operation returns a new
/// snapshot rather than mutating in place, and a rejected operation
/// returns no new snapshot at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperState {
    /// Cash balance
    pub balance: f64,
    /// Orders, newest first
    pub orders: Vec<Order>,
    /// Open positions, one per symbol
    pub positions: Vec<Position>,
}

impl PaperState {
    /// Create a fresh snapshot with a starting balance and no activity.
    pub fn new(initial_balance: f64) -> Self {
        Self {
            balance: initial_balance,
            orders: Vec::new(),
            positions: Vec::new(),
        }
    }

    /// Get the held position for a symbol, if any.
    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.symbol == symbol)
    }

    /// Get an order by id, if present.
    pub fn order(&self, order_id: &str) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == order_id)
    }

    /// Orders that are not yet terminal.
    pub fn open_orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter().filter(|o| !o.is_terminal())
    }
}

// =============================================================================
// Requests / reports
// =============================================================================

/// Parameters for placing a new order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub challenge_id: i64,
    pub symbol: String,
    pub side: OrderSide,
    #[serde(rename = "type")]
    pub kind: OrderKind,
    pub quantity: f64,
    #[serde(default)]
    pub limit_price: Option<f64>,
    #[serde(default)]
    pub stop_price: Option<f64>,
}

/// Point-in-time account valuation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Valuation {
    /// Cash plus the market value of every position
    pub equity: f64,
    /// Profit over cost basis, live-priced positions only
    pub unrealized_pnl: f64,
}

/// Advisory record of an executed trade, reported to the challenge backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRecord {
    pub challenge_id: i64,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub price: f64,
    pub pnl: f64,
}
