//! Paper Trading Service
//!
//! Owns the per-(user, challenge) account snapshots: load-or-initialize,
//! order submission with pre-flight checks, external cancellation, and
//! price-tick processing. Snapshots live behind per-account mutexes over
//! an injected `KvStore`, with every state change persisted as a whole
//! snapshot before the lock is released.
//!
//! Balance changes are pushed to the challenge backend best-effort; a
//! failed push never blocks or rolls back a local transition.

use crate::services::engine;
use crate::services::store::KvStore;
use crate::types::{
    Order, OrderKind, OrderSide, OrderStatus, PaperState, PlaceOrderRequest, TradeRecord,
    Valuation,
};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Namespace prefix for snapshot storage keys.
pub const STORAGE_NAMESPACE: &str = "specter_paper_v1";

/// Storage key for one (user, challenge) pair. An empty user key maps to
/// "guest" so anonymous sessions still get a stable slot.
pub fn storage_key(user_key: &str, challenge_id: i64) -> String {
    let user = if user_key.is_empty() { "guest" } else { user_key };
    format!("{}::{}::{}", STORAGE_NAMESPACE, user, challenge_id)
}

/// Shape-check a stored snapshot. Anything that does not deserialize is
/// treated as absent so a corrupted value reinitializes instead of
/// crashing the account.
fn parse_state(raw: &str) -> Option<PaperState> {
    match serde_json::from_str::<PaperState>(raw) {
        Ok(state) => Some(state),
        Err(e) => {
            warn!("Discarding malformed snapshot: {}", e);
            None
        }
    }
}

/// Trading service errors, surfaced at the submission boundary.
///
/// The matching engine itself never reports these: an open order that
/// cannot currently fill simply stays open.
#[derive(Debug, Error)]
pub enum TradingError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: f64, available: f64 },

    #[error("Insufficient holdings: requested {requested} {symbol}, holding {held}")]
    InsufficientHoldings {
        symbol: String,
        requested: f64,
        held: f64,
    },

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Order cannot be cancelled: status is {0}")]
    CannotCancelOrder(String),

    #[error("No price data available for {0}")]
    NoPriceData(String),
}

/// Best-effort outward sync to the challenge backend.
#[derive(Clone)]
pub struct ChallengeSync {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ChallengeSync {
    pub fn new(base_url: String, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            token,
        }
    }

    /// Push the new cash balance for a challenge. Fire-and-forget.
    fn push_balance(&self, challenge_id: i64, balance: f64) {
        let sync = self.clone();
        tokio::spawn(async move {
            let mut request = sync
                .client
                .post(format!("{}/api/challenge/update_balance", sync.base_url))
                .json(&serde_json::json!({
                    "challengeId": challenge_id,
                    "currentBalance": balance,
                }));
            if let Some(ref token) = sync.token {
                request = request.bearer_auth(token);
            }
            if let Err(e) = request.send().await {
                debug!("Balance sync failed for challenge {}: {}", challenge_id, e);
            }
        });
    }

    /// Report an executed trade. Fire-and-forget.
    fn push_trade(&self, record: TradeRecord) {
        let sync = self.clone();
        tokio::spawn(async move {
            let mut request = sync
                .client
                .post(format!("{}/api/trade/execute", sync.base_url))
                .json(&record);
            if let Some(ref token) = sync.token {
                request = request.bearer_auth(token);
            }
            if let Err(e) = request.send().await {
                debug!(
                    "Trade record failed for challenge {}: {}",
                    record.challenge_id, e
                );
            }
        });
    }
}

/// Result of an order submission: the order as it now stands, any
/// immediate fills, and the advanced snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPlacement {
    pub order: Order,
    pub executed: Vec<Order>,
    pub state: PaperState,
}

/// Paper trading service.
pub struct PaperTradingService {
    /// Loaded accounts keyed by storage key. The per-account mutex is the
    /// single-writer guarantee: one mutation at a time per snapshot, each
    /// receiving the exact output of the previous one.
    accounts: DashMap<String, Arc<Mutex<PaperState>>>,
    /// Snapshot store.
    store: Arc<dyn KvStore>,
    /// Outward challenge sync (absent in tests and standalone runs).
    sync: Option<ChallengeSync>,
    /// Set while a tick is being processed; overlapping ticks are skipped.
    tick_in_flight: AtomicBool,
    /// Broadcast channel for fills (API/TUI consumers).
    fill_tx: broadcast::Sender<Order>,
}

impl PaperTradingService {
    /// Create a new service over a snapshot store.
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        let (fill_tx, _) = broadcast::channel(1024);
        Self {
            accounts: DashMap::new(),
            store,
            sync: None,
            tick_in_flight: AtomicBool::new(false),
            fill_tx,
        }
    }

    /// Create a new service that also pushes balances and trade records
    /// to the challenge backend.
    pub fn with_sync(store: Arc<dyn KvStore>, sync: ChallengeSync) -> Self {
        let mut service = Self::new(store);
        service.sync = Some(sync);
        service
    }

    /// Subscribe to order fills.
    pub fn subscribe_fills(&self) -> broadcast::Receiver<Order> {
        self.fill_tx.subscribe()
    }

    // ==========================================================================
    // Account access
    // ==========================================================================

    /// Load the snapshot for a (user, challenge) pair, creating and
    /// persisting a fresh one when nothing valid is stored.
    pub fn load_account(
        &self,
        user_key: &str,
        challenge_id: i64,
        initial_balance: f64,
    ) -> PaperState {
        let key = storage_key(user_key, challenge_id);
        let account = self.entry(&key, initial_balance);
        let state = account.lock().unwrap();
        state.clone()
    }

    /// Mark-to-market valuation for an account against a price map.
    pub fn valuation(
        &self,
        user_key: &str,
        challenge_id: i64,
        initial_balance: f64,
        prices: &HashMap<String, f64>,
    ) -> Valuation {
        let state = self.load_account(user_key, challenge_id, initial_balance);
        engine::valuation(&state, prices)
    }

    /// Get or create the cached account entry, falling back to the store
    /// and then to a fresh snapshot.
    fn entry(&self, key: &str, initial_balance: f64) -> Arc<Mutex<PaperState>> {
        self.accounts
            .entry(key.to_string())
            .or_insert_with(|| {
                let state = match self.store.get(key).and_then(|raw| parse_state(&raw)) {
                    Some(state) => state,
                    None => {
                        let fresh = PaperState::new(initial_balance);
                        self.persist(key, &fresh);
                        info!("Initialized paper account {}", key);
                        fresh
                    }
                };
                Arc::new(Mutex::new(state))
            })
            .clone()
    }

    /// Like `entry`, but never creates an account that does not exist.
    fn try_entry(&self, key: &str) -> Option<Arc<Mutex<PaperState>>> {
        if let Some(account) = self.accounts.get(key) {
            return Some(account.clone());
        }
        let state = parse_state(&self.store.get(key)?)?;
        Some(
            self.accounts
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(state)))
                .clone(),
        )
    }

    fn persist(&self, key: &str, state: &PaperState) {
        match serde_json::to_string(state) {
            Ok(json) => self.store.set(key, &json),
            Err(e) => warn!("Failed to serialize snapshot {}: {}", key, e),
        }
    }

    // ==========================================================================
    // Order submission
    // ==========================================================================

    /// Validate and place an order. Market orders are matched immediately
    /// against the supplied live price; everything else rests until a
    /// tick triggers it.
    pub fn place_order(
        &self,
        user_key: &str,
        challenge_id: i64,
        initial_balance: f64,
        request: &PlaceOrderRequest,
        current_price: Option<f64>,
    ) -> Result<OrderPlacement, TradingError> {
        validate_request(request)?;

        let market_price = match request.kind {
            OrderKind::Market => Some(
                current_price.ok_or_else(|| TradingError::NoPriceData(request.symbol.clone()))?,
            ),
            _ => None,
        };

        let key = storage_key(user_key, challenge_id);
        let account = self.entry(&key, initial_balance);
        let mut state = account.lock().unwrap();

        preflight(&state, request, market_price)?;

        let order = build_order(request);
        let order_id = order.id.clone();
        let mut next = engine::with_order(&state, order);
        let mut executed = Vec::new();

        if let Some(price) = market_price {
            let outcome = engine::process_tick(&next, &request.symbol, price);
            next = outcome.state;
            executed = outcome.executed;
        }

        self.persist(&key, &next);
        *state = next.clone();
        drop(state);

        let placed = next
            .order(&order_id)
            .cloned()
            .ok_or_else(|| TradingError::OrderNotFound(order_id))?;

        info!(
            "Placed {} {} order for {} {} (challenge {})",
            placed.side, placed.kind, placed.quantity, placed.symbol, challenge_id
        );

        self.notify_fills(&executed, next.balance, true);

        Ok(OrderPlacement {
            order: placed,
            executed,
            state: next,
        })
    }

    /// Cancel an open order. Terminal orders cannot be cancelled.
    pub fn cancel_order(
        &self,
        user_key: &str,
        challenge_id: i64,
        order_id: &str,
    ) -> Result<Order, TradingError> {
        let key = storage_key(user_key, challenge_id);
        let account = self
            .try_entry(&key)
            .ok_or_else(|| TradingError::AccountNotFound(key.clone()))?;
        let mut state = account.lock().unwrap();

        {
            let order = state
                .order(order_id)
                .ok_or_else(|| TradingError::OrderNotFound(order_id.to_string()))?;
            if order.is_terminal() {
                return Err(TradingError::CannotCancelOrder(order.status.to_string()));
            }
        }

        let next = engine::with_order_status(&state, order_id, OrderStatus::Cancelled);
        self.persist(&key, &next);
        *state = next;

        let cancelled = state
            .order(order_id)
            .cloned()
            .ok_or_else(|| TradingError::OrderNotFound(order_id.to_string()))?;
        info!("Cancelled order {}", order_id);
        Ok(cancelled)
    }

    /// Drop an account's order history, keeping its balance and
    /// positions.
    pub fn clear_orders(
        &self,
        user_key: &str,
        challenge_id: i64,
    ) -> Result<PaperState, TradingError> {
        let key = storage_key(user_key, challenge_id);
        let account = self
            .try_entry(&key)
            .ok_or_else(|| TradingError::AccountNotFound(key.clone()))?;
        let mut state = account.lock().unwrap();

        let mut next = state.clone();
        next.orders.clear();
        self.persist(&key, &next);
        *state = next.clone();

        info!("Cleared order history for {}", key);
        Ok(next)
    }

    // ==========================================================================
    // Tick processing
    // ==========================================================================

    /// Feed one price tick into every loaded account.
    ///
    /// A tick arriving while another is still being processed is skipped,
    /// not queued, so at most one writer ever walks the accounts.
    /// Returns (accounts_updated, orders_executed).
    pub fn process_symbol_tick(&self, symbol: &str, price: f64) -> (usize, usize) {
        if self
            .tick_in_flight
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            debug!("Tick for {} overlapped a running tick, skipping", symbol);
            return (0, 0);
        }

        let accounts: Vec<(String, Arc<Mutex<PaperState>>)> = self
            .accounts
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut accounts_updated = 0;
        let mut orders_executed = 0;

        for (key, account) in accounts {
            let mut state = account.lock().unwrap();
            let outcome = engine::process_tick(&state, symbol, price);

            if outcome.executed.is_empty() && outcome.state == *state {
                continue;
            }

            self.persist(&key, &outcome.state);
            *state = outcome.state.clone();
            drop(state);

            accounts_updated += 1;
            orders_executed += outcome.executed.len();
            self.notify_fills(&outcome.executed, outcome.state.balance, false);
        }

        if orders_executed > 0 {
            debug!(
                "Tick {} @ {} executed {} orders across {} accounts",
                symbol, price, orders_executed, accounts_updated
            );
        }

        self.tick_in_flight.store(false, Ordering::Release);
        (accounts_updated, orders_executed)
    }

    /// Broadcast fills locally and sync the challenge backend. Trade
    /// records go out only for submission-time fills; tick-driven fills
    /// push the balance alone.
    fn notify_fills(&self, executed: &[Order], balance: f64, record_trades: bool) {
        for fill in executed {
            info!(
                "Executed {} {} {} @ {}",
                fill.side,
                fill.quantity,
                fill.symbol,
                fill.executed_price.unwrap_or_default()
            );
            let _ = self.fill_tx.send(fill.clone());
        }

        if let (Some(sync), Some(first)) = (&self.sync, executed.first()) {
            sync.push_balance(first.challenge_id, balance);
            if record_trades {
                for fill in executed {
                    sync.push_trade(TradeRecord {
                        challenge_id: fill.challenge_id,
                        symbol: fill.symbol.clone(),
                        side: fill.side,
                        quantity: fill.quantity,
                        price: fill.executed_price.unwrap_or_default(),
                        pnl: 0.0,
                    });
                }
            }
        }
    }
}

// =============================================================================
// Submission validation
// =============================================================================

fn validate_request(request: &PlaceOrderRequest) -> Result<(), TradingError> {
    if request.symbol.is_empty() {
        return Err(TradingError::InvalidOrder("symbol is required".to_string()));
    }
    if !request.quantity.is_finite() || request.quantity <= 0.0 {
        return Err(TradingError::InvalidOrder(
            "quantity must be positive".to_string(),
        ));
    }
    match request.kind {
        OrderKind::Market => {}
        OrderKind::Limit => {
            if !matches!(request.limit_price, Some(p) if p > 0.0) {
                return Err(TradingError::InvalidOrder(
                    "limit order requires a positive limit price".to_string(),
                ));
            }
        }
        OrderKind::StopLimit => {
            if !matches!(request.limit_price, Some(p) if p > 0.0)
                || !matches!(request.stop_price, Some(p) if p > 0.0)
            {
                return Err(TradingError::InvalidOrder(
                    "stop-limit order requires positive stop and limit prices".to_string(),
                ));
            }
        }
    }
    Ok(())
}

/// Submission-boundary checks. The engine re-checks at fill time; this is
/// where the user gets a clear error instead of a silently resting order.
fn preflight(
    state: &PaperState,
    request: &PlaceOrderRequest,
    market_price: Option<f64>,
) -> Result<(), TradingError> {
    match request.side {
        OrderSide::Buy => {
            // Worst acceptable fill: the limit for limit-style orders,
            // the live price for market orders
            let reference = match request.kind {
                OrderKind::Market => market_price,
                OrderKind::Limit | OrderKind::StopLimit => request.limit_price,
            };
            if let Some(price) = reference {
                let needed = request.quantity * price;
                if needed > state.balance {
                    return Err(TradingError::InsufficientFunds {
                        needed,
                        available: state.balance,
                    });
                }
            }
        }
        OrderSide::Sell => {
            let held = state
                .position(&request.symbol)
                .map(|p| p.quantity)
                .unwrap_or(0.0);
            if held < request.quantity {
                return Err(TradingError::InsufficientHoldings {
                    symbol: request.symbol.clone(),
                    requested: request.quantity,
                    held,
                });
            }
        }
    }
    Ok(())
}

fn build_order(request: &PlaceOrderRequest) -> Order {
    match request.kind {
        OrderKind::Market => Order::market(
            request.challenge_id,
            request.symbol.clone(),
            request.side,
            request.quantity,
        ),
        OrderKind::Limit => Order::limit(
            request.challenge_id,
            request.symbol.clone(),
            request.side,
            request.quantity,
            request.limit_price.unwrap_or_default(),
        ),
        OrderKind::StopLimit => Order::stop_limit(
            request.challenge_id,
            request.symbol.clone(),
            request.side,
            request.quantity,
            request.stop_price.unwrap_or_default(),
            request.limit_price.unwrap_or_default(),
        ),
    }
}
