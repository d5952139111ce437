//! Matching Engine
//!
//! Pure snapshot-in/snapshot-out order matching. Every function here is a
//! synchronous transition from `(snapshot, event)` to a new snapshot; the
//! caller owns persistence, locking, and notifications.
//!
//! Rejections are silent no-fills: an execution that would overdraw the
//! balance or oversell a position returns no new state and leaves the
//! order open for a future tick.

use crate::types::{Order, OrderKind, OrderSide, OrderStatus, PaperState, Valuation};
use std::collections::HashMap;

// =============================================================================
// Order placement
// =============================================================================

/// Prepend a new order to the snapshot.
///
/// Touches nothing but the order list; balance and positions move only on
/// execution.
pub fn with_order(state: &PaperState, order: Order) -> PaperState {
    let mut next = state.clone();
    next.orders.insert(0, order);
    next
}

/// Replace one order's status, preserving list order.
pub fn with_order_status(state: &PaperState, order_id: &str, status: OrderStatus) -> PaperState {
    let mut next = state.clone();
    for order in &mut next.orders {
        if order.id == order_id {
            order.status = status;
        }
    }
    next
}

// =============================================================================
// Execution
// =============================================================================

/// Apply one fill to the snapshot, atomically.
///
/// Debits/credits cash by `quantity * price`, folds the quantity into the
/// position ledger (weighted-average blend on buys, straight decrement on
/// sells, entry removed at zero), and marks the order executed at `now`.
///
/// Returns `None` without touching anything when the buy would overdraw
/// the balance, or the sell exceeds the held quantity. A cost exactly
/// equal to the balance, or a sell of exactly the held quantity, fills.
pub fn apply_execution(
    state: &PaperState,
    order: &Order,
    price: f64,
    now: i64,
) -> Option<PaperState> {
    let cost = order.quantity * price;

    match order.side {
        OrderSide::Buy => {
            if state.balance < cost {
                return None;
            }
            let mut next = state.clone();
            next.balance -= cost;
            match next.positions.iter_mut().find(|p| p.symbol == order.symbol) {
                Some(position) => {
                    let new_qty = position.quantity + order.quantity;
                    position.avg_price =
                        (position.avg_price * position.quantity + price * order.quantity) / new_qty;
                    position.quantity = new_qty;
                }
                None => next.positions.push(crate::types::Position {
                    symbol: order.symbol.clone(),
                    quantity: order.quantity,
                    avg_price: price,
                }),
            }
            mark_executed(&mut next, &order.id, price, now);
            Some(next)
        }
        OrderSide::Sell => {
            let index = state.positions.iter().position(|p| p.symbol == order.symbol)?;
            if state.positions[index].quantity < order.quantity {
                return None;
            }
            let mut next = state.clone();
            next.positions[index].quantity -= order.quantity;
            if next.positions[index].quantity == 0.0 {
                next.positions.remove(index);
            }
            next.balance += cost;
            mark_executed(&mut next, &order.id, price, now);
            Some(next)
        }
    }
}

fn mark_executed(state: &mut PaperState, order_id: &str, price: f64, now: i64) {
    for order in &mut state.orders {
        if order.id == order_id {
            order.status = OrderStatus::Executed;
            order.executed_at = Some(now);
            order.executed_price = Some(price);
        }
    }
}

// =============================================================================
// Tick processing
// =============================================================================

/// Result of processing one tick: the advanced snapshot plus every order
/// that filled during the call, so callers can notify per fill without
/// re-diffing state.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub state: PaperState,
    pub executed: Vec<Order>,
}

/// Whether an order's fill condition is met at the given price.
///
/// Limit-style comparisons are inclusive and an order missing its limit
/// price never fills. The fill price is always the tick price itself, not
/// the limit.
pub fn should_fill(order: &Order, price: f64) -> bool {
    match order.kind {
        OrderKind::Market => order.status == OrderStatus::Pending,
        OrderKind::Limit | OrderKind::StopLimit => {
            if let Some(limit_price) = order.limit_price {
                match order.side {
                    OrderSide::Buy => price <= limit_price,
                    OrderSide::Sell => price >= limit_price,
                }
            } else {
                false
            }
        }
    }
}

/// Whether a pending stop-limit order's stop has been touched.
pub fn should_arm(order: &Order, price: f64) -> bool {
    if let Some(stop_price) = order.stop_price {
        match order.side {
            OrderSide::Buy => price >= stop_price,
            OrderSide::Sell => price <= stop_price,
        }
    } else {
        false
    }
}

/// Evaluate every open order for `symbol` against a new tick price.
///
/// Orders are scanned in their stored (newest-first) order, each one
/// against the state left by the previous fill, so earlier entries get
/// first claim on a limited balance. The scan walks the *input* snapshot:
/// a stop-limit armed by this tick is not eligible to fill until the next
/// one. Terminal orders and other symbols are never reconsidered.
pub fn process_tick(state: &PaperState, symbol: &str, price: f64) -> TickOutcome {
    let now = chrono::Utc::now().timestamp_millis();
    let mut next = state.clone();
    let mut executed = Vec::new();

    for order in &state.orders {
        if order.symbol != symbol || order.is_terminal() {
            continue;
        }

        match order.kind {
            OrderKind::Market => {
                if order.status == OrderStatus::Pending {
                    if let Some(after) = apply_execution(&next, order, price, now) {
                        if let Some(updated) = after.order(&order.id) {
                            executed.push(updated.clone());
                        }
                        next = after;
                    }
                }
            }
            OrderKind::Limit => {
                if should_fill(order, price) {
                    if let Some(after) = apply_execution(&next, order, price, now) {
                        if let Some(updated) = after.order(&order.id) {
                            executed.push(updated.clone());
                        }
                        next = after;
                    }
                }
            }
            OrderKind::StopLimit => {
                if order.stop_price.is_none() || order.limit_price.is_none() {
                    continue;
                }
                match order.status {
                    OrderStatus::Pending => {
                        if should_arm(order, price) {
                            next = with_order_status(&next, &order.id, OrderStatus::Active);
                        }
                    }
                    OrderStatus::Active => {
                        if should_fill(order, price) {
                            if let Some(after) = apply_execution(&next, order, price, now) {
                                if let Some(updated) = after.order(&order.id) {
                                    executed.push(updated.clone());
                                }
                                next = after;
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    TickOutcome {
        state: next,
        executed,
    }
}

// =============================================================================
// Valuation
// =============================================================================

/// Mark-to-market valuation of a snapshot against a price map.
///
/// Positions without a live price count toward equity at cost and
/// contribute nothing to unrealized P&L, so an unsubscribed symbol can
/// never corrupt the total. A zero price is treated as missing, matching
/// the feed's "no data" sentinel.
pub fn valuation(state: &PaperState, prices: &HashMap<String, f64>) -> Valuation {
    let mut equity = state.balance;
    let mut unrealized = 0.0;

    for position in &state.positions {
        match prices.get(&position.symbol) {
            Some(&price) if price > 0.0 => {
                equity += position.quantity * price;
                unrealized += (price - position.avg_price) * position.quantity;
            }
            _ => {
                equity += position.quantity * position.avg_price;
            }
        }
    }

    Valuation {
        equity,
        unrealized_pnl: unrealized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit_buy(limit: f64) -> Order {
        Order::limit(1, "AAPL".to_string(), OrderSide::Buy, 1.0, limit)
    }

    fn limit_sell(limit: f64) -> Order {
        Order::limit(1, "AAPL".to_string(), OrderSide::Sell, 1.0, limit)
    }

    #[test]
    fn test_limit_buy_fill_condition_inclusive() {
        let order = limit_buy(50.0);
        assert!(should_fill(&order, 45.0));
        assert!(should_fill(&order, 50.0));
        assert!(!should_fill(&order, 50.01));
    }

    #[test]
    fn test_limit_sell_fill_condition_inclusive() {
        let order = limit_sell(80.0);
        assert!(should_fill(&order, 85.0));
        assert!(should_fill(&order, 80.0));
        assert!(!should_fill(&order, 79.99));
    }

    #[test]
    fn test_limit_without_price_never_fills() {
        let mut order = limit_buy(50.0);
        order.limit_price = None;
        assert!(!should_fill(&order, 10.0));
    }

    #[test]
    fn test_stop_arming_is_inclusive() {
        let order = Order::stop_limit(1, "AAPL".to_string(), OrderSide::Buy, 1.0, 90.0, 95.0);
        assert!(should_arm(&order, 90.0));
        assert!(should_arm(&order, 91.0));
        assert!(!should_arm(&order, 89.99));

        let order = Order::stop_limit(1, "AAPL".to_string(), OrderSide::Sell, 1.0, 90.0, 85.0);
        assert!(should_arm(&order, 90.0));
        assert!(should_arm(&order, 89.0));
        assert!(!should_arm(&order, 90.01));
    }

    #[test]
    fn test_valuation_falls_back_to_cost() {
        let mut state = PaperState::new(100.0);
        state.positions.push(crate::types::Position {
            symbol: "AAPL".to_string(),
            quantity: 2.0,
            avg_price: 10.0,
        });
        state.positions.push(crate::types::Position {
            symbol: "TSLA".to_string(),
            quantity: 1.0,
            avg_price: 50.0,
        });

        let mut prices = HashMap::new();
        prices.insert("AAPL".to_string(), 15.0);

        let value = valuation(&state, &prices);
        // AAPL at live 15, TSLA at cost 50
        assert_eq!(value.equity, 100.0 + 30.0 + 50.0);
        assert_eq!(value.unrealized_pnl, 10.0);
    }

    #[test]
    fn test_valuation_zero_price_is_missing() {
        let mut state = PaperState::new(0.0);
        state.positions.push(crate::types::Position {
            symbol: "AAPL".to_string(),
            quantity: 3.0,
            avg_price: 20.0,
        });

        let mut prices = HashMap::new();
        prices.insert("AAPL".to_string(), 0.0);

        let value = valuation(&state, &prices);
        assert_eq!(value.equity, 60.0);
        assert_eq!(value.unrealized_pnl, 0.0);
    }
}
