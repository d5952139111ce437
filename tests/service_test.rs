//! Tests for the paper trading service and snapshot persistence
//!
//! Tests cover:
//! - Load-or-initialize semantics and the storage key scheme
//! - Snapshot save/load round-trips and corruption recovery
//! - Submission-boundary validation and pre-flight rejections
//! - Immediate market fills and resting-order tick processing
//! - Cancellation and history clearing
//! - Fill broadcast

use specter::services::paper::{storage_key, PaperTradingService, TradingError};
use specter::services::store::{KvStore, MemoryKv, SqliteKv};
use specter::types::*;
use std::collections::HashMap;
use std::sync::Arc;

const USER: &str = "trader@example.com";
const CHALLENGE: i64 = 7;
const BALANCE: f64 = 1000.0;

fn service() -> (PaperTradingService, Arc<MemoryKv>) {
    let store = Arc::new(MemoryKv::new());
    (PaperTradingService::new(store.clone()), store)
}

fn market_request(symbol: &str, side: OrderSide, quantity: f64) -> PlaceOrderRequest {
    PlaceOrderRequest {
        challenge_id: CHALLENGE,
        symbol: symbol.to_string(),
        side,
        kind: OrderKind::Market,
        quantity,
        limit_price: None,
        stop_price: None,
    }
}

fn limit_request(symbol: &str, side: OrderSide, quantity: f64, limit: f64) -> PlaceOrderRequest {
    PlaceOrderRequest {
        challenge_id: CHALLENGE,
        symbol: symbol.to_string(),
        side,
        kind: OrderKind::Limit,
        quantity,
        limit_price: Some(limit),
        stop_price: None,
    }
}

// =============================================================================
// Persistence Tests
// =============================================================================

mod persistence_tests {
    use super::*;

    #[test]
    fn test_first_load_initializes_and_persists() {
        let (service, store) = service();

        let account = service.load_account(USER, CHALLENGE, BALANCE);
        assert_eq!(account.balance, BALANCE);
        assert!(account.orders.is_empty());
        assert!(account.positions.is_empty());

        // The fresh snapshot is written through immediately
        let raw = store.get(&storage_key(USER, CHALLENGE)).unwrap();
        let stored: PaperState = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored, account);
    }

    #[test]
    fn test_snapshot_survives_service_restart() {
        let store = Arc::new(MemoryKv::new());
        {
            let service = PaperTradingService::new(store.clone());
            service
                .place_order(USER, CHALLENGE, BALANCE, &market_request("AAPL", OrderSide::Buy, 2.0), Some(100.0))
                .unwrap();
        }

        let service = PaperTradingService::new(store);
        let account = service.load_account(USER, CHALLENGE, BALANCE);

        assert_eq!(account.balance, 800.0);
        assert_eq!(account.orders.len(), 1);
        assert_eq!(account.position("AAPL").unwrap().quantity, 2.0);
    }

    #[test]
    fn test_corrupted_snapshot_reinitializes() {
        let store = Arc::new(MemoryKv::new());
        store.set(&storage_key(USER, CHALLENGE), "{not valid json");

        let service = PaperTradingService::new(store.clone());
        let account = service.load_account(USER, CHALLENGE, BALANCE);

        assert_eq!(account, PaperState::new(BALANCE));
        // The bad value has been replaced by a valid snapshot
        let raw = store.get(&storage_key(USER, CHALLENGE)).unwrap();
        assert!(serde_json::from_str::<PaperState>(&raw).is_ok());
    }

    #[test]
    fn test_foreign_shape_treated_as_absent() {
        let store = Arc::new(MemoryKv::new());
        store.set(
            &storage_key(USER, CHALLENGE),
            r#"{"balance":"plenty","orders":[],"positions":[]}"#,
        );

        let service = PaperTradingService::new(store);
        let account = service.load_account(USER, CHALLENGE, BALANCE);
        assert_eq!(account.balance, BALANCE);
    }

    #[test]
    fn test_accounts_are_scoped_per_user_and_challenge() {
        let (service, _) = service();

        service
            .place_order(USER, CHALLENGE, BALANCE, &market_request("AAPL", OrderSide::Buy, 1.0), Some(100.0))
            .unwrap();

        let other_user = service.load_account("someone-else", CHALLENGE, BALANCE);
        let other_challenge = service.load_account(USER, CHALLENGE + 1, BALANCE);

        assert_eq!(other_user.balance, BALANCE);
        assert!(other_user.orders.is_empty());
        assert_eq!(other_challenge.balance, BALANCE);
    }

    #[test]
    fn test_sqlite_backend_round_trip() {
        let store = Arc::new(SqliteKv::new_in_memory().unwrap());
        let service = PaperTradingService::new(store);

        service
            .place_order(USER, CHALLENGE, BALANCE, &market_request("AAPL", OrderSide::Buy, 1.0), Some(50.0))
            .unwrap();

        let account = service.load_account(USER, CHALLENGE, BALANCE);
        assert_eq!(account.balance, 950.0);
    }
}

// =============================================================================
// Order Submission Tests
// =============================================================================

mod submission_tests {
    use super::*;

    #[test]
    fn test_market_order_fills_immediately() {
        let (service, _) = service();

        let placement = service
            .place_order(USER, CHALLENGE, BALANCE, &market_request("AAPL", OrderSide::Buy, 2.0), Some(100.0))
            .unwrap();

        assert_eq!(placement.order.status, OrderStatus::Executed);
        assert_eq!(placement.order.executed_price, Some(100.0));
        assert_eq!(placement.executed.len(), 1);
        assert_eq!(placement.state.balance, 800.0);
    }

    #[test]
    fn test_market_order_without_price_rejected() {
        let (service, _) = service();

        let result = service.place_order(
            USER,
            CHALLENGE,
            BALANCE,
            &market_request("AAPL", OrderSide::Buy, 1.0),
            None,
        );
        assert!(matches!(result, Err(TradingError::NoPriceData(_))));
    }

    #[test]
    fn test_limit_order_rests_until_tick() {
        let (service, _) = service();

        let placement = service
            .place_order(
                USER,
                CHALLENGE,
                BALANCE,
                &limit_request("AAPL", OrderSide::Buy, 5.0, 50.0),
                Some(60.0),
            )
            .unwrap();

        assert_eq!(placement.order.status, OrderStatus::Pending);
        assert!(placement.executed.is_empty());
        assert_eq!(placement.state.balance, BALANCE);

        // A qualifying tick fills the resting order
        let (accounts, fills) = service.process_symbol_tick("AAPL", 45.0);
        assert_eq!(accounts, 1);
        assert_eq!(fills, 1);

        let account = service.load_account(USER, CHALLENGE, BALANCE);
        assert_eq!(account.balance, BALANCE - 225.0);
        assert_eq!(account.position("AAPL").unwrap().avg_price, 45.0);
    }

    #[test]
    fn test_insufficient_funds_rejected_at_submission() {
        let (service, _) = service();

        let result = service.place_order(
            USER,
            CHALLENGE,
            BALANCE,
            &market_request("AAPL", OrderSide::Buy, 100.0),
            Some(100.0),
        );

        assert!(matches!(
            result,
            Err(TradingError::InsufficientFunds { needed, available })
                if needed == 10_000.0 && available == BALANCE
        ));

        // Nothing was recorded
        let account = service.load_account(USER, CHALLENGE, BALANCE);
        assert!(account.orders.is_empty());
        assert_eq!(account.balance, BALANCE);
    }

    #[test]
    fn test_uncovered_sell_rejected_at_submission() {
        let (service, _) = service();

        let result = service.place_order(
            USER,
            CHALLENGE,
            BALANCE,
            &market_request("AAPL", OrderSide::Sell, 4.0),
            Some(90.0),
        );

        assert!(matches!(
            result,
            Err(TradingError::InsufficientHoldings { held, .. }) if held == 0.0
        ));
    }

    #[test]
    fn test_invalid_quantity_rejected() {
        let (service, _) = service();

        let mut request = market_request("AAPL", OrderSide::Buy, 0.0);
        let result = service.place_order(USER, CHALLENGE, BALANCE, &request, Some(100.0));
        assert!(matches!(result, Err(TradingError::InvalidOrder(_))));

        request.quantity = -1.0;
        let result = service.place_order(USER, CHALLENGE, BALANCE, &request, Some(100.0));
        assert!(matches!(result, Err(TradingError::InvalidOrder(_))));
    }

    #[test]
    fn test_limit_order_requires_limit_price() {
        let (service, _) = service();

        let request = PlaceOrderRequest {
            challenge_id: CHALLENGE,
            symbol: "AAPL".to_string(),
            side: OrderSide::Buy,
            kind: OrderKind::Limit,
            quantity: 1.0,
            limit_price: None,
            stop_price: None,
        };
        let result = service.place_order(USER, CHALLENGE, BALANCE, &request, Some(100.0));
        assert!(matches!(result, Err(TradingError::InvalidOrder(_))));
    }
}

// =============================================================================
// Cancellation and History Tests
// =============================================================================

mod cancel_tests {
    use super::*;

    #[test]
    fn test_cancel_open_order() {
        let (service, _) = service();

        let placement = service
            .place_order(
                USER,
                CHALLENGE,
                BALANCE,
                &limit_request("AAPL", OrderSide::Buy, 1.0, 50.0),
                Some(60.0),
            )
            .unwrap();

        let cancelled = service
            .cancel_order(USER, CHALLENGE, &placement.order.id)
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);

        // A qualifying tick no longer fills it
        service.process_symbol_tick("AAPL", 45.0);
        let account = service.load_account(USER, CHALLENGE, BALANCE);
        assert_eq!(account.balance, BALANCE);
        assert_eq!(account.orders[0].status, OrderStatus::Cancelled);
    }

    #[test]
    fn test_cannot_cancel_executed_order() {
        let (service, _) = service();

        let placement = service
            .place_order(USER, CHALLENGE, BALANCE, &market_request("AAPL", OrderSide::Buy, 1.0), Some(100.0))
            .unwrap();

        let result = service.cancel_order(USER, CHALLENGE, &placement.order.id);
        assert!(matches!(result, Err(TradingError::CannotCancelOrder(_))));
    }

    #[test]
    fn test_cancel_unknown_order() {
        let (service, _) = service();
        service.load_account(USER, CHALLENGE, BALANCE);

        let result = service.cancel_order(USER, CHALLENGE, "no-such-id");
        assert!(matches!(result, Err(TradingError::OrderNotFound(_))));
    }

    #[test]
    fn test_cancel_on_unknown_account() {
        let (service, _) = service();
        let result = service.cancel_order("nobody", 99, "id");
        assert!(matches!(result, Err(TradingError::AccountNotFound(_))));
    }

    #[test]
    fn test_clear_orders_keeps_balance_and_positions() {
        let (service, _) = service();

        service
            .place_order(USER, CHALLENGE, BALANCE, &market_request("AAPL", OrderSide::Buy, 2.0), Some(100.0))
            .unwrap();

        let cleared = service.clear_orders(USER, CHALLENGE).unwrap();
        assert!(cleared.orders.is_empty());
        assert_eq!(cleared.balance, 800.0);
        assert_eq!(cleared.position("AAPL").unwrap().quantity, 2.0);
    }
}

// =============================================================================
// Tick and Valuation Tests
// =============================================================================

mod tick_tests {
    use super::*;

    #[test]
    fn test_tick_touches_only_matching_symbol() {
        let (service, _) = service();

        service
            .place_order(
                USER,
                CHALLENGE,
                BALANCE,
                &limit_request("AAPL", OrderSide::Buy, 1.0, 50.0),
                Some(60.0),
            )
            .unwrap();

        let (accounts, fills) = service.process_symbol_tick("TSLA", 10.0);
        assert_eq!(accounts, 0);
        assert_eq!(fills, 0);
    }

    #[test]
    fn test_tick_with_no_accounts_is_noop() {
        let (service, _) = service();
        assert_eq!(service.process_symbol_tick("AAPL", 100.0), (0, 0));
    }

    #[tokio::test]
    async fn test_fill_broadcast() {
        let (service, _) = service();
        let mut fills = service.subscribe_fills();

        service
            .place_order(USER, CHALLENGE, BALANCE, &market_request("AAPL", OrderSide::Buy, 1.0), Some(100.0))
            .unwrap();

        let fill = fills.recv().await.unwrap();
        assert_eq!(fill.symbol, "AAPL");
        assert_eq!(fill.status, OrderStatus::Executed);
        assert_eq!(fill.executed_price, Some(100.0));
    }

    #[test]
    fn test_valuation_over_live_prices() {
        let (service, _) = service();

        service
            .place_order(USER, CHALLENGE, BALANCE, &market_request("AAPL", OrderSide::Buy, 2.0), Some(100.0))
            .unwrap();

        let mut prices = HashMap::new();
        prices.insert("AAPL".to_string(), 120.0);

        let valuation = service.valuation(USER, CHALLENGE, BALANCE, &prices);
        assert_eq!(valuation.equity, 800.0 + 240.0);
        assert_eq!(valuation.unrealized_pnl, 40.0);
    }
}
