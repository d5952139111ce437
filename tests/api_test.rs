//! Tests for API request/response and wire formats
//!
//! Tests cover:
//! - Query-string deserialization for account-scoped endpoints
//! - Order and snapshot JSON wire formats (the stored format)
//! - Enum casing on the wire

use specter::api::trading::AccountQuery;
use specter::types::*;

// =============================================================================
// Query Deserialization
// =============================================================================

mod query_tests {
    use super::*;

    #[test]
    fn test_account_query_full() {
        let query: AccountQuery = serde_urlencoded::from_str(
            "challengeId=7&userKey=trader%40example.com&initialBalance=100000",
        )
        .unwrap();

        assert_eq!(query.challenge_id, 7);
        assert_eq!(query.user_key.as_deref(), Some("trader@example.com"));
        assert_eq!(query.initial_balance, Some(100_000.0));
    }

    #[test]
    fn test_account_query_minimal() {
        let query: AccountQuery = serde_urlencoded::from_str("challengeId=7").unwrap();

        assert_eq!(query.challenge_id, 7);
        assert!(query.user_key.is_none());
        assert!(query.initial_balance.is_none());
    }

    #[test]
    fn test_account_query_requires_challenge_id() {
        let result: Result<AccountQuery, _> = serde_urlencoded::from_str("userKey=x");
        assert!(result.is_err());
    }
}

// =============================================================================
// Wire Format Tests
// =============================================================================

mod wire_format_tests {
    use super::*;

    #[test]
    fn test_order_serializes_camel_case_with_type_field() {
        let order = Order::stop_limit(7, "AAPL".to_string(), OrderSide::Buy, 2.0, 90.0, 95.0);
        let json = serde_json::to_value(&order).unwrap();

        assert_eq!(json["challengeId"], 7);
        assert_eq!(json["side"], "BUY");
        assert_eq!(json["type"], "STOP_LIMIT");
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["limitPrice"], 95.0);
        assert_eq!(json["stopPrice"], 90.0);
        // Unset execution fields are omitted, not null
        assert!(json.get("executedAt").is_none());
        assert!(json.get("executedPrice").is_none());
    }

    #[test]
    fn test_order_round_trip() {
        let mut order = Order::limit(7, "TSLA".to_string(), OrderSide::Sell, 1.5, 250.0);
        order.status = OrderStatus::Executed;
        order.executed_at = Some(1_700_000_000_000);
        order.executed_price = Some(251.25);

        let json = serde_json::to_string(&order).unwrap();
        let back: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(back, order);
    }

    #[test]
    fn test_snapshot_stored_format() {
        let mut state = PaperState::new(100_000.0);
        state.positions.push(Position {
            symbol: "AAPL".to_string(),
            quantity: 2.0,
            avg_price: 100.0,
        });

        let json = serde_json::to_value(&state).unwrap();
        assert!(json["balance"].is_number());
        assert!(json["orders"].is_array());
        assert!(json["positions"].is_array());
        assert_eq!(json["positions"][0]["avgPrice"], 100.0);

        let back: PaperState = serde_json::from_str(&json.to_string()).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_place_order_request_accepts_dashboard_payload() {
        let request: PlaceOrderRequest = serde_json::from_str(
            r#"{
                "challengeId": 7,
                "symbol": "BTC-USD",
                "side": "SELL",
                "type": "MARKET",
                "quantity": 0.25
            }"#,
        )
        .unwrap();

        assert_eq!(request.symbol, "BTC-USD");
        assert_eq!(request.side, OrderSide::Sell);
        assert_eq!(request.kind, OrderKind::Market);
        assert!(request.limit_price.is_none());
        assert!(request.stop_price.is_none());
    }

    #[test]
    fn test_valuation_serialization() {
        let valuation = Valuation {
            equity: 101_250.0,
            unrealized_pnl: 1_250.0,
        };

        let json = serde_json::to_value(&valuation).unwrap();
        assert_eq!(json["equity"], 101_250.0);
        assert_eq!(json["unrealizedPnl"], 1_250.0);
    }

    #[test]
    fn test_trade_record_serialization() {
        let record = TradeRecord {
            challenge_id: 7,
            symbol: "AAPL".to_string(),
            side: OrderSide::Buy,
            quantity: 2.0,
            price: 185.0,
            pnl: 0.0,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["challengeId"], 7);
        assert_eq!(json["side"], "BUY");
        assert_eq!(json["pnl"], 0.0);
    }

    #[test]
    fn test_signal_wire_casing() {
        let signal = TradeSignal {
            signal: SignalAction::Buy,
            confidence: 85,
            reason: SignalReason::GoldenCross,
        };

        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["signal"], "BUY");
        assert_eq!(json["confidence"], 85);
        assert_eq!(json["reason"], "golden_cross");
    }
}
