//! Simulated Market Feed
//!
//! Seeds each symbol with a mock daily candle history, then random-walks
//! the forming candle on every step to produce live ticks. The feed is the
//! authoritative "last trade price" source for the matching engine and the
//! valuation endpoint; there is no bid/ask modeling.

use crate::types::{Candle, PriceUpdate};
use dashmap::DashMap;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Days of history generated when a symbol is first seen.
const DEFAULT_SEED_DAYS: usize = 100;

/// Per-step drift as a fraction of the last close.
const STEP_DRIFT: f64 = 0.002;

fn base_price(symbol: &str) -> f64 {
    match symbol {
        "AAPL" => 185.0,
        "TSLA" => 245.0,
        "GOOGL" => 175.0,
        "MSFT" => 420.0,
        "BTC-USD" => 95_000.0,
        "ETH-USD" => 3_400.0,
        "IAM.PA" => 120.0,
        "ATW.PA" => 450.0,
        _ => 100.0,
    }
}

fn volatility(symbol: &str) -> f64 {
    if symbol.contains("BTC") || symbol.contains("ETH") {
        0.03
    } else {
        0.015
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Mock price feed with per-symbol candle history and live last prices.
pub struct PriceFeed {
    /// Last tick price per symbol.
    prices: DashMap<String, f64>,
    /// Seeded daily candles per symbol; the final candle is the live one.
    history: DashMap<String, Vec<Candle>>,
    /// Broadcast channel for price updates.
    tx: broadcast::Sender<PriceUpdate>,
}

impl PriceFeed {
    /// Create a new feed.
    pub fn new() -> (Arc<Self>, broadcast::Receiver<PriceUpdate>) {
        let (tx, rx) = broadcast::channel(1024);
        let feed = Arc::new(Self {
            prices: DashMap::new(),
            history: DashMap::new(),
            tx,
        });
        (feed, rx)
    }

    /// Subscribe to price updates.
    pub fn subscribe(&self) -> broadcast::Receiver<PriceUpdate> {
        self.tx.subscribe()
    }

    /// Generate a fresh candle history for a symbol and set its live price
    /// to the last close. Overwrites any prior history.
    pub fn seed_symbol(&self, symbol: &str, days: usize) {
        let now = chrono::Utc::now().timestamp();
        let day = 24 * 60 * 60;
        let vol = volatility(symbol);
        let mut rng = rand::thread_rng();
        let mut price = base_price(symbol);
        let mut candles = Vec::with_capacity(days + 1);

        for i in (0..=days).rev() {
            let time = now - i as i64 * day;
            let change = (rng.gen::<f64>() - 0.5) * price * vol;
            let open = price;
            let close = price + change;
            let high = open.max(close) + rng.gen::<f64>() * price * 0.01;
            let low = open.min(close) - rng.gen::<f64>() * price * 0.01;

            candles.push(Candle {
                time,
                open: round2(open),
                high: round2(high),
                low: round2(low),
                close: round2(close),
            });

            price = close;
        }

        let last_close = candles.last().map(|c| c.close).unwrap_or(price);
        self.history.insert(symbol.to_string(), candles);
        self.prices.insert(symbol.to_string(), last_close);
        debug!("Seeded {} with {} days of candles at {}", symbol, days, last_close);
    }

    /// Seed a symbol only if it has no history yet.
    pub fn ensure_symbol(&self, symbol: &str) {
        if !self.history.contains_key(symbol) {
            self.seed_symbol(symbol, DEFAULT_SEED_DAYS);
        }
    }

    /// Advance a symbol's live price one random-walk step and broadcast
    /// the update. Returns the new price, or `None` if the symbol was
    /// never seeded.
    pub fn step(&self, symbol: &str) -> Option<f64> {
        let new_close = {
            let mut entry = self.history.get_mut(symbol)?;
            let last = entry.value_mut().last_mut()?;

            let mut rng = rand::thread_rng();
            let change = (rng.gen::<f64>() - 0.5) * last.close * STEP_DRIFT;
            let new_close = round2(last.close + change);

            last.close = new_close;
            last.high = last.high.max(new_close);
            last.low = last.low.min(new_close);
            new_close
        };

        let previous = self.prices.insert(symbol.to_string(), new_close);

        let update = PriceUpdate {
            symbol: symbol.to_string(),
            price: new_close,
            previous_price: previous,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        // Ignore send errors when nobody is subscribed
        let _ = self.tx.send(update);

        Some(new_close)
    }

    /// Get the current price for a symbol.
    pub fn get_price(&self, symbol: &str) -> Option<f64> {
        self.prices.get(symbol).map(|p| *p)
    }

    /// Get all current prices.
    pub fn all_prices(&self) -> HashMap<String, f64> {
        self.prices
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Get a symbol's candle history.
    pub fn history(&self, symbol: &str) -> Option<Vec<Candle>> {
        self.history.get(symbol).map(|c| c.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_generates_full_history() {
        let (feed, _rx) = PriceFeed::new();
        feed.seed_symbol("AAPL", 100);

        let candles = feed.history("AAPL").unwrap();
        assert_eq!(candles.len(), 101);
        for candle in &candles {
            assert!(candle.low <= candle.open && candle.open <= candle.high);
            assert!(candle.low <= candle.close && candle.close <= candle.high);
            assert!(candle.low > 0.0);
        }

        let price = feed.get_price("AAPL").unwrap();
        assert_eq!(price, candles.last().unwrap().close);
    }

    #[test]
    fn test_unknown_symbol_uses_default_base() {
        let (feed, _rx) = PriceFeed::new();
        feed.seed_symbol("ZZZZ", 10);

        // 10 days of 1.5% daily drift stays well within half of the base
        let price = feed.get_price("ZZZZ").unwrap();
        assert!(price > 50.0 && price < 200.0, "price was {}", price);
    }

    #[test]
    fn test_step_moves_price_within_drift() {
        let (feed, _rx) = PriceFeed::new();
        feed.seed_symbol("MSFT", 30);

        let before = feed.get_price("MSFT").unwrap();
        let after = feed.step("MSFT").unwrap();
        // Half of STEP_DRIFT either way, plus rounding
        assert!((after - before).abs() <= before * STEP_DRIFT / 2.0 + 0.01);
        assert_eq!(feed.get_price("MSFT").unwrap(), after);
    }

    #[test]
    fn test_step_unseeded_symbol_is_none() {
        let (feed, _rx) = PriceFeed::new();
        assert_eq!(feed.step("NOPE"), None);
    }

    #[test]
    fn test_ensure_symbol_is_idempotent() {
        let (feed, _rx) = PriceFeed::new();
        feed.ensure_symbol("AAPL");
        let first = feed.get_price("AAPL").unwrap();
        feed.ensure_symbol("AAPL");
        assert_eq!(feed.get_price("AAPL").unwrap(), first);
    }
}
