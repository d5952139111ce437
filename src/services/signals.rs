//! Moving-Average Advisor
//!
//! SMA crossover heuristics over the feed's candle history. Purely
//! advisory: nothing here places or triggers orders.

use crate::types::{Candle, SignalAction, SignalReason, TradeSignal};

/// Simple moving average of candle closes.
///
/// Returns one value per window, so the result is
/// `candles.len() - period + 1` long (empty when there is not enough
/// data).
pub fn sma(candles: &[Candle], period: usize) -> Vec<f64> {
    if period == 0 || candles.len() < period {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(candles.len() - period + 1);
    for i in (period - 1)..candles.len() {
        let sum: f64 = candles[i + 1 - period..=i].iter().map(|c| c.close).sum();
        out.push(sum / period as f64);
    }
    out
}

/// Crossover signal over the last 20 candles: a fast SMA(5) against a
/// slow SMA(15).
///
/// Confidence is a fixed ladder, not a probability: crosses score higher
/// than trends, and a continuing trend only counts when the latest close
/// agrees with the fast average.
pub fn crossover_signal(candles: &[Candle]) -> TradeSignal {
    if candles.len() < 20 {
        return TradeSignal {
            signal: SignalAction::Hold,
            confidence: 50,
            reason: SignalReason::NotEnoughData,
        };
    }

    let window = &candles[candles.len() - 20..];
    let short = sma(window, 5);
    let long = sma(window, 15);

    let current_short = short[short.len() - 1];
    let current_long = long[long.len() - 1];
    let prev_short = short[short.len() - 2];
    let prev_long = long[long.len() - 2];

    let current_price = window[window.len() - 1].close;
    let price_above_sma = current_price > current_short;

    if prev_short <= prev_long && current_short > current_long {
        return TradeSignal {
            signal: SignalAction::Buy,
            confidence: 85,
            reason: SignalReason::GoldenCross,
        };
    }

    if prev_short >= prev_long && current_short < current_long {
        return TradeSignal {
            signal: SignalAction::Sell,
            confidence: 80,
            reason: SignalReason::DeathCross,
        };
    }

    if current_short > current_long && price_above_sma {
        return TradeSignal {
            signal: SignalAction::Buy,
            confidence: 70,
            reason: SignalReason::BullTrend,
        };
    }

    if current_short < current_long && !price_above_sma {
        return TradeSignal {
            signal: SignalAction::Sell,
            confidence: 65,
            reason: SignalReason::BearTrend,
        };
    }

    TradeSignal {
        signal: SignalAction::Hold,
        confidence: 55,
        reason: SignalReason::Consolidation,
    }
}
