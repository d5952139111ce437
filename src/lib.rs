//! Specter - Paper-trading challenge engine and dashboard backend
//!
//! Hosts one simulated brokerage account per (user, challenge) pair:
//! order lifecycle, weighted-average positions, cash accounting, and a
//! price-driven matching engine fed by a simulated market feed.

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod types;

use config::Config;
use services::{PaperTradingService, PriceFeed};
use std::sync::Arc;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub paper: Arc<PaperTradingService>,
    pub feed: Arc<PriceFeed>,
}
