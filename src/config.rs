use std::env;

/// Simulated market feed configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Symbols seeded and ticked by the feed.
    pub symbols: Vec<String>,
    /// Seconds between random-walk ticks.
    pub tick_interval_secs: u64,
    /// Days of candle history generated per symbol.
    pub seed_days: usize,
}

/// Challenge backend sync configuration.
///
/// Absent `base_url` disables outward sync entirely; balance and trade
/// pushes are best-effort even when configured.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Challenge backend base URL (e.g. https://api.example.com).
    pub base_url: Option<String>,
    /// Bearer token for backend calls.
    pub token: Option<String>,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// SQLite database path for snapshot persistence.
    pub sqlite_path: String,
    /// Redis URL; when set, snapshots go to Redis instead of SQLite.
    pub redis_url: Option<String>,
    /// Starting cash balance for accounts created without one.
    pub default_initial_balance: f64,
    /// Simulated market feed settings.
    pub feed: FeedConfig,
    /// Challenge backend sync settings.
    pub sync: SyncConfig,
}

/// Default symbol universe, matching the dashboard's watchlist.
const DEFAULT_SYMBOLS: &str = "AAPL,TSLA,GOOGL,MSFT,BTC-USD,ETH-USD,IAM.PA,ATW.PA";

fn parse_symbols(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3001);

        let symbols = env::var("FEED_SYMBOLS")
            .ok()
            .map(|s| parse_symbols(&s))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| parse_symbols(DEFAULT_SYMBOLS));

        Self {
            host,
            port,
            sqlite_path: env::var("SQLITE_PATH").unwrap_or_else(|_| "specter.db".to_string()),
            redis_url: env::var("REDIS_URL").ok(),
            default_initial_balance: env::var("DEFAULT_INITIAL_BALANCE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100_000.0),
            feed: FeedConfig {
                symbols,
                tick_interval_secs: env::var("TICK_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5),
                seed_days: env::var("FEED_SEED_DAYS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(100),
            },
            sync: SyncConfig {
                base_url: env::var("CHALLENGE_API_URL").ok(),
                token: env::var("CHALLENGE_API_TOKEN").ok(),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
