pub mod engine;
pub mod feed;
pub mod paper;
pub mod signals;
pub mod store;

pub use engine::TickOutcome;
pub use feed::PriceFeed;
pub use paper::{ChallengeSync, OrderPlacement, PaperTradingService, TradingError};
pub use store::{KvStore, MemoryKv, RedisKv, SqliteKv};
