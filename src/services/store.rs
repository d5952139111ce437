//! Snapshot Store
//!
//! Key-value persistence behind the account layer. The engine never sees
//! storage; the service reads and writes whole snapshots through the
//! `KvStore` trait, so the same logic runs against SQLite, Redis, or an
//! in-memory map in tests.
//!
//! Store failures are logged and degrade to "no value" rather than
//! propagating: a broken store must never take the engine down.

use dashmap::DashMap;
use redis::Commands;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, error, info};

/// Whole-value key-value storage for serialized snapshots.
pub trait KvStore: Send + Sync {
    /// Get the stored value for a key, if any.
    fn get(&self, key: &str) -> Option<String>;
    /// Unconditionally overwrite the value for a key.
    fn set(&self, key: &str, value: &str);
}

// =============================================================================
// SQLite
// =============================================================================

/// SQLite-backed store. The default backend: durable, zero-dependency.
pub struct SqliteKv {
    conn: Mutex<Connection>,
}

impl SqliteKv {
    /// Create a store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        info!("SQLite snapshot store initialized");
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn new_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        debug!("In-memory SQLite snapshot store initialized");
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS snapshots (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        Ok(())
    }
}

impl KvStore for SqliteKv {
    fn get(&self, key: &str) -> Option<String> {
        let conn = self.conn.lock().unwrap();

        let result = conn.query_row(
            "SELECT value FROM snapshots WHERE key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Some(value),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => {
                error!("Error reading snapshot {}: {}", key, e);
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) {
        let conn = self.conn.lock().unwrap();

        let result = conn.execute(
            "INSERT INTO snapshots (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            params![key, value, chrono::Utc::now().timestamp_millis()],
        );

        if let Err(e) = result {
            error!("Error writing snapshot {}: {}", key, e);
        }
    }
}

// =============================================================================
// Redis
// =============================================================================

/// Redis-backed store, selected when `REDIS_URL` is configured.
pub struct RedisKv {
    conn: Mutex<redis::Connection>,
}

impl RedisKv {
    /// Connect to Redis at the given URL.
    pub fn new(url: &str) -> redis::RedisResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection()?;
        info!("Connected to Redis snapshot store at {}", url);
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl KvStore for RedisKv {
    fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.conn.lock().unwrap();
        match conn.get::<_, Option<String>>(key) {
            Ok(value) => value,
            Err(e) => {
                error!("Error reading snapshot {}: {}", key, e);
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) {
        let mut conn = self.conn.lock().unwrap();
        if let Err(e) = conn.set::<_, _, ()>(key, value) {
            error!("Error writing snapshot {}: {}", key, e);
        }
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Map-backed store for tests and cache-only runs.
#[derive(Default)]
pub struct MemoryKv {
    map: DashMap<String, String>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).map(|v| v.clone())
    }

    fn set(&self, key: &str, value: &str) {
        self.map.insert(key.to_string(), value.to_string());
    }
}
