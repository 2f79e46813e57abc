//! Response cache abstraction.
//!
//! # Data Flow
//! ```text
//! TokenProvider / PriceOptimizationClient
//!     → ResponseCache::get(key)          (string payloads, JSON by convention)
//!     → ResponseCache::set(key, value, Expiry::{Absolute, Relative})
//!     → backing store (memory.rs in-process, or any external key/value store)
//! ```
//!
//! # Design Decisions
//! - The cache is an optimization, never a correctness boundary: last write wins
//! - No retry/backoff here; backend failures surface as `CacheError` and callers
//!   map them into their error taxonomy
//! - Eviction beyond TTL expiry belongs to the backing store

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use memory::MemoryCache;

/// When a cache entry stops being served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Expire at a wall-clock instant.
    Absolute(DateTime<Utc>),
    /// Expire after a duration from now.
    Relative(Duration),
}

impl Expiry {
    /// Remaining lifetime from `now`. Zero when already past.
    pub fn ttl_from(&self, now: DateTime<Utc>) -> Duration {
        match self {
            Expiry::Absolute(at) => (*at - now).to_std().unwrap_or(Duration::ZERO),
            Expiry::Relative(ttl) => *ttl,
        }
    }
}

/// Errors reported by a cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backing store could not be reached or rejected the command.
    #[error("cache backend error: {0}")]
    Backend(String),

    /// A stored payload could not be (de)serialized.
    #[error("cache payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Key/value store with TTL, consumed by the token and price caches.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Fetch a live entry.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store an entry. Entries whose expiry is already past are not stored.
    async fn set(&self, key: &str, value: String, expiry: Expiry) -> Result<(), CacheError>;

    /// Drop an entry.
    async fn remove(&self, key: &str) -> Result<(), CacheError>;
}
