//! Storage Engine Module
//!
//! The in-memory, sharded key-value store shared by every connection.
//!
//! ## Features
//!
//! - **Sharded Storage**: independent `RwLock`ed shards reduce contention
//! - **RwLock**: multiple concurrent readers, exclusive writers
//! - **TTL Support**: entries carry an optional absolute expiry instant
//! - **Lazy Expiry**: expired keys are removed when next accessed; there is
//!   no background sweep
//!
//! ## Example
//!
//! ```
//! use emberkv::storage::StorageEngine;
//! use bytes::Bytes;
//! use std::sync::Arc;
//! use std::time::{Duration, Instant};
//!
//! let engine = Arc::new(StorageEngine::new());
//!
//! engine.set(Bytes::from("name"), Bytes::from("cafe"), None);
//! assert_eq!(engine.get(b"name"), Some(Bytes::from("cafe")));
//!
//! engine.set(
//!     Bytes::from("session"),
//!     Bytes::from("token123"),
//!     Some(Instant::now() + Duration::from_secs(3600)),
//! );
//! assert!(engine.ttl(b"session").as_seconds() >= 3599);
//! ```

pub mod engine;

pub use engine::{Entry, StorageEngine, StorageStats, Ttl, DEFAULT_SHARDS};
