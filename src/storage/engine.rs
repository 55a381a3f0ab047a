//! Thread-Safe Storage Engine with Lazy Expiry
//!
//! A concurrent map from key to [`Entry`], where each entry may carry an
//! absolute expiry instant.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: Keys are spread over N shards, each behind its own
//!    `RwLock`. With one shard this is a single readers-writer lock over the
//!    whole store.
//! 2. **Lazy Expiry Only**: An expired entry is logically absent at once, but
//!    it is only removed when a later `get` or `ttl` touches it. A key that is
//!    never read again stays resident.
//! 3. **Read Fast Path**: Lookups take the read lock first and only upgrade to
//!    the write lock when they find an expired entry to remove.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use bytes::Bytes;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// Default number of shards.
pub const DEFAULT_SHARDS: usize = 64;

/// A stored value with optional expiry time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub value: Bytes,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl Entry {
    pub fn new(value: Bytes, expires_at: Option<Instant>) -> Self {
        Self { value, expires_at }
    }

    /// True once `now` has reached the expiry instant.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

/// Result of a TTL lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Key absent or already expired
    Missing,
    /// Key present without an expiry
    Persistent,
    /// Time left before the key expires (always non-zero)
    Remaining(Duration),
}

impl Ttl {
    /// The integer the TTL command replies with: -2, -1, or whole seconds
    /// left, truncated toward zero.
    pub fn as_seconds(&self) -> i64 {
        match self {
            Ttl::Missing => -2,
            Ttl::Persistent => -1,
            Ttl::Remaining(left) => i64::try_from(left.as_secs()).unwrap_or(i64::MAX),
        }
    }
}

/// Counters reported on shutdown and in tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Physically resident keys, expired-but-untouched ones included
    pub keys: usize,
    pub gets: u64,
    pub sets: u64,
    pub deletes: u64,
    /// Entries removed by lazy expiry
    pub expired: u64,
}

#[derive(Debug, Default)]
struct Shard {
    data: RwLock<HashMap<Bytes, Entry>>,
}

impl Shard {
    // A panic while holding the lock cannot leave a half-written entry: every
    // mutation is a single insert or remove.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Bytes, Entry>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Bytes, Entry>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The shared key-value store.
///
/// Wrap it in an `Arc` and hand a clone to every connection; all operations
/// take `&self`.
///
/// # Example
///
/// ```
/// use emberkv::storage::{StorageEngine, Ttl};
/// use bytes::Bytes;
/// use std::time::{Duration, Instant};
///
/// let engine = StorageEngine::new();
/// engine.set(Bytes::from("name"), Bytes::from("cafe"), None);
/// assert_eq!(engine.get(b"name"), Some(Bytes::from("cafe")));
/// assert_eq!(engine.ttl(b"name"), Ttl::Persistent);
///
/// let expires_at = Instant::now() + Duration::from_secs(60);
/// engine.set(Bytes::from("session"), Bytes::from("abc123"), Some(expires_at));
/// assert!(matches!(engine.ttl(b"session"), Ttl::Remaining(_)));
/// ```
pub struct StorageEngine {
    shards: Vec<Shard>,
    get_count: AtomicU64,
    set_count: AtomicU64,
    del_count: AtomicU64,
    expired_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates a store with [`DEFAULT_SHARDS`] shards.
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// Creates a store with `shards` shards (at least one).
    pub fn with_shards(shards: usize) -> Self {
        Self {
            shards: (0..shards.max(1)).map(|_| Shard::default()).collect(),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    #[inline]
    fn shard(&self, key: &[u8]) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    /// Stores `value` under `key`, replacing any previous value and expiry.
    ///
    /// `expires_at = None` means the key never expires; it does not keep an
    /// earlier expiry.
    pub fn set(&self, key: Bytes, value: Bytes, expires_at: Option<Instant>) {
        self.set_count.fetch_add(1, Ordering::Relaxed);
        self.shard(&key)
            .write()
            .insert(key, Entry::new(value, expires_at));
    }

    /// Returns the value for `key`, or `None` if absent or expired.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.get_at(key, Instant::now())
    }

    /// [`get`](Self::get) evaluated at `now`. An expired entry is removed.
    pub fn get_at(&self, key: &[u8], now: Instant) -> Option<Bytes> {
        self.get_count.fetch_add(1, Ordering::Relaxed);
        self.live_entry(key, now).map(|entry| entry.value)
    }

    /// Remaining time to live for `key`.
    pub fn ttl(&self, key: &[u8]) -> Ttl {
        self.ttl_at(key, Instant::now())
    }

    /// [`ttl`](Self::ttl) evaluated at `now`. An expired entry is removed.
    pub fn ttl_at(&self, key: &[u8], now: Instant) -> Ttl {
        match self.live_entry(key, now) {
            None => Ttl::Missing,
            Some(Entry {
                expires_at: None, ..
            }) => Ttl::Persistent,
            Some(Entry {
                expires_at: Some(exp),
                ..
            }) => Ttl::Remaining(exp.saturating_duration_since(now)),
        }
    }

    /// Looks up a non-expired entry, removing it if it expired.
    fn live_entry(&self, key: &[u8], now: Instant) -> Option<Entry> {
        let shard = self.shard(key);

        {
            let data = shard.read();
            match data.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired_at(now) => return Some(entry.clone()),
                Some(_) => {}
            }
        }

        // Expired under the read lock; re-check under the write lock since a
        // concurrent SET may have replaced it.
        let mut data = shard.write();
        match data.get(key) {
            Some(entry) if entry.is_expired_at(now) => {
                data.remove(key);
                self.expired_count.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some(entry) => Some(entry.clone()),
            None => None,
        }
    }

    /// Removes `key`. Returns `true` if a record was removed.
    pub fn delete(&self, key: &[u8]) -> bool {
        self.del_count.fetch_add(1, Ordering::Relaxed);
        self.shard(key).write().remove(key).is_some()
    }

    /// Number of physically resident keys, including expired keys that no
    /// lookup has touched yet.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.read().is_empty())
    }

    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.len(),
            gets: self.get_count.load(Ordering::Relaxed),
            sets: self.set_count.load(Ordering::Relaxed),
            deletes: self.del_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}
