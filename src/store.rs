//! Record store for server publisher records.
//!
//! Durable persistence is the host's job; [`RecordStore`] is the seam it
//! plugs into. [`MemoryRecordStore`] keeps a bounded LRU of records for hosts
//! that do not need durability.

use crate::fetch::ServerPublisherRecord;
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Default store capacity.
const DEFAULT_STORE_CAPACITY: usize = 10_000;

/// Storage for server publisher records, keyed by publisher key.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Look up the stored record for `publisher_key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    async fn get(&self, publisher_key: &str) -> crate::Result<Option<ServerPublisherRecord>>;

    /// Insert or replace the record for `record.publisher_key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    async fn save(&self, record: ServerPublisherRecord) -> crate::Result<()>;

    /// Remove the record for `publisher_key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    async fn remove(&self, publisher_key: &str) -> crate::Result<()>;
}

/// In-memory LRU record store.
#[derive(Clone)]
pub struct MemoryRecordStore {
    inner: Arc<Mutex<LruCache<String, ServerPublisherRecord>>>,
    stats: Arc<Mutex<StoreStats>>,
}

/// Store statistics for monitoring.
#[derive(Debug, Default, Clone)]
pub struct StoreStats {
    /// Number of lookups that found a record.
    pub hits: u64,
    /// Number of lookups that found nothing.
    pub misses: u64,
    /// Number of records saved.
    pub saves: u64,
}

impl StoreStats {
    /// Calculate hit rate as a percentage.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

impl MemoryRecordStore {
    /// Create a store with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_STORE_CAPACITY)
    }

    /// Create a store holding at most `capacity` records (minimum 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(cap))),
            stats: Arc::new(Mutex::new(StoreStats::default())),
        }
    }

    /// Look up a record without touching async machinery.
    pub fn lookup(&self, publisher_key: &str) -> Option<ServerPublisherRecord> {
        let found = self.inner.lock().get(publisher_key).cloned();

        let mut stats = self.stats.lock();
        if found.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        found
    }

    /// Insert or replace a record.
    pub fn insert(&self, record: ServerPublisherRecord) {
        self.inner.lock().put(record.publisher_key.clone(), record);
        self.stats.lock().saves += 1;
    }

    /// Get current store statistics.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        self.stats.lock().clone()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Remove every record.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, publisher_key: &str) -> crate::Result<Option<ServerPublisherRecord>> {
        Ok(self.lookup(publisher_key))
    }

    async fn save(&self, record: ServerPublisherRecord) -> crate::Result<()> {
        self.insert(record);
        Ok(())
    }

    async fn remove(&self, publisher_key: &str) -> crate::Result<()> {
        self.inner.lock().pop(publisher_key);
        Ok(())
    }
}
