use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::debug;

use common::{CacheConfig, Error, Result};

/// Kinds of provider data the cache distinguishes, each with its own TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    Quote,
    History,
    OptionChain,
    Expirations,
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataKind::Quote => "quote",
            DataKind::History => "history",
            DataKind::OptionChain => "option_chain",
            DataKind::Expirations => "expirations",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: DataKind,
    pub symbol: String,
    /// Request parameters (lookback, expiration); empty when there are none.
    pub params: String,
}

impl CacheKey {
    pub fn new(kind: DataKind, symbol: impl Into<String>, params: impl Into<String>) -> Self {
        Self {
            kind,
            symbol: symbol.into(),
            params: params.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.symbol)?;
        if !self.params.is_empty() {
            write!(f, ":{}", self.params)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    stored_at: Instant,
}

/// Settled result of one fetch. Errors live only until the fetch settles.
type Outcome = std::result::Result<Entry, Error>;
type Slot = Arc<OnceCell<Outcome>>;

/// Get-or-fetch cache shared by every symbol pipeline in a run.
///
/// Each key owns a `OnceCell`: the first caller runs the fetch and everyone
/// else arriving meanwhile waits on that same cell, so a key never has more
/// than one fetch in flight. The map lock is held only to look up or swap a
/// cell, never across an await. A failed fetch hands its error to every
/// waiter, then its cell is dropped so the next call fetches afresh.
pub struct DataCache {
    config: CacheConfig,
    slots: Mutex<HashMap<CacheKey, Slot>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DataCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            slots: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self, kind: DataKind) -> Duration {
        match kind {
            DataKind::Quote => self.config.quote_ttl,
            DataKind::History => self.config.history_ttl,
            DataKind::OptionChain => self.config.option_chain_ttl,
            DataKind::Expirations => self.config.expirations_ttl,
        }
    }

    /// Return the cached value for `key`, running `fetch` if it is missing or
    /// older than its kind's TTL.
    pub async fn get_or_fetch<T, F, Fut>(&self, key: CacheKey, fetch: F) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.config.enabled {
            return fetch().await;
        }

        let slot = self.slot(&key);
        let mut fetched = false;
        let flag = &mut fetched;
        let outcome = slot
            .get_or_init(|| async move {
                *flag = true;
                fetch().await.map(|value| Entry {
                    value: Arc::new(value),
                    stored_at: Instant::now(),
                })
            })
            .await;

        if fetched {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Cache miss");
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }

        match outcome {
            Ok(entry) => entry
                .value
                .downcast_ref::<T>()
                .cloned()
                .ok_or_else(|| Error::Other(format!("cache entry {key} holds an unexpected type"))),
            Err(e) => {
                if fetched {
                    self.forget(&key, &slot);
                    debug!(key = %key, error = %e, "Fetch failed, not cached");
                }
                Err(e.replicate())
            }
        }
    }

    /// Drop every entry. Fetches already in flight still complete for their callers.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Drop every entry of one kind.
    pub fn invalidate(&self, kind: DataKind) {
        self.lock().retain(|key, _| key.kind != kind);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self
                .lock()
                .values()
                .filter(|s| matches!(s.get(), Some(Ok(_))))
                .count(),
        }
    }

    /// The live cell for `key`, replacing it first if it expired or failed.
    fn slot(&self, key: &CacheKey) -> Slot {
        let ttl = self.ttl(key.kind);
        let mut slots = self.lock();
        let slot = slots.entry(key.clone()).or_default();
        let stale = match slot.get() {
            Some(Ok(entry)) => entry.stored_at.elapsed() >= ttl,
            Some(Err(_)) => true,
            None => false,
        };
        if stale {
            *slot = Slot::default();
        }
        Arc::clone(slot)
    }

    /// Remove `slot` unless a newer cell already replaced it.
    fn forget(&self, key: &CacheKey, slot: &Slot) {
        let mut slots = self.lock();
        if slots.get(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(key);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Slot>> {
        // The map holds no invariant a panicking holder could break.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for DataCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataCache")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}
