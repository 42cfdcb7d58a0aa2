//! Memoization cache storage and eviction policies.
//!
//! The cache is shared by every [`Context`](super::Context) derived from the
//! same root. It is only ever added to; stale entries are detected by
//! re-validating their recorded dependencies, never by rolling the cache back.
//!
//! # Concurrency
//!
//! Policies must tolerate concurrent `get`/`put` from any thread. Two threads
//! racing on the same key may both compute and both `put`; the later write wins
//! and both values are equal, so the overwrite is idempotent.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use ahash::{AHashMap, RandomState};

use super::subscription::Subscription;
use crate::value::Value;

/// What a `sub` call reads: a key of the state value or a subscription.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    Key(Value),
    Sub(Subscription),
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(k) => write!(f, "{k:?}"),
            Self::Sub(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<&str> for Selector {
    fn from(key: &str) -> Self {
        Self::Key(Value::from(key))
    }
}

impl From<Value> for Selector {
    fn from(key: Value) -> Self {
        Self::Key(key)
    }
}

impl From<Subscription> for Selector {
    fn from(sub: Subscription) -> Self {
        Self::Sub(sub)
    }
}

impl From<&Subscription> for Selector {
    fn from(sub: &Subscription) -> Self {
        Self::Sub(sub.clone())
    }
}

/// Cache key: selector identity plus argument values.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub(crate) selector: Selector,
    pub(crate) args: Arc<[Value]>,
}

impl CacheKey {
    pub fn new(selector: Selector, args: impl Into<Arc<[Value]>>) -> Self {
        Self {
            selector,
            args: args.into(),
        }
    }

    #[must_use]
    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    #[must_use]
    pub fn args(&self) -> &[Value] {
        &self.args
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.selector)?;
        if !self.args.is_empty() {
            f.debug_list().entries(self.args.iter()).finish()?;
        }
        Ok(())
    }
}

/// A dependency read during evaluation and the value it had.
pub type Dependency = (CacheKey, Value);

/// A memoized subscription result.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub(crate) value: Value,
    pub(crate) deps: Arc<[Dependency]>,
    /// State identity this entry is known to be valid for.
    pub(crate) state_id: u64,
}

impl CacheEntry {
    pub(crate) fn new(value: Value, deps: Vec<Dependency>, state_id: u64) -> Self {
        Self {
            value,
            deps: deps.into(),
            state_id,
        }
    }

    pub(crate) fn restamp(&self, state_id: u64) -> Self {
        Self {
            value: self.value.clone(),
            deps: Arc::clone(&self.deps),
            state_id,
        }
    }

    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    #[must_use]
    pub fn deps(&self) -> &[Dependency] {
        &self.deps
    }
}

/// Storage backing a context cache.
pub trait CachePolicy: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry>;
    fn put(&self, key: CacheKey, entry: CacheEntry);
    fn evict(&self, key: &CacheKey);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds a cache policy seeded with an initial map.
pub type CacheFactory =
    Arc<dyn Fn(AHashMap<CacheKey, CacheEntry>) -> Arc<dyn CachePolicy> + Send + Sync>;

/// Grows without bound. The default.
#[derive(Default)]
pub struct UnboundedCache {
    map: RwLock<AHashMap<CacheKey, CacheEntry>>,
}

impl UnboundedCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_entries(initial: AHashMap<CacheKey, CacheEntry>) -> Self {
        Self {
            map: RwLock::new(initial),
        }
    }
}

impl CachePolicy for UnboundedCache {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let map = self.map.read().unwrap_or_else(PoisonError::into_inner);
        map.get(key).cloned()
    }

    fn put(&self, key: CacheKey, entry: CacheEntry) {
        let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);
        map.insert(key, entry);
    }

    fn evict(&self, key: &CacheKey) {
        let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);
        map.remove(key);
    }

    fn len(&self) -> usize {
        self.map.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Keeps at most `capacity` entries, evicting the least recently used.
///
/// An evicted entry is simply recomputed on its next read; dependents that
/// recorded it re-validate through the recomputed value.
pub struct LruCachePolicy {
    inner: Mutex<lru::LruCache<CacheKey, CacheEntry, RandomState>>,
}

impl LruCachePolicy {
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(lru::LruCache::with_hasher(capacity, RandomState::new())),
        }
    }

    #[must_use]
    pub fn with_entries(capacity: NonZeroUsize, initial: AHashMap<CacheKey, CacheEntry>) -> Self {
        let policy = Self::new(capacity);
        {
            let mut cache = policy.inner.lock().unwrap_or_else(PoisonError::into_inner);
            for (key, entry) in initial {
                cache.put(key, entry);
            }
        }
        policy
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cap()
            .get()
    }
}

impl CachePolicy for LruCachePolicy {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let mut cache = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        cache.get(key).cloned()
    }

    fn put(&self, key: CacheKey, entry: CacheEntry) {
        let mut cache = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        cache.put(key, entry);
    }

    fn evict(&self, key: &CacheKey) {
        let mut cache = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        cache.pop(key);
    }

    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Declarative cache choice for contexts and runtimes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CacheConfig {
    #[default]
    Unbounded,
    Lru {
        capacity: NonZeroUsize,
    },
}

impl CacheConfig {
    /// LRU policy with the given capacity; a zero capacity falls back to 1.
    #[must_use]
    pub fn lru(capacity: usize) -> Self {
        Self::Lru {
            capacity: NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
        }
    }

    #[must_use]
    pub fn build(self, initial: AHashMap<CacheKey, CacheEntry>) -> Arc<dyn CachePolicy> {
        match self {
            Self::Unbounded => Arc::new(UnboundedCache::with_entries(initial)),
            Self::Lru { capacity } => Arc::new(LruCachePolicy::with_entries(capacity, initial)),
        }
    }

    #[must_use]
    pub fn factory(self) -> CacheFactory {
        Arc::new(move |initial| self.build(initial))
    }
}
