#![forbid(unsafe_code)]

//! Memoization context: an immutable state snapshot plus a shared,
//! dependency-tracked cache.
//!
//! # Design
//!
//! A [`Context`] wraps an application state [`Value`] and a cache that every
//! context derived from it (via [`Context::swap`] / [`Context::reset`]) shares.
//! [`Context::sub`] reads either a key of the state or a [`Subscription`].
//! Subscription results are cached together with every `sub` the function
//! performed while running, so a later snapshot can reuse the entry when those
//! reads still produce the same values.
//!
//! # Invariants
//!
//! 1. The wrapped state is never mutated; every update builds a new context.
//! 2. Derived contexts share the cache; the cache is only added to.
//! 3. An entry is valid for a snapshot iff each recorded dependency,
//!    re-resolved (recursively) against that snapshot, equals the recorded
//!    value.
//! 4. A subscription error is returned to the caller and leaves the cache
//!    untouched.
//!
//! # Contract
//!
//! A subscription function must do all of its `sub` calls before it returns.
//! Reads through a captured view afterwards are not tracked (see
//! [`tracker`]).

pub mod cache;
pub mod subscription;
pub(crate) mod tracker;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;

pub use cache::{
    CacheConfig, CacheEntry, CacheFactory, CacheKey, CachePolicy, Dependency, LruCachePolicy,
    Selector, UnboundedCache,
};
pub use subscription::Subscription;

use crate::error::Result;
use crate::value::Value;
use tracker::Tracker;

static NEXT_STATE_ID: AtomicU64 = AtomicU64::new(1);

fn next_state_id() -> u64 {
    NEXT_STATE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Immutable state snapshot with a shared memoization cache.
///
/// Cheap to clone. `Send + Sync`: `sub` and `swap` may be called from any
/// thread.
#[derive(Clone)]
pub struct Context {
    state: Value,
    state_id: u64,
    cache: Arc<dyn CachePolicy>,
    tracker: Option<Tracker>,
}

impl Context {
    /// Root context with an unbounded cache.
    pub fn new(state: impl Into<Value>) -> Self {
        Self::with_cache(state, Arc::new(UnboundedCache::new()))
    }

    /// Root context backed by the given cache policy.
    pub fn with_cache(state: impl Into<Value>, cache: Arc<dyn CachePolicy>) -> Self {
        Self {
            state: state.into(),
            state_id: next_state_id(),
            cache,
            tracker: None,
        }
    }

    pub fn with_cache_config(state: impl Into<Value>, config: CacheConfig) -> Self {
        Self::with_cache(state, config.build(AHashMap::new()))
    }

    pub fn with_cache_factory(state: impl Into<Value>, factory: &CacheFactory) -> Self {
        Self::with_cache(state, factory(AHashMap::new()))
    }

    #[must_use]
    pub fn state(&self) -> &Value {
        &self.state
    }

    /// Identity of the wrapped state; fresh for every constructed context.
    #[must_use]
    pub fn state_id(&self) -> u64 {
        self.state_id
    }

    /// Whether both contexts wrap the same snapshot over the same cache.
    #[must_use]
    pub fn same_snapshot(&self, other: &Context) -> bool {
        self.state_id == other.state_id && self.shares_cache(other)
    }

    #[must_use]
    pub fn shares_cache(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.cache, &other.cache)
    }

    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// New context over `f(state)`, sharing this context's cache.
    #[must_use]
    pub fn swap(&self, f: impl FnOnce(&Value) -> Value) -> Context {
        self.reset(f(&self.state))
    }

    /// Like [`swap`](Self::swap) for fallible updates.
    pub fn try_swap(&self, f: impl FnOnce(&Value) -> Result<Value>) -> Result<Context> {
        Ok(self.reset(f(&self.state)?))
    }

    /// New context over `state`, sharing this context's cache.
    #[must_use]
    pub fn reset(&self, state: impl Into<Value>) -> Context {
        Context {
            state: state.into(),
            state_id: next_state_id(),
            cache: Arc::clone(&self.cache),
            tracker: None,
        }
    }

    /// Read a state key or evaluate a subscription with no arguments.
    pub fn sub(&self, selector: impl Into<Selector>) -> Result<Value> {
        self.sub_with(selector, Vec::new())
    }

    /// Read a state path (`key` then `args` as nested keys) or evaluate a
    /// subscription with arguments.
    pub fn sub_with(
        &self,
        selector: impl Into<Selector>,
        args: impl IntoIterator<Item = Value>,
    ) -> Result<Value> {
        let key = CacheKey::new(selector.into(), args.into_iter().collect::<Vec<_>>());
        let value = self.resolve(&key)?;
        if let Some(tracker) = &self.tracker {
            tracker.record(&key, &value);
        }
        Ok(value)
    }

    fn untracked(&self) -> Context {
        Context {
            state: self.state.clone(),
            state_id: self.state_id,
            cache: Arc::clone(&self.cache),
            tracker: None,
        }
    }

    fn resolve(&self, key: &CacheKey) -> Result<Value> {
        match &key.selector {
            Selector::Key(k) => Ok(self.state.get_in(std::iter::once(k).chain(key.args.iter()))),
            Selector::Sub(sub) => self.resolve_sub(sub, key),
        }
    }

    fn resolve_sub(&self, sub: &Subscription, key: &CacheKey) -> Result<Value> {
        if let Some(entry) = self.cache.get(key) {
            if entry.state_id == self.state_id {
                tracing::trace!(subscription = %sub.name(), "cache hit");
                return Ok(entry.value);
            }
            if self.deps_still_hold(&entry.deps) {
                tracing::trace!(subscription = %sub.name(), "cache entry revalidated");
                self.cache.put(key.clone(), entry.restamp(self.state_id));
                return Ok(entry.value);
            }
        }

        let _span = tracing::debug_span!("subscription", name = %sub.name()).entered();
        let tracker = Tracker::open(sub.name_arc());
        let view = Context {
            tracker: Some(tracker.clone()),
            ..self.untracked()
        };
        let result = sub.call(&view, &key.args);
        let deps = tracker.close();
        let value = result?;
        tracing::debug!(deps = deps.len(), "subscription recomputed");
        self.cache
            .put(key.clone(), CacheEntry::new(value.clone(), deps, self.state_id));
        Ok(value)
    }

    /// A dependency that now fails to resolve counts as changed; the
    /// recomputation that follows surfaces the error if it still matters.
    fn deps_still_hold(&self, deps: &[Dependency]) -> bool {
        deps.iter()
            .all(|(dep, recorded)| matches!(self.resolve(dep), Ok(v) if v == *recorded))
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("state_id", &self.state_id)
            .field("state", &self.state)
            .field("cache_len", &self.cache.len())
            .field("tracking", &self.tracker.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    fn tasks(items: &[(&str, bool)]) -> Value {
        Value::map([(
            "tasks",
            Value::vector(
                items
                    .iter()
                    .map(|(text, done)| Value::map([("text", Value::from(*text)), ("done", Value::from(*done))])),
            ),
        )])
    }

    fn set_task(ctx: &Context, index: i64, field: &str, value: impl Into<Value>) -> Context {
        let value = value.into();
        ctx.try_swap(|state| {
            state.update_in(
                &[Value::from("tasks"), Value::from(index), Value::from(field)],
                |_| value,
            )
        })
        .unwrap()
    }

    #[test]
    fn key_reads_are_direct() {
        let ctx = Context::new(Value::map([("filter", "all")]));
        assert_eq!(ctx.sub("filter").unwrap(), Value::from("all"));
        assert!(ctx.sub("missing").unwrap().is_nil());
        assert_eq!(ctx.cache_len(), 0);
    }

    #[test]
    fn key_with_args_reads_a_path() {
        let ctx = Context::new(tasks(&[("a", false), ("b", true)]));
        let done = ctx
            .sub_with("tasks", [Value::from(1), Value::from("done")])
            .unwrap();
        assert_eq!(done, Value::from(true));
    }

    #[test]
    fn subscription_is_cached_per_snapshot() {
        let calls = counter();
        let c = calls.clone();
        let count = Subscription::new("count", move |ctx, _| {
            c.fetch_add(1, Ordering::SeqCst);
            let tasks = ctx.sub("tasks")?;
            Ok(Value::from(tasks.as_vector().map_or(0, |v| v.len())))
        });

        let ctx = Context::new(tasks(&[("a", false)]));
        assert_eq!(ctx.sub(&count).unwrap(), Value::from(1));
        assert_eq!(ctx.sub(&count).unwrap(), Value::from(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unrelated_state_change_reuses_entry() {
        let calls = counter();
        let c = calls.clone();
        let filter = Subscription::new("filter", move |ctx, _| {
            c.fetch_add(1, Ordering::SeqCst);
            ctx.sub("filter")
        });

        let ctx = Context::new(Value::map([("filter", Value::from("all")), ("tasks", Value::vector([1]))]));
        ctx.sub(&filter).unwrap();
        let next = ctx.swap(|s| s.assoc("tasks", Value::vector([1, 2])).unwrap());
        assert_eq!(next.sub(&filter).unwrap(), Value::from("all"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(next.shares_cache(&ctx));
        assert!(!next.same_snapshot(&ctx));
    }

    #[test]
    fn intermediate_subscription_shields_dependents() {
        let done_calls = counter();
        let count_calls = counter();

        let dones = {
            let c = done_calls.clone();
            Subscription::new("task-dones", move |ctx, _| {
                c.fetch_add(1, Ordering::SeqCst);
                let tasks = ctx.sub("tasks")?;
                Ok(Value::vector(
                    tasks
                        .as_vector()
                        .into_iter()
                        .flatten()
                        .map(|t| t.get(&"done".into()).cloned().unwrap_or_default()),
                ))
            })
        };
        let count_done = {
            let c = count_calls.clone();
            let dones = dones.clone();
            Subscription::new("count-done", move |ctx, _| {
                c.fetch_add(1, Ordering::SeqCst);
                let dones = ctx.sub(&dones)?;
                let n = dones
                    .as_vector()
                    .map_or(0, |v| v.iter().filter(|d| d.as_bool() == Some(true)).count());
                Ok(Value::from(n))
            })
        };

        let c1 = Context::new(tasks(&[("a", false), ("b", true)]));
        assert_eq!(c1.sub(&count_done).unwrap(), Value::from(1));

        let c2 = set_task(&c1, 0, "text", "renamed");
        assert_eq!(c2.sub(&count_done).unwrap(), Value::from(1));
        assert_eq!(done_calls.load(Ordering::SeqCst), 2);
        assert_eq!(count_calls.load(Ordering::SeqCst), 1);

        let c3 = set_task(&c2, 0, "done", true);
        assert_eq!(c3.sub(&count_done).unwrap(), Value::from(2));
        assert_eq!(count_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn args_are_part_of_the_key() {
        let calls = counter();
        let c = calls.clone();
        let nth_text = Subscription::new("nth-text", move |ctx, args| {
            c.fetch_add(1, Ordering::SeqCst);
            let index = args.first().cloned().unwrap_or_default();
            ctx.sub_with("tasks", [index, Value::from("text")])
        });

        let ctx = Context::new(tasks(&[("a", false), ("b", true)]));
        assert_eq!(ctx.sub_with(&nth_text, [Value::from(0)]).unwrap(), Value::from("a"));
        assert_eq!(ctx.sub_with(&nth_text, [Value::from(1)]).unwrap(), Value::from("b"));
        assert_eq!(ctx.sub_with(&nth_text, [Value::from(0)]).unwrap(), Value::from("a"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Only task 1 changes: the entry for index 0 stays valid.
        let next = set_task(&ctx, 1, "text", "bb");
        assert_eq!(next.sub_with(&nth_text, [Value::from(0)]).unwrap(), Value::from("a"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(next.sub_with(&nth_text, [Value::from(1)]).unwrap(), Value::from("bb"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn errors_propagate_and_are_not_cached() {
        let calls = counter();
        let c = calls.clone();
        let strict = Subscription::new("strict", move |ctx, _| {
            c.fetch_add(1, Ordering::SeqCst);
            let tasks = ctx.sub("tasks")?;
            if tasks.is_nil() {
                return Err(Error::other("no tasks"));
            }
            Ok(tasks)
        });
        let ctx = Context::new(Value::map([("other", 1)]));
        assert!(ctx.sub(&strict).is_err());
        assert!(ctx.sub(&strict).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(ctx.cache_len(), 0);
    }

    #[test]
    fn reset_keeps_cache_and_changes_identity() {
        let ctx = Context::new(Value::map([("n", 1)]));
        let next = ctx.reset(Value::map([("n", 1)]));
        assert!(next.shares_cache(&ctx));
        assert_ne!(next.state_id(), ctx.state_id());
        assert_eq!(ctx.state().get(&"n".into()), Some(&Value::from(1)));
    }

    #[test]
    fn lru_config_bounds_cache() {
        let subs: Vec<_> = (0..4)
            .map(|i| Subscription::new(format!("s{i}"), move |_, _| Ok(Value::from(i))))
            .collect();
        let ctx = Context::with_cache_config(Value::Nil, CacheConfig::lru(2));
        for s in &subs {
            ctx.sub(s).unwrap();
        }
        assert_eq!(ctx.cache_len(), 2);
    }
}
