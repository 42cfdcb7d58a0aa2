use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::Context;
use crate::error::Result;
use crate::value::Value;

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

type SubFn = dyn Fn(&Context, &[Value]) -> Result<Value> + Send + Sync;

/// A pure function of a [`Context`] (and arguments) whose results are cached
/// and dependency-tracked.
///
/// Identity is assigned at construction: two subscriptions built from the same
/// closure are different cache keys. Build each subscription once and share
/// clones.
#[derive(Clone)]
pub struct Subscription {
    id: u64,
    name: Arc<str>,
    f: Arc<SubFn>,
}

impl Subscription {
    pub fn new(
        name: impl Into<Arc<str>>,
        f: impl Fn(&Context, &[Value]) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            f: Arc::new(f),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub(crate) fn call(&self, ctx: &Context, args: &[Value]) -> Result<Value> {
        (self.f)(ctx, args)
    }
}

impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Subscription {}

impl Hash for Subscription {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}
