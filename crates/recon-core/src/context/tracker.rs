//! Dependency accumulator for one subscription evaluation.
//!
//! A tracker is opened right before a subscription function runs and closed
//! as soon as it returns. The function receives a context view carrying the
//! tracker, so every `sub` it performs lands in this accumulator. Nested
//! evaluations open their own tracker; nothing is ambient or global.
//!
//! Reads made through the view after the scope closed (a lazily consumed
//! iterator, a stored clone) are dropped with a warning instead of being
//! silently attributed to a finished evaluation.

use std::sync::{Arc, Mutex, PoisonError};

use super::cache::{CacheKey, Dependency};
use crate::value::Value;

#[derive(Debug, Default)]
struct Frame {
    deps: Vec<Dependency>,
    closed: bool,
}

#[derive(Clone, Debug)]
pub(crate) struct Tracker {
    owner: Arc<str>,
    frame: Arc<Mutex<Frame>>,
}

impl Tracker {
    pub(crate) fn open(owner: Arc<str>) -> Self {
        Self {
            owner,
            frame: Arc::new(Mutex::new(Frame::default())),
        }
    }

    /// Record a read. The first read of a key wins; a snapshot cannot yield
    /// two different values for one key.
    pub(crate) fn record(&self, key: &CacheKey, value: &Value) {
        let mut frame = self.frame.lock().unwrap_or_else(PoisonError::into_inner);
        if frame.closed {
            tracing::warn!(
                subscription = %self.owner,
                dependency = ?key,
                "sub called after the subscription returned; read is not tracked"
            );
            return;
        }
        if frame.deps.iter().any(|(k, _)| k == key) {
            return;
        }
        frame.deps.push((key.clone(), value.clone()));
    }

    /// Close the scope and hand back everything recorded.
    pub(crate) fn close(&self) -> Vec<Dependency> {
        let mut frame = self.frame.lock().unwrap_or_else(PoisonError::into_inner);
        frame.closed = true;
        std::mem::take(&mut frame.deps)
    }
}
