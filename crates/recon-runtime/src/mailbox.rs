//! Depth-one coalescing mailbox between callers and the render thread.
//!
//! Posting never waits for a render: it merges the new operation into the
//! single pending slot (latest wins), registers a waiter, and wakes the
//! render thread. Every waiter registered against the slot is resolved by
//! the render that finally services it.

use std::sync::mpsc;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use recon_core::{Context, Live, Value};

use crate::error::DispatchError;
use crate::handle::RenderHandle;

pub(crate) type Waiter = mpsc::Sender<Result<Live, DispatchError>>;

/// A pending unit of work for the render thread.
#[derive(Debug)]
pub(crate) enum Op {
    /// Reconcile against `desc`; `force` deletes the root first.
    Render {
        desc: Value,
        context: Option<Context>,
        force: bool,
    },
    /// Recreate from the last description.
    Refresh,
    /// Delete the root.
    Unmount,
}

impl Op {
    /// Merge a newer operation into a pending one.
    ///
    /// The merged operation leaves the tree in the state that running both in
    /// order would have.
    fn merge(self, newer: Op) -> Op {
        match (self, newer) {
            (_, Op::Unmount) => Op::Unmount,
            (Op::Unmount, Op::Refresh) => Op::Unmount,
            (Op::Refresh, Op::Refresh) => Op::Refresh,
            (Op::Unmount | Op::Refresh, Op::Render { desc, context, .. }) => Op::Render {
                desc,
                context,
                force: true,
            },
            (Op::Render { desc, context, .. }, Op::Refresh) => Op::Render {
                desc,
                context,
                force: true,
            },
            (
                Op::Render {
                    context: older,
                    force: forced,
                    ..
                },
                Op::Render {
                    desc,
                    context,
                    force,
                },
            ) => Op::Render {
                desc,
                context: context.or(older),
                force: force || forced,
            },
        }
    }
}

/// What the render thread takes out of the mailbox in one go.
pub(crate) struct Batch {
    pub(crate) op: Op,
    pub(crate) waiters: Vec<Waiter>,
}

#[derive(Default)]
struct Slot {
    op: Option<Op>,
    waiters: Vec<Waiter>,
    closed: bool,
}

#[derive(Default)]
pub(crate) struct Mailbox {
    slot: Mutex<Slot>,
    ready: Condvar,
}

impl Mailbox {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Merge `op` into the pending slot and return a handle for its result.
    pub(crate) fn post(&self, op: Op) -> RenderHandle {
        let (tx, handle) = RenderHandle::channel();
        let mut slot = self.lock();
        if slot.closed {
            let _ = tx.send(Err(DispatchError::Shutdown));
            return handle;
        }
        let merged = match slot.op.take() {
            Some(pending) => {
                tracing::trace!("coalescing with pending request");
                pending.merge(op)
            }
            None => op,
        };
        slot.op = Some(merged);
        slot.waiters.push(tx);
        drop(slot);
        self.ready.notify_one();
        handle
    }

    /// Block until there is work. Returns `None` once closed and drained.
    pub(crate) fn take(&self) -> Option<Batch> {
        let mut slot = self.lock();
        loop {
            if let Some(op) = slot.op.take() {
                let waiters = std::mem::take(&mut slot.waiters);
                return Some(Batch { op, waiters });
            }
            if slot.closed {
                return None;
            }
            slot = self
                .ready
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Refuse further posts. Work already pending is still handed out.
    pub(crate) fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }
}
