#![forbid(unsafe_code)]

//! Dedicated render thread.
//!
//! [`Runtime`] moves the root [`Renderer`] onto its own thread. That thread
//! is the only place live instances are created, mutated or released, so a
//! single-thread-confined toolkit is safe by construction, while
//! [`Runtime::request`] may be called from any thread.
//!
//! # Coalescing Rules
//!
//! - Requests are coalesced: if several arrive before the thread picks one
//!   up, only the latest description is rendered.
//! - Every handle registered against a coalesced batch resolves to the
//!   result of the render that actually ran.
//! - `refresh` and `unmount` are merged with a pending request so the tree
//!   ends up as if they had run in order.
//!
//! # Error Propagation
//!
//! A failed render resolves its handles with [`DispatchError::Render`], is
//! logged at `WARN`, and is passed to the configured error hook. The thread
//! keeps servicing later requests.
//!
//! # Example
//!
//! ```ignore
//! use recon_core::{Description, Registry};
//! use recon_runtime::{Runtime, RuntimeConfig};
//! use std::sync::Arc;
//!
//! let rt = Runtime::start(Arc::new(registry), RuntimeConfig::default());
//! let live = rt.request(Description::new("label").with("text", "hi")).wait()?;
//! rt.shutdown();
//! ```

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use recon_core::{Context, Registry, Value};

use crate::config::{ErrorHook, RuntimeConfig};
use crate::error::DispatchError;
use crate::handle::RenderHandle;
use crate::mailbox::{Batch, Mailbox, Op};
use crate::renderer::Renderer;

/// Handle to a running render thread.
pub struct Runtime {
    mailbox: Arc<Mailbox>,
    handle: Option<JoinHandle<()>>,
}

impl Runtime {
    /// Spawn the render thread over `registry`.
    pub fn start(registry: Arc<Registry>, config: RuntimeConfig) -> Self {
        let mailbox = Arc::new(Mailbox::default());
        let renderer = Renderer::new(registry)
            .with_context(config.context)
            .with_map_desc(config.map_desc);
        let on_error = config.on_error;

        let handle = thread::Builder::new()
            .name(config.thread_name)
            .spawn({
                let mailbox = Arc::clone(&mailbox);
                move || render_loop(renderer, &mailbox, on_error.as_ref())
            })
            .expect("failed to spawn render thread");

        Self {
            mailbox,
            handle: Some(handle),
        }
    }

    /// Ask for `desc` to be rendered. Never waits for the render.
    pub fn request(&self, desc: impl Into<Value>) -> RenderHandle {
        self.mailbox.post(Op::Render {
            desc: desc.into(),
            context: None,
            force: false,
        })
    }

    /// Ask for `desc` to be rendered under `context`, which stays in effect
    /// for later requests.
    pub fn request_with_context(&self, desc: impl Into<Value>, context: Context) -> RenderHandle {
        self.mailbox.post(Op::Render {
            desc: desc.into(),
            context: Some(context),
            force: false,
        })
    }

    /// Recreate the tree from the last description, bypassing the
    /// equal-description short circuit.
    pub fn refresh(&self) -> RenderHandle {
        self.mailbox.post(Op::Refresh)
    }

    /// Delete the tree. The handle resolves to nil.
    pub fn unmount(&self) -> RenderHandle {
        self.mailbox.post(Op::Unmount)
    }

    /// Finish pending work, release the tree and join the thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.mailbox.close();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        // Best-effort shutdown if the caller forgot to call shutdown().
        self.stop();
    }
}

/// The render thread's main loop.
///
/// Takes one coalesced batch at a time, applies it, and resolves every
/// waiter of the batch with the same result.
fn render_loop(mut renderer: Renderer, mailbox: &Mailbox, on_error: Option<&ErrorHook>) {
    while let Some(Batch { op, waiters }) = mailbox.take() {
        let result = match op {
            Op::Render {
                desc,
                context,
                force,
            } => renderer.apply(desc, context, force),
            Op::Refresh => renderer.refresh(),
            Op::Unmount => {
                renderer.unmount();
                Ok(renderer.live())
            }
        };
        let result = result.map_err(|err| {
            tracing::warn!(error = %err, waiters = waiters.len(), "render failed");
            if let Some(hook) = on_error {
                hook(&err);
            }
            DispatchError::Render(Arc::new(err))
        });
        for waiter in waiters {
            // The caller may have dropped its handle.
            let _ = waiter.send(result.clone());
        }
    }
    renderer.unmount();
}
