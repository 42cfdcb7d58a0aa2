use std::sync::Arc;

use thiserror::Error;

/// Why a render handle resolved without a live value.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// The render that serviced the request failed.
    #[error("render failed: {0}")]
    Render(Arc<recon_core::Error>),

    /// The runtime shut down before the request was serviced.
    #[error("runtime shut down")]
    Shutdown,

    /// [`RenderHandle::wait_timeout`](crate::RenderHandle::wait_timeout)
    /// gave up before the render finished.
    #[error("timed out waiting for render")]
    Timeout,
}

impl DispatchError {
    /// The underlying reconciliation error, if the render itself failed.
    #[must_use]
    pub fn render_error(&self) -> Option<&recon_core::Error> {
        match self {
            Self::Render(err) => Some(err),
            _ => None,
        }
    }
}
