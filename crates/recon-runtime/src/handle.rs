use std::sync::mpsc;
use std::time::Duration;

use recon_core::Live;

use crate::error::DispatchError;

/// Resolves to the root's live value once the render servicing a request
/// has run.
///
/// A superseded request resolves to the result of the render that replaced
/// it, not to an error.
#[derive(Debug)]
pub struct RenderHandle {
    rx: mpsc::Receiver<Result<Live, DispatchError>>,
}

impl RenderHandle {
    pub(crate) fn channel() -> (mpsc::Sender<Result<Live, DispatchError>>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self { rx })
    }

    /// Block until the render finishes.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Render`] if the render failed,
    /// [`DispatchError::Shutdown`] if the runtime stopped first.
    pub fn wait(self) -> Result<Live, DispatchError> {
        self.rx.recv().unwrap_or(Err(DispatchError::Shutdown))
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`. The handle stays
    /// usable after a timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Live, DispatchError> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(DispatchError::Timeout),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(DispatchError::Shutdown),
        }
    }

    /// Non-blocking poll; `None` while the render is still pending.
    #[must_use]
    pub fn try_get(&self) -> Option<Result<Live, DispatchError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => Some(Err(DispatchError::Shutdown)),
        }
    }
}
