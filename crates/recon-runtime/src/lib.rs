#![forbid(unsafe_code)]

//! Runtime: coalescing request dispatch onto a single render thread.

pub mod config;
pub mod error;
pub mod handle;
mod mailbox;
pub mod render_thread;
pub mod renderer;

pub use config::{DEFAULT_THREAD_NAME, ErrorHook, MapDesc, RuntimeConfig};
pub use error::DispatchError;
pub use handle::RenderHandle;
pub use render_thread::Runtime;
pub use renderer::Renderer;
