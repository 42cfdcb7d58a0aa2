//! Runtime configuration.

use std::fmt;
use std::sync::Arc;

use recon_core::{Context, Error, Value};

/// Maps every requested description before it is reconciled.
pub type MapDesc = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Observes render failures on the render thread.
pub type ErrorHook = Arc<dyn Fn(&Error) + Send + Sync>;

/// Default name of the render thread.
pub const DEFAULT_THREAD_NAME: &str = "recon-render";

/// Configuration for [`Runtime`](crate::Runtime).
#[derive(Clone)]
pub struct RuntimeConfig {
    /// Name given to the render thread.
    pub thread_name: String,
    /// Optional description middleware.
    pub map_desc: Option<MapDesc>,
    /// Optional render-failure hook, called after the failure is logged.
    pub on_error: Option<ErrorHook>,
    /// Context used by requests that do not bring their own.
    pub context: Option<Context>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            map_desc: None,
            on_error: None,
            context: None,
        }
    }
}

impl RuntimeConfig {
    /// Set the render thread's name.
    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Map each requested description before rendering.
    #[must_use]
    pub fn with_map_desc(mut self, f: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        self.map_desc = Some(Arc::new(f));
        self
    }

    /// Observe render failures.
    #[must_use]
    pub fn with_on_error(mut self, f: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Initial context for context-aware descriptions.
    #[must_use]
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }
}

impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("thread_name", &self.thread_name)
            .field("map_desc", &self.map_desc.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("context", &self.context)
            .finish()
    }
}
