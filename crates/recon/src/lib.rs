#![forbid(unsafe_code)]

//! recon public facade.
//!
//! Describe the tree you want as an immutable [`Value`](prelude::Value);
//! recon brings the live object graph in line with it.

pub mod prelude {
    pub use recon_core as core;
    #[cfg(feature = "runtime")]
    pub use recon_runtime as runtime;

    pub use recon_core::{
        Component, Composite, Context, Description, Error, Instance, Lifecycle, Live, Prop,
        PropKind, Registry, RenderCx, Subscription, TypeTag, Value,
    };
    #[cfg(feature = "runtime")]
    pub use recon_runtime::{DispatchError, RenderHandle, Renderer, Runtime, RuntimeConfig};
}
