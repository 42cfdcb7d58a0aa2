#![forbid(unsafe_code)]

//! Core: descriptions, lifecycles, composite reconciliation, and the
//! memoization context.

pub mod context;
pub mod error;
pub mod instance;
pub mod lifecycle;
pub mod registry;
pub mod value;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use context::{CacheConfig, Context, Subscription};
pub use error::{BoxError, Error, Result};
pub use instance::{Instance, Live};
pub use lifecycle::{
    Component, Composite, CompositeBuilder, FnComponent, Lifecycle, MANY_TYPE, Prop, PropKind,
    RenderCx,
};
pub use registry::Registry;
pub use value::{Description, KEY_FIELD, TypeTag, Value};
