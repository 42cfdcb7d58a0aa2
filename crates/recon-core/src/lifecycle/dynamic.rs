//! Type-dispatched lifecycle.
//!
//! Type identity is the coarsest reconciliation key: a tag change always
//! deletes the old instance and creates a new one.

use super::{Component, Lifecycle, RenderCx};
use crate::error::{Error, Result};
use crate::value::{TypeTag, Value};

fn tag_of(desc: &Value) -> Option<&TypeTag> {
    desc.as_desc().map(|d| d.tag())
}

fn resolve(desc: &Value, cx: &RenderCx) -> Result<Lifecycle> {
    match desc {
        Value::Nil => Ok(Lifecycle::Scalar),
        Value::Desc(d) => cx.registry().resolve(d.tag()),
        other => Err(Error::invalid("a description or nil", other)),
    }
}

pub(super) fn create(desc: &Value, cx: &RenderCx) -> Result<Component> {
    resolve(desc, cx)?.create(desc, cx)
}

pub(super) fn advance(component: Component, desc: &Value, cx: &RenderCx) -> Result<Component> {
    // Resolve first: a bad shape must fail the same way `create` does.
    let resolved = match resolve(desc, cx) {
        Ok(lifecycle) => lifecycle,
        Err(err) => return component.discard(err),
    };
    if tag_of(&component.desc) == tag_of(desc) {
        let lifecycle = component.lifecycle.clone();
        return lifecycle.advance(component, desc, cx);
    }
    tracing::debug!(
        from = ?tag_of(&component.desc),
        to = ?tag_of(desc),
        "type changed; replacing instance"
    );
    component.delete();
    resolved.create(desc, cx)
}
