//! Function components.
//!
//! A function tag turns its description into a replacement description,
//! which is reconciled as a dynamic child. The context-aware flavor runs as a
//! [`Subscription`] keyed by the description: while the reads it made still
//! hold under the new context, the cached replacement is reused and the child
//! is advanced with an equal description (a no-op).

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{Children, Component, Lifecycle, RenderCx, discard_all, expect_desc};
use crate::context::{Context, Subscription};
use crate::error::{Error, Result};
use crate::value::{Description, Value};

static NEXT_FN_ID: AtomicU64 = AtomicU64::new(1);

type RenderFn = dyn Fn(&Description) -> Result<Value> + Send + Sync;

/// A plain function component. Compared by identity.
#[derive(Clone)]
pub struct FnComponent {
    id: u64,
    name: Arc<str>,
    render: Arc<RenderFn>,
}

impl FnComponent {
    pub fn new(
        name: impl Into<Arc<str>>,
        render: impl Fn(&Description) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: NEXT_FN_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            render: Arc::new(render),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, desc: &Description) -> Result<Value> {
        (self.render)(desc)
    }
}

impl fmt::Debug for FnComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

fn assemble(
    lifecycle: Lifecycle,
    desc: &Value,
    child: Component,
    context: Option<Context>,
) -> Component {
    Component {
        lifecycle,
        desc: desc.clone(),
        live: child.live.clone(),
        context,
        children: Children::One(Box::new(child)),
    }
}

fn into_child(component: Component) -> Option<Component> {
    match component.children {
        Children::One(child) => Some(*child),
        _ => None,
    }
}

fn reconcile_child(
    child: Option<Component>,
    produced: &Value,
    cx: &RenderCx,
) -> Result<Component> {
    match child {
        Some(child) => Lifecycle::Dynamic.advance(child, produced, cx),
        None => Lifecycle::Dynamic.create(produced, cx),
    }
}

pub(super) fn create(f: &FnComponent, desc: &Value, cx: &RenderCx) -> Result<Component> {
    let produced = f.call(expect_desc(desc, "a function component description")?)?;
    let child = Lifecycle::Dynamic.create(&produced, cx)?;
    let context = cx.inherited_context([&child]);
    Ok(assemble(Lifecycle::Function(f.clone()), desc, child, context))
}

pub(super) fn advance(
    f: &FnComponent,
    component: Component,
    desc: &Value,
    cx: &RenderCx,
) -> Result<Component> {
    let unchanged = component.desc == *desc;
    let child = into_child(component);
    // An equal description reaching here means only the context moved: keep
    // the previous output and let the child subtree re-validate.
    let produced = match (&child, unchanged) {
        (Some(child), true) => Ok(child.desc.clone()),
        _ => expect_desc(desc, "a function component description").and_then(|d| f.call(d)),
    };
    let produced = match produced {
        Ok(produced) => produced,
        Err(err) => {
            discard_all(child);
            return Err(err);
        }
    };
    let child = reconcile_child(child, &produced, cx)?;
    let context = cx.inherited_context([&child]);
    Ok(assemble(Lifecycle::Function(f.clone()), desc, child, context))
}

fn render_with_context(sub: &Subscription, desc: &Value, cx: &RenderCx) -> Result<Value> {
    expect_desc(desc, "a context function description")?;
    let ctx = cx.context().ok_or_else(|| Error::MissingContext {
        tag: sub.name().to_string(),
    })?;
    ctx.sub_with(sub, [desc.clone()])
}

pub(super) fn create_with_context(
    sub: &Subscription,
    desc: &Value,
    cx: &RenderCx,
) -> Result<Component> {
    let produced = render_with_context(sub, desc, cx)?;
    let child = Lifecycle::Dynamic.create(&produced, cx)?;
    Ok(assemble(
        Lifecycle::ContextFunction(sub.clone()),
        desc,
        child,
        cx.context().cloned(),
    ))
}

pub(super) fn advance_with_context(
    sub: &Subscription,
    component: Component,
    desc: &Value,
    cx: &RenderCx,
) -> Result<Component> {
    let produced = match render_with_context(sub, desc, cx) {
        Ok(produced) => produced,
        Err(err) => return component.discard(err),
    };
    let child = reconcile_child(into_child(component), &produced, cx)?;
    Ok(assemble(
        Lifecycle::ContextFunction(sub.clone()),
        desc,
        child,
        cx.context().cloned(),
    ))
}
