#![forbid(unsafe_code)]

//! Lifecycles: strategies that create, advance and delete live objects from
//! descriptions.
//!
//! # Design
//!
//! [`Lifecycle`] is a closed sum of strategies. A registry maps type tags to
//! lifecycles; structural positions (a composite's list property, a function
//! component's output) pick their lifecycle directly. Lifecycles hold no
//! per-node state: everything a node needs between passes lives in its
//! [`Component`].
//!
//! # Invariants
//!
//! 1. `advance` with a description equal to the recorded one returns the
//!    component untouched, without visiting children.
//! 2. A component exclusively owns its live instance and its child
//!    components; `delete` tears them down depth-first.
//! 3. A component records the context it was rendered under iff some node in
//!    its subtree reads from the context. Such a component is also advanced
//!    when only the context changed, so context functions can re-validate.
//!
//! # Failure Modes
//!
//! - **Unknown tag / bad shape**: `create`/`advance` return the error. Before
//!   returning, everything the call owned is deleted: the component passed
//!   to `advance` and any children built so far. A failed pass never leaves
//!   unreleased instances behind.
//! - **Release hook fails**: logged at `WARN`; siblings are still deleted.

pub mod composite;
mod dynamic;
pub mod function;
mod list;
mod map;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::context::{Context, Subscription};
use crate::error::{Error, Result};
use crate::instance::Live;
use crate::registry::Registry;
use crate::value::{FieldName, Value};

pub use composite::{Composite, CompositeBuilder, Prop, PropKind};
pub use function::FnComponent;

/// Name of the built-in lifecycle rendering a list of descriptions held in
/// the `desc` field.
pub const MANY_TYPE: &str = "recon/many";

/// Everything a lifecycle needs besides the description: how to resolve type
/// tags and, for context functions, the current context.
#[derive(Clone)]
pub struct RenderCx {
    registry: Arc<Registry>,
    context: Option<Context>,
}

impl RenderCx {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            context: None,
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: Option<Context>) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[must_use]
    pub fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }

    /// Context to record on a component built from `children`.
    fn inherited_context<'a>(
        &self,
        children: impl IntoIterator<Item = &'a Component>,
    ) -> Option<Context> {
        if children.into_iter().any(Component::depends_on_context) {
            self.context.clone()
        } else {
            None
        }
    }
}

/// Reconciliation strategy.
#[derive(Clone)]
pub enum Lifecycle {
    /// Passthrough: the live value is the description itself.
    Scalar,
    /// Resolve the description's type tag and delegate.
    Dynamic,
    /// Ordered list of dynamics, matched by key or position.
    List,
    /// Map of dynamics, matched by map key.
    Map,
    /// A description whose `desc` field is a list of dynamics.
    Many,
    /// Toolkit object built from a constructor and a property table.
    Composite(Arc<Composite>),
    /// Function producing a replacement description.
    Function(FnComponent),
    /// Context-aware function, memoized as a subscription.
    ContextFunction(Subscription),
}

impl Lifecycle {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Scalar => "scalar",
            Self::Dynamic => "dynamic",
            Self::List => "list",
            Self::Map => "map",
            Self::Many => MANY_TYPE,
            Self::Composite(c) => c.name(),
            Self::Function(f) => f.name(),
            Self::ContextFunction(s) => s.name(),
        }
    }

    /// Build a fresh component. Never consults a prior component.
    pub fn create(&self, desc: &Value, cx: &RenderCx) -> Result<Component> {
        match self {
            Self::Scalar => Ok(Component::scalar(desc)),
            Self::Dynamic => dynamic::create(desc, cx),
            Self::List => list::create(desc, cx),
            Self::Map => map::create(desc, cx),
            Self::Many => list::create_many(desc, cx),
            Self::Composite(c) => c.create(desc, cx),
            Self::Function(f) => function::create(f, desc, cx),
            Self::ContextFunction(s) => function::create_with_context(s, desc, cx),
        }
    }

    /// Bring `component` in line with `desc`.
    pub fn advance(&self, component: Component, desc: &Value, cx: &RenderCx) -> Result<Component> {
        if component.is_current(desc, cx) {
            tracing::trace!(lifecycle = self.name(), "description unchanged; skipping");
            return Ok(component);
        }
        match self {
            Self::Scalar => Ok(Component::scalar(desc)),
            Self::Dynamic => dynamic::advance(component, desc, cx),
            Self::List => list::advance(component, desc, cx),
            Self::Map => map::advance(component, desc, cx),
            Self::Many => list::advance_many(component, desc, cx),
            Self::Composite(c) => c.advance(component, desc, cx),
            Self::Function(f) => function::advance(f, component, desc, cx),
            Self::ContextFunction(s) => function::advance_with_context(s, component, desc, cx),
        }
    }

    /// Tear the component down, children first.
    pub fn delete(&self, component: Component) {
        component.delete();
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lifecycle({})", self.name())
    }
}

pub(crate) enum Children {
    None,
    One(Box<Component>),
    List(Vec<Component>),
    Map(BTreeMap<Value, Component>),
    Props(BTreeMap<FieldName, Component>),
}

/// A live instance together with the description that produced it and the
/// lifecycle that owns it.
pub struct Component {
    lifecycle: Lifecycle,
    desc: Value,
    live: Live,
    children: Children,
    context: Option<Context>,
}

impl Component {
    fn scalar(desc: &Value) -> Self {
        Self {
            lifecycle: Lifecycle::Scalar,
            desc: desc.clone(),
            live: Live::Value(desc.clone()),
            children: Children::None,
            context: None,
        }
    }

    /// The description this component was last created or advanced with.
    #[must_use]
    pub fn desc(&self) -> &Value {
        &self.desc
    }

    #[must_use]
    pub fn live(&self) -> &Live {
        &self.live
    }

    #[must_use]
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Whether some node in this subtree reads from the render context.
    #[must_use]
    pub fn depends_on_context(&self) -> bool {
        self.context.is_some()
    }

    /// Direct child components, in reconciliation order.
    pub fn children(&self) -> Box<dyn Iterator<Item = &Component> + '_> {
        match &self.children {
            Children::None => Box::new(std::iter::empty()),
            Children::One(child) => Box::new(std::iter::once(child.as_ref())),
            Children::List(items) => Box::new(items.iter()),
            Children::Map(entries) => Box::new(entries.values()),
            Children::Props(props) => Box::new(props.values()),
        }
    }

    fn is_current(&self, desc: &Value, cx: &RenderCx) -> bool {
        if self.desc != *desc {
            return false;
        }
        match (&self.context, cx.context()) {
            (None, _) => true,
            (Some(old), Some(new)) => old.same_snapshot(new),
            (Some(_), None) => false,
        }
    }

    /// Delete owned children depth-first, then release the instance.
    ///
    /// Best effort: a failing release is logged and teardown continues.
    pub fn delete(self) {
        let Component {
            lifecycle,
            live,
            children,
            ..
        } = self;
        match children {
            Children::None => {}
            Children::One(child) => child.delete(),
            Children::List(items) => items.into_iter().for_each(Component::delete),
            Children::Map(entries) => entries.into_values().for_each(Component::delete),
            Children::Props(props) => props.into_values().for_each(Component::delete),
        }
        if let Lifecycle::Composite(composite) = &lifecycle {
            composite.release(&live);
        }
    }

    /// Delete this component and fail with `err`.
    fn discard<T>(self, err: Error) -> Result<T> {
        self.delete();
        Err(err)
    }
}

/// Delete components left over by a failed pass.
fn discard_all(components: impl IntoIterator<Item = Component>) {
    components.into_iter().for_each(Component::delete);
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("lifecycle", &self.lifecycle.name())
            .field("desc", &self.desc)
            .field("live", &self.live)
            .field("context", &self.context.as_ref().map(Context::state_id))
            .finish()
    }
}

/// Unwrap a description value or fail with a shape error.
fn expect_desc<'a>(desc: &'a Value, expected: &'static str) -> Result<&'a crate::value::Description> {
    desc.as_desc().ok_or_else(|| Error::invalid(expected, desc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Event, MockToolkit};
    use crate::value::Description;
    use tracing_test::traced_test;

    #[test]
    fn scalar_passthrough() {
        let cx = RenderCx::new(Arc::new(Registry::new()));
        let c = Lifecycle::Scalar.create(&Value::from(7), &cx).unwrap();
        assert!(c.live().same(&Live::Value(Value::from(7))));
        let c = Lifecycle::Scalar.advance(c, &Value::from(8), &cx).unwrap();
        assert_eq!(c.desc(), &Value::from(8));
    }

    #[test]
    fn equal_advance_touches_nothing() {
        let kit = MockToolkit::new();
        let cx = kit.cx();
        let desc: Value = Description::new("vbox")
            .with(
                "children",
                Value::vector([
                    Description::new("label").with("text", "a"),
                    Description::new("label").with("text", "b"),
                ]),
            )
            .into();

        let c = Lifecycle::Dynamic.create(&desc, &cx).unwrap();
        let before = c.live().clone();
        let events = kit.journal().len();

        let c = Lifecycle::Dynamic.advance(c, &desc.clone(), &cx).unwrap();
        assert!(c.live().same(&before));
        assert_eq!(kit.journal().len(), events);
    }

    #[test]
    fn delete_is_depth_first() {
        let kit = MockToolkit::new();
        let cx = kit.cx();
        let desc: Value = Description::new("vbox")
            .with("children", Value::vector([Description::new("label").with("text", "a")]))
            .into();
        let c = Lifecycle::Dynamic.create(&desc, &cx).unwrap();
        kit.journal().clear();

        c.delete();
        let released: Vec<_> = kit
            .journal()
            .events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Release { type_name, .. } => Some(type_name),
                _ => None,
            })
            .collect();
        assert_eq!(released, vec!["label".to_string(), "vbox".to_string()]);
    }

    #[test]
    fn children_iterates_owned_components() {
        let kit = MockToolkit::new();
        let cx = kit.cx();
        let desc: Value = Description::new("vbox")
            .with(
                "children",
                Value::vector([
                    Description::new("label").with("text", "a"),
                    Description::new("label").with("text", "b"),
                ]),
            )
            .into();
        let c = Lifecycle::Dynamic.create(&desc, &cx).unwrap();
        let list = c.children().next().unwrap();
        assert_eq!(list.children().count(), 2);
    }

    #[test]
    #[traced_test]
    fn failing_release_does_not_stop_sibling_teardown() {
        let kit = MockToolkit::new();
        let cx = kit.cx();
        let desc: Value = Description::new("vbox")
            .with(
                "children",
                Value::vector([
                    Description::new("sticky").with("text", "s"),
                    Description::new("label").with("text", "a"),
                ]),
            )
            .into();
        let c = Lifecycle::Dynamic.create(&desc, &cx).unwrap();

        c.delete();
        assert_eq!(kit.journal().count_released("label"), 1);
        assert_eq!(kit.journal().count_released("vbox"), 1);
        assert!(logs_contain("release failed"));
    }
}
