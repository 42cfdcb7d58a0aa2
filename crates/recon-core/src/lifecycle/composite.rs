//! Composite objects: a constructor plus a property table.
//!
//! A [`Composite`] is the generic lifecycle for toolkit objects. The toolkit
//! supplies the constructor, the ordered constructor-argument fields, and one
//! [`Prop`] per settable property; the composite handles diffing.
//!
//! Tables compose through [`CompositeBuilder::extends`]: the parent's entries
//! come first, and an entry declared again by the child replaces the parent's
//! entry in place. The merge happens once, when the composite is built.
//!
//! On `advance`, every entry is compared by value against the previous
//! description. Unchanged entries are skipped without calling the setter or
//! visiting the child, so handler-like values only cost an equality check.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::{Children, Component, Lifecycle, RenderCx, discard_all, expect_desc};
use crate::error::{BoxError, Error, Result};
use crate::instance::{Instance, Live};
use crate::value::{Description, FieldName, Value};

type CtorFn = dyn Fn(&[Value]) -> std::result::Result<Instance, BoxError> + Send + Sync;
type SetterFn = dyn Fn(&Instance, &Live) -> std::result::Result<(), BoxError> + Send + Sync;
type CoerceFn = dyn Fn(&Value) -> std::result::Result<Value, BoxError> + Send + Sync;
type ReleaseFn = dyn Fn(&Instance) -> std::result::Result<(), BoxError> + Send + Sync;

/// How a property's value is reconciled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropKind {
    /// Coerced and handed to the setter as-is.
    Scalar,
    /// One child description, type-dispatched.
    Single,
    /// Vector of child descriptions, matched by key or position.
    List,
    /// Map of child descriptions, matched by map key.
    Map,
}

impl PropKind {
    fn lifecycle(self) -> Option<Lifecycle> {
        match self {
            Self::Scalar => None,
            Self::Single => Some(Lifecycle::Dynamic),
            Self::List => Some(Lifecycle::List),
            Self::Map => Some(Lifecycle::Map),
        }
    }
}

/// One entry of a property table.
#[derive(Clone)]
pub struct Prop {
    kind: PropKind,
    setter: Arc<SetterFn>,
    coerce: Option<Arc<CoerceFn>>,
    default: Option<Value>,
}

impl Prop {
    pub fn new(
        kind: PropKind,
        setter: impl Fn(&Instance, &Live) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            setter: Arc::new(setter),
            coerce: None,
            default: None,
        }
    }

    pub fn scalar(
        setter: impl Fn(&Instance, &Live) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(PropKind::Scalar, setter)
    }

    pub fn single(
        setter: impl Fn(&Instance, &Live) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(PropKind::Single, setter)
    }

    pub fn list(
        setter: impl Fn(&Instance, &Live) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(PropKind::List, setter)
    }

    pub fn map(
        setter: impl Fn(&Instance, &Live) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(PropKind::Map, setter)
    }

    /// Convert supplied scalar values before they reach the setter.
    /// Ignored for child-managing kinds.
    #[must_use]
    pub fn with_coerce(
        mut self,
        coerce: impl Fn(&Value) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.coerce = Some(Arc::new(coerce));
        self
    }

    /// Value applied when the description omits the property.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    #[must_use]
    pub fn kind(&self) -> PropKind {
        self.kind
    }

    #[must_use]
    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// The value in effect for `desc`: the supplied field, else the default.
    fn effective<'a>(&'a self, desc: &'a Description, name: &str) -> Option<&'a Value> {
        desc.get(name).or(self.default.as_ref())
    }
}

impl fmt::Debug for Prop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prop")
            .field("kind", &self.kind)
            .field("coerce", &self.coerce.is_some())
            .field("default", &self.default)
            .finish()
    }
}

/// Generic object lifecycle built from a constructor and a property table.
pub struct Composite {
    name: Arc<str>,
    ctor: Option<Arc<CtorFn>>,
    ctor_args: Vec<FieldName>,
    props: Vec<(FieldName, Prop)>,
    release: Option<Arc<ReleaseFn>>,
}

impl Composite {
    pub fn builder(name: impl Into<Arc<str>>) -> CompositeBuilder {
        CompositeBuilder {
            name: name.into(),
            ctor: None,
            ctor_args: Vec::new(),
            props: Vec::new(),
            release: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Constructor-argument fields, in call order.
    #[must_use]
    pub fn ctor_args(&self) -> &[FieldName] {
        &self.ctor_args
    }

    /// The merged property table, in application order.
    pub fn props(&self) -> impl Iterator<Item = (&str, &Prop)> {
        self.props.iter().map(|(name, prop)| (name.as_ref(), prop))
    }

    #[must_use]
    pub fn prop(&self, name: &str) -> Option<&Prop> {
        self.props
            .iter()
            .find(|(n, _)| n.as_ref() == name)
            .map(|(_, p)| p)
    }

    fn is_ctor_arg(&self, name: &str) -> bool {
        self.ctor_args.iter().any(|a| a.as_ref() == name)
    }

    fn construct(&self, desc: &Description) -> Result<Instance> {
        let args = self
            .ctor_args
            .iter()
            .map(|field| {
                desc.get(field)
                    .cloned()
                    .ok_or_else(|| Error::MissingConstructorArg {
                        type_name: self.name.clone(),
                        field: field.clone(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        let ctor = self.ctor.as_ref().ok_or_else(|| Error::Construction {
            type_name: self.name.clone(),
            source: "no constructor declared".into(),
        })?;
        ctor(&args).map_err(|source| Error::Construction {
            type_name: self.name.clone(),
            source,
        })
    }

    fn ctor_args_changed(&self, old: &Description, new: &Description) -> bool {
        self.ctor_args
            .iter()
            .any(|field| old.get(field) != new.get(field))
    }

    fn set(&self, instance: &Instance, name: &FieldName, prop: &Prop, value: &Live) -> Result<()> {
        (prop.setter)(instance, value).map_err(|source| Error::PropertyApplication {
            type_name: self.name.clone(),
            prop: name.clone(),
            source,
        })
    }

    fn set_scalar(
        &self,
        instance: &Instance,
        name: &FieldName,
        prop: &Prop,
        value: Option<&Value>,
    ) -> Result<()> {
        let value = match (value, &prop.coerce) {
            (None, _) | (Some(Value::Nil), _) => Value::Nil,
            (Some(v), Some(coerce)) => coerce(v).map_err(|source| Error::Coercion {
                type_name: self.name.clone(),
                prop: name.clone(),
                source,
            })?,
            (Some(v), None) => v.clone(),
        };
        self.set(instance, name, prop, &Live::Value(value))
    }

    fn assemble(
        self: &Arc<Self>,
        desc: &Value,
        instance: Instance,
        children: BTreeMap<FieldName, Component>,
        cx: &RenderCx,
    ) -> Component {
        Component {
            lifecycle: Lifecycle::Composite(Arc::clone(self)),
            desc: desc.clone(),
            live: Live::Object(instance),
            context: cx.inherited_context(children.values()),
            children: Children::Props(children),
        }
    }

    pub(super) fn create(self: &Arc<Self>, desc: &Value, cx: &RenderCx) -> Result<Component> {
        let d = expect_desc(desc, "a composite description")?;
        let instance = self.construct(d)?;
        tracing::trace!(type_name = %self.name, "constructed");

        let mut children = BTreeMap::new();
        if let Err(err) = self.create_props(&instance, d, &mut children, cx) {
            self.abandon(&instance, children);
            return Err(err);
        }
        Ok(self.assemble(desc, instance, children, cx))
    }

    fn create_props(
        &self,
        instance: &Instance,
        d: &Description,
        children: &mut BTreeMap<FieldName, Component>,
        cx: &RenderCx,
    ) -> Result<()> {
        for (name, prop) in &self.props {
            if self.is_ctor_arg(name) {
                continue;
            }
            let Some(value) = prop.effective(d, name) else {
                continue;
            };
            match prop.kind.lifecycle() {
                None => self.set_scalar(instance, name, prop, Some(value))?,
                Some(lifecycle) => {
                    let child = lifecycle.create(value, cx)?;
                    let live = child.live().clone();
                    children.insert(name.clone(), child);
                    self.set(instance, name, prop, &live)?;
                }
            }
        }
        Ok(())
    }

    pub(super) fn advance(
        self: &Arc<Self>,
        component: Component,
        desc: &Value,
        cx: &RenderCx,
    ) -> Result<Component> {
        let new = match expect_desc(desc, "a composite description") {
            Ok(new) => new,
            Err(err) => return component.discard(err),
        };
        let (old, instance) = match (component.desc.as_desc(), component.live.as_object()) {
            (Some(old), Some(instance)) => (old.clone(), instance.clone()),
            _ => {
                component.delete();
                return self.create(desc, cx);
            }
        };
        if self.ctor_args_changed(&old, new) {
            tracing::debug!(type_name = %self.name, "constructor arguments changed; recreating");
            component.delete();
            return self.create(desc, cx);
        }

        let mut previous = match component.children {
            Children::Props(previous) => previous,
            _ => BTreeMap::new(),
        };
        let mut children = BTreeMap::new();
        let applied = self.advance_props(&instance, &old, new, &mut previous, &mut children, cx);
        // Entries the table no longer names cannot exist, but never leak them.
        discard_all(previous.into_values());
        if let Err(err) = applied {
            self.abandon(&instance, children);
            return Err(err);
        }
        Ok(self.assemble(desc, instance, children, cx))
    }

    fn advance_props(
        &self,
        instance: &Instance,
        old: &Description,
        new: &Description,
        previous: &mut BTreeMap<FieldName, Component>,
        children: &mut BTreeMap<FieldName, Component>,
        cx: &RenderCx,
    ) -> Result<()> {
        for (name, prop) in &self.props {
            if self.is_ctor_arg(name) {
                continue;
            }
            let before = prop.effective(old, name);
            let after = prop.effective(new, name);
            let Some(lifecycle) = prop.kind.lifecycle() else {
                if before != after {
                    self.set_scalar(instance, name, prop, after)?;
                }
                continue;
            };
            match (previous.remove(name), after) {
                (Some(child), Some(value)) => {
                    let live_before = child.live().clone();
                    let child = lifecycle.advance(child, value, cx)?;
                    let live = child.live().clone();
                    children.insert(name.clone(), child);
                    if !live.same(&live_before) {
                        self.set(instance, name, prop, &live)?;
                    }
                }
                (None, Some(value)) => {
                    let child = lifecycle.create(value, cx)?;
                    let live = child.live().clone();
                    children.insert(name.clone(), child);
                    self.set(instance, name, prop, &live)?;
                }
                (Some(stale), None) => {
                    stale.delete();
                    self.set(instance, name, prop, &Live::default())?;
                }
                (None, None) => {}
            }
        }
        Ok(())
    }

    /// Tear down a half-built or half-advanced instance.
    fn abandon(&self, instance: &Instance, children: BTreeMap<FieldName, Component>) {
        discard_all(children.into_values());
        self.release_instance(instance);
    }

    /// Run the release hook for a live instance. Failures are logged.
    pub(crate) fn release(&self, live: &Live) {
        if let Some(instance) = live.as_object() {
            self.release_instance(instance);
        }
    }

    fn release_instance(&self, instance: &Instance) {
        let Some(release) = &self.release else {
            return;
        };
        if let Err(err) = release(instance) {
            tracing::warn!(type_name = %self.name, error = %err, "release failed");
        }
    }
}

impl fmt::Debug for Composite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composite")
            .field("name", &self.name)
            .field("ctor_args", &self.ctor_args)
            .field("props", &self.props.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`Composite`].
#[must_use]
pub struct CompositeBuilder {
    name: Arc<str>,
    ctor: Option<Arc<CtorFn>>,
    ctor_args: Vec<FieldName>,
    props: Vec<(FieldName, Prop)>,
    release: Option<Arc<ReleaseFn>>,
}

impl CompositeBuilder {
    /// Inherit the parent's constructor, property table and release hook.
    /// Entries declared afterwards override the inherited ones.
    pub fn extends(mut self, parent: &Composite) -> Self {
        if self.ctor.is_none() {
            self.ctor = parent.ctor.clone();
            self.ctor_args = parent.ctor_args.clone();
        }
        if self.release.is_none() {
            self.release = parent.release.clone();
        }
        let own = std::mem::take(&mut self.props);
        self.props = parent.props.clone();
        for (name, prop) in own {
            self = self.prop(&name, prop);
        }
        self
    }

    pub fn ctor(
        mut self,
        args: &[&str],
        ctor: impl Fn(&[Value]) -> std::result::Result<Instance, BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.ctor = Some(Arc::new(ctor));
        self.ctor_args = args.iter().map(|a| Arc::from(*a)).collect();
        self
    }

    pub fn prop(mut self, name: &str, prop: Prop) -> Self {
        match self.props.iter_mut().find(|(n, _)| n.as_ref() == name) {
            Some(slot) => slot.1 = prop,
            None => self.props.push((Arc::from(name), prop)),
        }
        self
    }

    pub fn release(
        mut self,
        release: impl Fn(&Instance) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.release = Some(Arc::new(release));
        self
    }

    #[must_use]
    pub fn build(self) -> Arc<Composite> {
        Arc::new(Composite {
            name: self.name,
            ctor: self.ctor,
            ctor_args: self.ctor_args,
            props: self.props,
            release: self.release,
        })
    }
}
