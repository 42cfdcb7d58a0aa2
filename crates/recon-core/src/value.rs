#![forbid(unsafe_code)]

//! Immutable description values.
//!
//! A [`Value`] is the inert data an application hands to the reconciler. A
//! [`Description`] is the node form: a [`TypeTag`] plus named fields. Both are
//! persistent (`im` collections), so cloning is O(1) and structurally shared
//! between successive states.
//!
//! # Invariants
//!
//! 1. Equality is deep structural equality and is the only signal the
//!    reconciler uses to skip work.
//! 2. `Eq`, `Ord` and `Hash` agree: floats compare by `total_cmp` and hash by
//!    bit pattern, so `NaN == NaN` and `0.0 != -0.0`.
//! 3. Function tags compare by identity (the id assigned at construction),
//!    never by behavior.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use im::{OrdMap, Vector};

use crate::context::{Context, Subscription};
use crate::error::{Error, Result};
use crate::lifecycle::function::FnComponent;

/// Field carrying a caller-supplied identity for list reconciliation.
pub const KEY_FIELD: &str = "key";

/// Field name type for description fields.
pub type FieldName = Arc<str>;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Vector(Vector<Value>),
    Map(OrdMap<Value, Value>),
    Desc(Description),
}

impl Value {
    /// Build a vector value.
    pub fn vector<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::Vector(items.into_iter().map(Into::into).collect())
    }

    /// Build a map value.
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Value>,
        V: Into<Value>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_vector(&self) -> Option<&Vector<Value>> {
        match self {
            Self::Vector(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&OrdMap<Value, Value>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_desc(&self) -> Option<&Description> {
        match self {
            Self::Desc(d) => Some(d),
            _ => None,
        }
    }

    /// Look up `key` in a map (by key) or a vector (by integer index).
    #[must_use]
    pub fn get(&self, key: &Value) -> Option<&Value> {
        match (self, key) {
            (Self::Map(m), _) => m.get(key),
            (Self::Vector(v), Self::Int(i)) => usize::try_from(*i).ok().and_then(|i| v.get(i)),
            (Self::Desc(d), Self::Str(name)) => d.get(name),
            _ => None,
        }
    }

    /// Follow `path` through nested maps and vectors. Missing steps yield nil.
    #[must_use]
    pub fn get_in<'a, I>(&self, path: I) -> Value
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let mut cursor = self;
        for step in path {
            match cursor.get(step) {
                Some(next) => cursor = next,
                None => return Value::Nil,
            }
        }
        cursor.clone()
    }

    /// Return a copy of this map with `key` set to `value`.
    ///
    /// Nil is treated as the empty map. Any other non-map value is an error.
    pub fn assoc(&self, key: impl Into<Value>, value: impl Into<Value>) -> Result<Value> {
        match self {
            Self::Nil => Ok(Self::Map(OrdMap::unit(key.into(), value.into()))),
            Self::Map(m) => Ok(Self::Map(m.update(key.into(), value.into()))),
            Self::Vector(v) => {
                let key = key.into();
                let index = key
                    .as_int()
                    .and_then(|i| usize::try_from(i).ok())
                    .filter(|i| *i < v.len())
                    .ok_or_else(|| Error::invalid("a vector index", &key))?;
                Ok(Self::Vector(v.update(index, value.into())))
            }
            other => Err(Error::invalid("a map or vector", other)),
        }
    }

    /// Return a copy with the value at `path` replaced by `f(old)`.
    pub fn update_in(&self, path: &[Value], f: impl FnOnce(&Value) -> Value) -> Result<Value> {
        match path.split_first() {
            None => Ok(f(self)),
            Some((head, rest)) => {
                let child = self.get(head).cloned().unwrap_or_default();
                let updated = child.update_in(rest, f)?;
                self.assoc(head.clone(), updated)
            }
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Nil => 0,
            Self::Bool(_) => 1,
            Self::Int(_) => 2,
            Self::Float(_) => 3,
            Self::Str(_) => 4,
            Self::Vector(_) => 5,
            Self::Map(_) => 6,
            Self::Desc(_) => 7,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Vector(a), Self::Vector(b)) if a.ptr_eq(b) => true,
            (Self::Map(a), Self::Map(b)) if a.ptr_eq(b) => true,
            _ => self.cmp(other) == Ordering::Equal,
        }
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Nil, Self::Nil) => Ordering::Equal,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            (Self::Vector(a), Self::Vector(b)) => a.cmp(b),
            (Self::Map(a), Self::Map(b)) => a.cmp(b),
            (Self::Desc(a), Self::Desc(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Self::Nil => {}
            Self::Bool(b) => b.hash(state),
            Self::Int(i) => i.hash(state),
            Self::Float(f) => f.to_bits().hash(state),
            Self::Str(s) => s.hash(state),
            Self::Vector(v) => {
                v.len().hash(state);
                for item in v {
                    item.hash(state);
                }
            }
            Self::Map(m) => {
                m.len().hash(state);
                for (k, v) in m {
                    k.hash(state);
                    v.hash(state);
                }
            }
            Self::Desc(d) => d.hash(state),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("nil"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Vector(v) => f.debug_list().entries(v.iter()).finish(),
            Self::Map(m) => f.debug_map().entries(m.iter()).finish(),
            Self::Desc(d) => d.fmt(f),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Self::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(Arc::from(s))
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Self::Str(s)
    }
}

impl From<Description> for Value {
    fn from(d: Description) -> Self {
        Self::Desc(d)
    }
}

impl<V: Into<Value>> From<Vec<V>> for Value {
    fn from(items: Vec<V>) -> Self {
        Self::vector(items)
    }
}

impl<V: Into<Value>> From<Option<V>> for Value {
    fn from(v: Option<V>) -> Self {
        v.map_or(Self::Nil, Into::into)
    }
}

// ---------------------------------------------------------------------------
// Type tags
// ---------------------------------------------------------------------------

/// What a description says it is.
#[derive(Clone)]
pub enum TypeTag {
    /// Resolved through the [`Registry`](crate::registry::Registry).
    Named(Arc<str>),
    /// A function producing a replacement description.
    Func(FnComponent),
    /// A context-aware function, memoized as a subscription.
    ContextFn(Subscription),
}

impl TypeTag {
    /// Function component tag.
    pub fn func(
        name: impl Into<Arc<str>>,
        render: impl Fn(&Description) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self::Func(FnComponent::new(name, render))
    }

    /// Context-aware function component tag.
    ///
    /// The function receives a tracking view of the render context; every
    /// `sub` it makes becomes a dependency of the produced description.
    pub fn context_fn(
        name: impl Into<Arc<str>>,
        render: impl Fn(&Context, &Description) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self::ContextFn(Subscription::new(name, move |ctx, args| match args.first() {
            Some(Value::Desc(desc)) => render(ctx, desc),
            other => Err(Error::invalid(
                "a description argument",
                other.unwrap_or(&Value::Nil),
            )),
        }))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Func(f) => f.name(),
            Self::ContextFn(s) => s.name(),
        }
    }

    fn rank(&self) -> (u8, u64) {
        match self {
            Self::Named(_) => (0, 0),
            Self::Func(f) => (1, f.id()),
            Self::ContextFn(s) => (2, s.id()),
        }
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TypeTag {}

impl PartialOrd for TypeTag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeTag {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Named(a), Self::Named(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for TypeTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Named(name) => {
                0u8.hash(state);
                name.hash(state);
            }
            _ => self.rank().hash(state),
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Func(func) => write!(f, "fn:{}", func.name()),
            Self::ContextFn(sub) => write!(f, "context-fn:{}", sub.name()),
        }
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<&str> for TypeTag {
    fn from(name: &str) -> Self {
        Self::Named(Arc::from(name))
    }
}

impl From<String> for TypeTag {
    fn from(name: String) -> Self {
        Self::Named(Arc::from(name))
    }
}

impl From<FnComponent> for TypeTag {
    fn from(f: FnComponent) -> Self {
        Self::Func(f)
    }
}

// ---------------------------------------------------------------------------
// Description
// ---------------------------------------------------------------------------

/// A node description: type tag plus named fields.
#[derive(Clone)]
pub struct Description {
    tag: TypeTag,
    fields: OrdMap<FieldName, Value>,
}

impl Description {
    pub fn new(tag: impl Into<TypeTag>) -> Self {
        Self {
            tag: tag.into(),
            fields: OrdMap::new(),
        }
    }

    /// Set a field, returning the updated description.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(Arc::from(name), value.into());
        self
    }

    /// Set the list-matching key.
    #[must_use]
    pub fn keyed(self, key: impl Into<Value>) -> Self {
        self.with(KEY_FIELD, key)
    }

    /// Remove a field, returning the updated description.
    #[must_use]
    pub fn without(&self, name: &str) -> Self {
        Self {
            tag: self.tag.clone(),
            fields: self.fields.without(name),
        }
    }

    #[must_use]
    pub fn tag(&self) -> &TypeTag {
        &self.tag
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    #[must_use]
    pub fn key(&self) -> Option<&Value> {
        self.get(KEY_FIELD)
    }

    #[must_use]
    pub fn fields(&self) -> &OrdMap<FieldName, Value> {
        &self.fields
    }
}

impl PartialEq for Description {
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag && (self.fields.ptr_eq(&other.fields) || self.fields == other.fields)
    }
}

impl Eq for Description {}

impl PartialOrd for Description {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Description {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tag
            .cmp(&other.tag)
            .then_with(|| self.fields.cmp(&other.fields))
    }
}

impl Hash for Description {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tag.hash(state);
        self.fields.len().hash(state);
        for (name, value) in &self.fields {
            name.hash(state);
            value.hash(state);
        }
    }
}

impl fmt::Debug for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.tag)?;
        f.debug_map().entries(self.fields.iter()).finish()
    }
}
