//! Live values produced by lifecycles.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::value::Value;

/// Opaque handle to a live toolkit object.
///
/// Cloning shares the object. Identity (not equality) is what the reconciler
/// cares about: [`Instance::ptr_eq`] tells whether two handles point at the same
/// object.
#[derive(Clone)]
pub struct Instance {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Instance {
    pub fn new<T: Any + Send + Sync>(object: T) -> Self {
        Self {
            inner: Arc::new(object),
            type_name: std::any::type_name::<T>(),
        }
    }

    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:p}", self.type_name, Arc::as_ptr(&self.inner))
    }
}

/// The live value of a component, as handed to setters and returned from
/// renders.
#[derive(Clone, Debug)]
pub enum Live {
    /// A scalar passed through (possibly coerced).
    Value(Value),
    /// A toolkit object.
    Object(Instance),
    /// Ordered children.
    List(Vec<Live>),
    /// Children keyed by their map key, in key order.
    Map(Vec<(Value, Live)>),
}

impl Default for Live {
    fn default() -> Self {
        Self::Value(Value::Nil)
    }
}

impl Live {
    /// Identity comparison: objects by pointer, scalars by value, collections
    /// element-wise in order.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Value(a), Self::Value(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same(y))
            }
            (Self::Map(a), Self::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.same(vb))
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Value(Value::Nil))
    }

    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&Instance> {
        match self {
            Self::Object(i) => Some(i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Live]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Downcast an object live value to the toolkit's concrete type.
    #[must_use]
    pub fn downcast_ref<T: std::any::Any>(&self) -> Option<&T> {
        self.as_object().and_then(|i| i.downcast_ref::<T>())
    }
}
