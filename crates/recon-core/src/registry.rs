//! Type tag resolution.
//!
//! The registry is plain data: a table from type names to lifecycles plus an
//! optional fallback resolver consulted for names the table does not know.
//! Function tags carry their own lifecycle and never hit the table.

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;

use crate::error::{Error, Result};
use crate::lifecycle::{Composite, Lifecycle, MANY_TYPE};
use crate::value::TypeTag;

type Fallback = dyn Fn(&str) -> Option<Lifecycle> + Send + Sync;

/// Maps type names to lifecycles.
#[derive(Clone)]
pub struct Registry {
    types: AHashMap<Arc<str>, Lifecycle>,
    fallback: Option<Arc<Fallback>>,
}

impl Registry {
    /// Registry holding the built-in lifecycles.
    #[must_use]
    pub fn new() -> Self {
        Self::empty().with(MANY_TYPE, Lifecycle::Many)
    }

    /// Registry with nothing registered, not even the built-ins.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            types: AHashMap::new(),
            fallback: None,
        }
    }

    #[must_use]
    pub fn with(mut self, name: &str, lifecycle: Lifecycle) -> Self {
        self.register(name, lifecycle);
        self
    }

    #[must_use]
    pub fn with_composite(mut self, composite: Arc<Composite>) -> Self {
        self.register_composite(composite);
        self
    }

    /// Resolver consulted when a name is not registered.
    #[must_use]
    pub fn with_fallback(
        mut self,
        fallback: impl Fn(&str) -> Option<Lifecycle> + Send + Sync + 'static,
    ) -> Self {
        self.fallback = Some(Arc::new(fallback));
        self
    }

    /// Register `lifecycle` under `name`, returning the one it replaced.
    pub fn register(&mut self, name: &str, lifecycle: Lifecycle) -> Option<Lifecycle> {
        self.types.insert(Arc::from(name), lifecycle)
    }

    /// Register a composite under its own name.
    pub fn register_composite(&mut self, composite: Arc<Composite>) -> Option<Lifecycle> {
        let name = Arc::from(composite.name());
        self.types.insert(name, Lifecycle::Composite(composite))
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Lifecycle> {
        self.types.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Lifecycle for a description's type tag.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownType`] when neither the table nor the fallback knows
    /// the name.
    pub fn resolve(&self, tag: &TypeTag) -> Result<Lifecycle> {
        match tag {
            TypeTag::Func(f) => Ok(Lifecycle::Function(f.clone())),
            TypeTag::ContextFn(sub) => Ok(Lifecycle::ContextFunction(sub.clone())),
            TypeTag::Named(name) => self
                .types
                .get(name.as_ref())
                .cloned()
                .or_else(|| self.fallback.as_ref().and_then(|f| f(name.as_ref())))
                .ok_or_else(|| Error::unknown_type(name)),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.types.keys().map(|k| &**k).collect();
        names.sort_unstable();
        f.debug_struct("Registry")
            .field("types", &names)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}
