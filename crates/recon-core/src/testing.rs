//! Recording mock toolkit for tests.
//!
//! Enabled for this crate's tests and, through the `test-helpers` feature,
//! for downstream crates. Every constructor, setter and release call lands in
//! a shared [`Journal`] so tests can assert on exactly what reconciliation
//! did to the "native" objects.
//!
//! Types provided:
//!
//! | type     | extends | ctor args | props                                    |
//! |----------|---------|-----------|------------------------------------------|
//! | `node`   |         |           | `opacity`, `visible` (default `true`), `width` (coerced to float), `broken` (setter always fails) |
//! | `label`  | `node`  |           | `text`                                   |
//! | `button` | `node`  |           | `text`, `on-click`                       |
//! | `vbox`   | `node`  |           | `children` (list)                        |
//! | `pane`   | `node`  |           | `content` (single), `slots` (map)        |
//! | `stage`  | `node`  | `title`   | `content` (single)                       |
//! | `sticky` | `node`  |           | `text`; its release hook always fails    |

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::BoxError;
use crate::instance::{Instance, Live};
use crate::lifecycle::{Composite, Prop, PropKind, RenderCx};
use crate::registry::Registry;
use crate::value::Value;

static NEXT_WIDGET_ID: AtomicU64 = AtomicU64::new(1);

/// One recorded toolkit call.
#[derive(Clone, Debug)]
pub enum Event {
    Construct {
        type_name: String,
        id: u64,
    },
    Set {
        type_name: String,
        id: u64,
        prop: String,
        value: Live,
    },
    Release {
        type_name: String,
        id: u64,
    },
}

/// Shared, append-only call log.
#[derive(Clone, Debug, Default)]
pub struct Journal {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Journal {
    fn lock(&self) -> MutexGuard<'_, Vec<Event>> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn push(&self, event: Event) {
        self.lock().push(event);
    }

    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    #[must_use]
    pub fn count_constructed(&self, type_name: &str) -> usize {
        self.lock()
            .iter()
            .filter(|e| matches!(e, Event::Construct { type_name: t, .. } if t == type_name))
            .count()
    }

    #[must_use]
    pub fn count_released(&self, type_name: &str) -> usize {
        self.lock()
            .iter()
            .filter(|e| matches!(e, Event::Release { type_name: t, .. } if t == type_name))
            .count()
    }

    /// Number of setter calls for `prop`, across all widgets.
    #[must_use]
    pub fn count_sets(&self, prop: &str) -> usize {
        self.lock()
            .iter()
            .filter(|e| matches!(e, Event::Set { prop: p, .. } if p == prop))
            .count()
    }
}

/// The mock "native" object.
#[derive(Debug)]
pub struct Widget {
    id: u64,
    type_name: String,
    props: Mutex<BTreeMap<String, Live>>,
}

impl Widget {
    fn new(type_name: &str) -> Self {
        Self {
            id: NEXT_WIDGET_ID.fetch_add(1, Ordering::Relaxed),
            type_name: type_name.to_string(),
            props: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Live>> {
        self.props
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Last value set for `name`; nil if never set.
    #[must_use]
    pub fn prop(&self, name: &str) -> Live {
        self.lock().get(name).cloned().unwrap_or_default()
    }

    /// Live values currently installed as `children`.
    #[must_use]
    pub fn children(&self) -> Vec<Live> {
        match self.prop("children") {
            Live::List(items) => items,
            _ => Vec::new(),
        }
    }
}

fn widget(instance: &Instance) -> Result<&Widget, BoxError> {
    instance
        .downcast_ref::<Widget>()
        .ok_or_else(|| format!("not a mock widget: {}", instance.type_name()).into())
}

/// Registry of mock composites sharing one journal.
#[derive(Clone, Debug)]
pub struct MockToolkit {
    registry: Arc<Registry>,
    journal: Journal,
}

impl Default for MockToolkit {
    fn default() -> Self {
        Self::new()
    }
}

impl MockToolkit {
    #[must_use]
    pub fn new() -> Self {
        let journal = Journal::default();
        let kit = Kit {
            journal: journal.clone(),
        };

        let node = Composite::builder("node")
            .ctor(&[], kit.ctor("node"))
            .prop("opacity", kit.prop(PropKind::Scalar, "opacity"))
            .prop(
                "visible",
                kit.prop(PropKind::Scalar, "visible").with_default(true),
            )
            .prop(
                "width",
                kit.prop(PropKind::Scalar, "width").with_coerce(|v| match v {
                    Value::Int(i) => Ok(Value::Float(*i as f64)),
                    Value::Float(_) => Ok(v.clone()),
                    other => Err(format!("not a width: {other:?}").into()),
                }),
            )
            .prop(
                "broken",
                Prop::scalar(|_, _| Err("setter rejected the value".into())),
            )
            .release(kit.release())
            .build();

        let derived = |name: &str, props: &[(&str, PropKind)]| {
            let mut builder = Composite::builder(name).ctor(&[], kit.ctor(name));
            for (prop, kind) in props {
                builder = builder.prop(prop, kit.prop(*kind, prop));
            }
            builder.extends(&node).build()
        };

        let stage = Composite::builder("stage")
            .ctor(&["title"], {
                let kit = kit.clone();
                move |args| {
                    let instance = kit.construct("stage")?;
                    let title = args.first().cloned().unwrap_or_default();
                    widget(&instance)?
                        .lock()
                        .insert("title".to_string(), Live::Value(title));
                    Ok(instance)
                }
            })
            .prop("content", kit.prop(PropKind::Single, "content"))
            .extends(&node)
            .build();

        let sticky = Composite::builder("sticky")
            .ctor(&[], kit.ctor("sticky"))
            .prop("text", kit.prop(PropKind::Scalar, "text"))
            .release(|_| Err("release rejected".into()))
            .extends(&node)
            .build();

        let registry = Registry::new()
            .with_composite(derived("label", &[("text", PropKind::Scalar)]))
            .with_composite(derived(
                "button",
                &[("text", PropKind::Scalar), ("on-click", PropKind::Scalar)],
            ))
            .with_composite(derived("vbox", &[("children", PropKind::List)]))
            .with_composite(derived(
                "pane",
                &[("content", PropKind::Single), ("slots", PropKind::Map)],
            ))
            .with_composite(stage)
            .with_composite(sticky)
            .with_composite(node);

        Self {
            registry: Arc::new(registry),
            journal,
        }
    }

    /// Render context over the mock registry, without a memoization context.
    #[must_use]
    pub fn cx(&self) -> RenderCx {
        RenderCx::new(Arc::clone(&self.registry))
    }

    #[must_use]
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    #[must_use]
    pub fn journal(&self) -> &Journal {
        &self.journal
    }
}

#[derive(Clone)]
struct Kit {
    journal: Journal,
}

impl Kit {
    fn construct(&self, type_name: &str) -> Result<Instance, BoxError> {
        let w = Widget::new(type_name);
        self.journal.push(Event::Construct {
            type_name: type_name.to_string(),
            id: w.id,
        });
        Ok(Instance::new(w))
    }

    fn ctor(
        &self,
        type_name: &str,
    ) -> impl Fn(&[Value]) -> Result<Instance, BoxError> + Send + Sync + 'static {
        let kit = self.clone();
        let type_name = type_name.to_string();
        move |_| kit.construct(&type_name)
    }

    fn prop(&self, kind: PropKind, name: &str) -> Prop {
        let journal = self.journal.clone();
        let name = name.to_string();
        Prop::new(kind, move |instance, value| {
            let w = widget(instance)?;
            w.lock().insert(name.clone(), value.clone());
            journal.push(Event::Set {
                type_name: w.type_name.clone(),
                id: w.id,
                prop: name.clone(),
                value: value.clone(),
            });
            Ok(())
        })
    }

    fn release(&self) -> impl Fn(&Instance) -> Result<(), BoxError> + Send + Sync + 'static {
        let journal = self.journal.clone();
        move |instance| {
            let w = widget(instance)?;
            journal.push(Event::Release {
                type_name: w.type_name.clone(),
                id: w.id,
            });
            Ok(())
        }
    }
}
