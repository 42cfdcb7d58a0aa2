//! Synchronous root reconciler.
//!
//! A [`Renderer`] owns one root [`Component`] and reconciles it against each
//! new description. It does no threading of its own; the render thread owns
//! one, and tests or single-threaded hosts can drive one directly.

use std::sync::Arc;

use recon_core::{Component, Context, Lifecycle, Live, Registry, RenderCx, Result, Value};

use crate::config::MapDesc;

/// Owns the root component of one rendered tree.
pub struct Renderer {
    registry: Arc<Registry>,
    root: Option<Component>,
    last: Option<Value>,
    context: Option<Context>,
    map_desc: Option<MapDesc>,
}

impl Renderer {
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            root: None,
            last: None,
            context: None,
            map_desc: None,
        }
    }

    /// Context used until a render supplies another one.
    #[must_use]
    pub fn with_context(mut self, context: Option<Context>) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn with_map_desc(mut self, map_desc: Option<MapDesc>) -> Self {
        self.map_desc = map_desc;
        self
    }

    /// Reconcile the root against `desc` under the current context.
    ///
    /// # Errors
    ///
    /// Any reconciliation error. The failed pass released the previous
    /// tree and anything it had built, so the renderer is left unmounted
    /// and the next render creates from scratch.
    pub fn render(&mut self, desc: impl Into<Value>) -> Result<Live> {
        self.reconcile(desc.into(), false)
    }

    /// Like [`render`](Self::render), switching to `context` first. The
    /// context stays in effect for later renders.
    pub fn render_with_context(&mut self, desc: impl Into<Value>, context: Context) -> Result<Live> {
        self.context = Some(context);
        self.reconcile(desc.into(), false)
    }

    /// Delete the root and create it again from the last description.
    pub fn refresh(&mut self) -> Result<Live> {
        match self.last.clone() {
            Some(desc) => self.reconcile(desc, true),
            None => Ok(Live::default()),
        }
    }

    /// Delete the root. The next render creates from scratch.
    pub fn unmount(&mut self) {
        if let Some(root) = self.root.take() {
            tracing::debug!("unmounting root");
            root.delete();
        }
        self.last = None;
    }

    /// Live value of the current root; nil when unmounted.
    #[must_use]
    pub fn live(&self) -> Live {
        self.root
            .as_ref()
            .map(|root| root.live().clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn root(&self) -> Option<&Component> {
        self.root.as_ref()
    }

    #[must_use]
    pub fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }

    /// Apply a coalesced operation from the mailbox.
    pub(crate) fn apply(&mut self, desc: Value, context: Option<Context>, force: bool) -> Result<Live> {
        if context.is_some() {
            self.context = context;
        }
        self.reconcile(desc, force)
    }

    fn reconcile(&mut self, requested: Value, force: bool) -> Result<Live> {
        let _span = tracing::debug_span!("render", force).entered();
        let desc = match &self.map_desc {
            Some(map) => map(requested.clone()),
            None => requested.clone(),
        };
        self.last = Some(requested);

        let cx = RenderCx::new(Arc::clone(&self.registry)).with_context(self.context.clone());
        let result = match self.root.take() {
            Some(root) if !force => Lifecycle::Dynamic.advance(root, &desc, &cx),
            Some(root) => {
                root.delete();
                Lifecycle::Dynamic.create(&desc, &cx)
            }
            None => Lifecycle::Dynamic.create(&desc, &cx),
        };
        let root = result?;
        let live = root.live().clone();
        self.root = Some(root);
        Ok(live)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_core::Description;
    use recon_core::testing::{MockToolkit, Widget};
    use tracing_test::traced_test;

    fn label(text: &str) -> Value {
        Description::new("label").with("text", text).into()
    }

    #[test]
    fn successive_renders_advance_in_place() {
        let kit = MockToolkit::new();
        let mut renderer = Renderer::new(kit.registry());
        let first = renderer.render(label("a")).unwrap();
        let second = renderer.render(label("b")).unwrap();
        assert!(first.same(&second));
        assert_eq!(kit.journal().count_constructed("label"), 1);
    }

    #[test]
    fn refresh_recreates_from_last_description() {
        let kit = MockToolkit::new();
        let mut renderer = Renderer::new(kit.registry());
        let first = renderer.render(label("a")).unwrap();
        let refreshed = renderer.refresh().unwrap();
        assert!(!first.same(&refreshed));
        assert_eq!(kit.journal().count_constructed("label"), 2);
        assert_eq!(kit.journal().count_released("label"), 1);
    }

    #[test]
    fn failed_render_unmounts_and_recovers() {
        let kit = MockToolkit::new();
        let mut renderer = Renderer::new(kit.registry());
        renderer.render(label("a")).unwrap();
        assert!(renderer.render(Description::new("nope")).is_err());
        assert!(renderer.root().is_none());
        assert!(renderer.render(label("b")).is_ok());
    }

    #[test]
    fn failed_render_releases_the_old_tree() {
        let kit = MockToolkit::new();
        let mut renderer = Renderer::new(kit.registry());
        let vbox = |children: Vec<Value>| -> Value {
            Description::new("vbox")
                .with("children", Value::vector(children))
                .into()
        };

        renderer.render(vbox(vec![label("a")])).unwrap();
        let broken = vbox(vec![label("a"), Description::new("nope").into()]);
        assert!(renderer.render(broken).is_err());
        assert_eq!(kit.journal().count_released("vbox"), 1);
        assert_eq!(kit.journal().count_released("label"), 1);

        renderer.render(vbox(vec![label("a")])).unwrap();
        renderer.unmount();
        let journal = kit.journal();
        assert_eq!(journal.count_constructed("vbox"), journal.count_released("vbox"));
        assert_eq!(journal.count_constructed("label"), journal.count_released("label"));
    }

    #[test]
    #[traced_test]
    fn render_passes_are_traced() {
        let kit = MockToolkit::new();
        let mut renderer = Renderer::new(kit.registry());
        renderer.render(label("a")).unwrap();
        renderer.unmount();
        assert!(logs_contain("render"));
        assert!(logs_contain("unmounting root"));
    }

    #[test]
    fn map_desc_applies_before_reconcile() {
        let kit = MockToolkit::new();
        let wrap: MapDesc = Arc::new(|desc| {
            Description::new("vbox")
                .with("children", Value::vector([desc]))
                .into()
        });
        let mut renderer = Renderer::new(kit.registry()).with_map_desc(Some(wrap));
        let live = renderer.render(label("a")).unwrap();
        let vbox = live.downcast_ref::<Widget>().unwrap();
        assert_eq!(vbox.type_name(), "vbox");
        assert_eq!(vbox.children().len(), 1);
    }

    #[test]
    fn unmount_and_drop_release_everything() {
        let kit = MockToolkit::new();
        let mut renderer = Renderer::new(kit.registry());
        renderer.render(label("a")).unwrap();
        renderer.unmount();
        assert!(renderer.live().is_nil());
        assert_eq!(kit.journal().count_released("label"), 1);

        renderer.render(label("b")).unwrap();
        drop(renderer);
        assert_eq!(kit.journal().count_released("label"), 2);
    }
}
