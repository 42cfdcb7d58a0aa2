//! Map of dynamics: children matched by their map key.

use std::collections::BTreeMap;

use super::{Children, Component, Lifecycle, RenderCx, discard_all};
use crate::error::{Error, Result};
use crate::instance::Live;
use crate::value::Value;

fn entries(desc: &Value) -> Result<Vec<(&Value, &Value)>> {
    match desc {
        Value::Nil => Ok(Vec::new()),
        Value::Map(m) => Ok(m.iter().collect()),
        other => Err(Error::invalid("a map of descriptions", other)),
    }
}

fn assemble(desc: &Value, children: BTreeMap<Value, Component>, cx: &RenderCx) -> Component {
    Component {
        lifecycle: Lifecycle::Map,
        desc: desc.clone(),
        live: Live::Map(
            children
                .iter()
                .map(|(k, c)| (k.clone(), c.live.clone()))
                .collect(),
        ),
        context: cx.inherited_context(children.values()),
        children: Children::Map(children),
    }
}

pub(super) fn create(desc: &Value, cx: &RenderCx) -> Result<Component> {
    let mut children = BTreeMap::new();
    for (key, item) in entries(desc)? {
        match Lifecycle::Dynamic.create(item, cx) {
            Ok(child) => {
                children.insert(key.clone(), child);
            }
            Err(err) => {
                discard_all(children.into_values());
                return Err(err);
            }
        }
    }
    Ok(assemble(desc, children, cx))
}

pub(super) fn advance(component: Component, desc: &Value, cx: &RenderCx) -> Result<Component> {
    let next = match entries(desc) {
        Ok(next) => next,
        Err(err) => return component.discard(err),
    };
    let mut previous = match component.children {
        Children::Map(previous) => previous,
        _ => BTreeMap::new(),
    };

    let mut children = BTreeMap::new();
    for (key, item) in next {
        let child = match previous.remove(key) {
            Some(prev) => Lifecycle::Dynamic.advance(prev, item, cx),
            None => Lifecycle::Dynamic.create(item, cx),
        };
        match child {
            Ok(child) => {
                children.insert(key.clone(), child);
            }
            Err(err) => {
                discard_all(children.into_values().chain(previous.into_values()));
                return Err(err);
            }
        }
    }
    discard_all(previous.into_values());
    Ok(assemble(desc, children, cx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockToolkit;
    use crate::value::Description;

    fn label(text: &str) -> Description {
        Description::new("label").with("text", text)
    }

    #[test]
    fn children_follow_their_map_key() {
        let kit = MockToolkit::new();
        let cx = kit.cx();
        let c = create(&Value::map([("top", label("t")), ("left", label("l"))]), &cx).unwrap();
        let Live::Map(before) = c.live().clone() else {
            panic!("expected map live value");
        };
        kit.journal().clear();

        let c = advance(c, &Value::map([("top", label("t")), ("right", label("r"))]), &cx).unwrap();
        let Live::Map(after) = c.live().clone() else {
            panic!("expected map live value");
        };
        let keys: Vec<_> = after.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![Value::from("right"), Value::from("top")]);

        let old_top = &before.iter().find(|(k, _)| k == &Value::from("top")).unwrap().1;
        let new_top = &after.iter().find(|(k, _)| k == &Value::from("top")).unwrap().1;
        assert!(old_top.same(new_top));
        assert_eq!(kit.journal().count_constructed("label"), 1);
        assert_eq!(kit.journal().count_released("label"), 1);
    }

    #[test]
    fn nil_is_empty() {
        let kit = MockToolkit::new();
        let c = create(&Value::Nil, &kit.cx()).unwrap();
        assert!(matches!(c.live(), Live::Map(m) if m.is_empty()));
    }

    #[test]
    fn non_map_is_rejected() {
        let kit = MockToolkit::new();
        assert!(create(&Value::vector([1]), &kit.cx()).is_err());
    }

    #[test]
    fn failed_advance_releases_all_entries() {
        let kit = MockToolkit::new();
        let cx = kit.cx();
        let c = create(&Value::map([("top", label("t")), ("left", label("l"))]), &cx).unwrap();
        let next = Value::map([
            ("top", Value::from(label("t"))),
            ("right", Value::from(Description::new("slider"))),
        ]);
        assert!(advance(c, &next, &cx).is_err());
        assert_eq!(kit.journal().count_constructed("label"), 2);
        assert_eq!(kit.journal().count_released("label"), 2);
    }
}
