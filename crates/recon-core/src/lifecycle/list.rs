//! Ordered list of dynamics with keyed matching.
//!
//! Each child is matched against the previous pass by its explicit key
//! (the description's `key` field) or, failing that, by its position. Matched
//! children are advanced, unmatched new ones created, unmatched old ones
//! deleted. Retained instances keep their identity when they move, so the
//! container only needs to reposition them.
//!
//! Nil entries are skipped. Duplicate keys are tolerated: the first previous
//! component with a key is matched, the others are deleted.

use ahash::AHashMap;

use super::{Children, Component, Lifecycle, RenderCx, discard_all, expect_desc};
use crate::error::{Error, Result};
use crate::instance::Live;
use crate::value::Value;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum MatchKey {
    Explicit(Value),
    Position(usize),
}

fn match_key(desc: &Value, position: usize) -> MatchKey {
    match desc.as_desc().and_then(|d| d.key()) {
        Some(key) => MatchKey::Explicit(key.clone()),
        None => MatchKey::Position(position),
    }
}

fn items(desc: &Value) -> Result<Vec<&Value>> {
    match desc {
        Value::Nil => Ok(Vec::new()),
        Value::Vector(v) => Ok(v.iter().filter(|d| !d.is_nil()).collect()),
        other => Err(Error::invalid("a vector of descriptions", other)),
    }
}

fn assemble(desc: &Value, children: Vec<Component>, cx: &RenderCx) -> Component {
    Component {
        lifecycle: Lifecycle::List,
        desc: desc.clone(),
        live: Live::List(children.iter().map(|c| c.live.clone()).collect()),
        context: cx.inherited_context(&children),
        children: Children::List(children),
    }
}

pub(super) fn create(desc: &Value, cx: &RenderCx) -> Result<Component> {
    let next_items = items(desc)?;
    let mut children = Vec::with_capacity(next_items.len());
    for item in next_items {
        match Lifecycle::Dynamic.create(item, cx) {
            Ok(child) => children.push(child),
            Err(err) => {
                discard_all(children);
                return Err(err);
            }
        }
    }
    Ok(assemble(desc, children, cx))
}

pub(super) fn advance(component: Component, desc: &Value, cx: &RenderCx) -> Result<Component> {
    let next_items = match items(desc) {
        Ok(next_items) => next_items,
        Err(err) => return component.discard(err),
    };
    let previous = match component.children {
        Children::List(previous) => previous,
        _ => Vec::new(),
    };

    let mut slots: Vec<Option<Component>> = Vec::with_capacity(previous.len());
    let mut index: AHashMap<MatchKey, usize> = AHashMap::with_capacity(previous.len());
    let mut duplicates = Vec::new();
    for (position, child) in previous.into_iter().enumerate() {
        let key = match_key(&child.desc, position);
        if index.contains_key(&key) {
            duplicates.push(child);
        } else {
            index.insert(key, slots.len());
            slots.push(Some(child));
        }
    }

    let mut children = Vec::with_capacity(next_items.len());
    for (position, item) in next_items.into_iter().enumerate() {
        let reused = index
            .get(&match_key(item, position))
            .and_then(|slot| slots[*slot].take());
        let child = match reused {
            Some(prev) => Lifecycle::Dynamic.advance(prev, item, cx),
            None => Lifecycle::Dynamic.create(item, cx),
        };
        match child {
            Ok(child) => children.push(child),
            Err(err) => {
                discard_all(children);
                discard_all(slots.into_iter().flatten().chain(duplicates));
                return Err(err);
            }
        }
    }

    discard_all(slots.into_iter().flatten().chain(duplicates));
    Ok(assemble(desc, children, cx))
}

fn many_items(desc: &Value) -> Result<&Value> {
    let d = expect_desc(desc, "a many description")?;
    Ok(d.get("desc").unwrap_or(&Value::Nil))
}

fn assemble_many(desc: &Value, list: Component, cx: &RenderCx) -> Component {
    Component {
        lifecycle: Lifecycle::Many,
        desc: desc.clone(),
        live: list.live.clone(),
        context: cx.inherited_context([&list]),
        children: Children::One(Box::new(list)),
    }
}

pub(super) fn create_many(desc: &Value, cx: &RenderCx) -> Result<Component> {
    let list = create(many_items(desc)?, cx)?;
    Ok(assemble_many(desc, list, cx))
}

pub(super) fn advance_many(component: Component, desc: &Value, cx: &RenderCx) -> Result<Component> {
    let items = match many_items(desc) {
        Ok(items) => items,
        Err(err) => return component.discard(err),
    };
    let list = match component.children {
        Children::One(list) => advance(*list, items, cx)?,
        _ => create(items, cx)?,
    };
    Ok(assemble_many(desc, list, cx))
}
