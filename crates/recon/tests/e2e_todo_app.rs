//! E2E integration test: a small todo app driven through the public facade.
//!
//! The test declares its own toolkit (a list widget and a row widget), keeps
//! application state in a [`Context`], renders context-aware views on the
//! render thread, and checks that:
//!
//! 1. Rows keep their instances when tasks are reordered by id.
//! 2. Toggling one task re-renders only that task's row.
//! 3. The footer's counter is recomputed only when a `done` flag changes.
//! 4. Removing a task releases its row.

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use recon::prelude::{
    Composite, Context, Description, Instance, Live, Prop, Registry, Runtime, RuntimeConfig,
    Subscription, TypeTag, Value,
};

// ── Toolkit ──────────────────────────────────────────────────────────

#[derive(Default)]
struct Row {
    text: Mutex<String>,
    checked: Mutex<bool>,
}

#[derive(Default)]
struct Column {
    items: Mutex<Vec<Live>>,
}

#[derive(Default)]
struct Counters {
    rows_built: AtomicUsize,
    rows_released: AtomicUsize,
    row_updates: AtomicUsize,
}

fn toolkit(counters: &Arc<Counters>) -> Registry {
    let built = Arc::clone(counters);
    let released = Arc::clone(counters);
    let text_updates = Arc::clone(counters);
    let check_updates = Arc::clone(counters);

    let row = Composite::builder("row")
        .ctor(&[], move |_| {
            built.rows_built.fetch_add(1, Ordering::SeqCst);
            Ok(Instance::new(Row::default()))
        })
        .prop(
            "text",
            Prop::scalar(move |instance, value| {
                let row = instance.downcast_ref::<Row>().ok_or("not a row")?;
                *row.text.lock().unwrap() = value
                    .as_value()
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                text_updates.row_updates.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
        .prop(
            "checked",
            Prop::scalar(move |instance, value| {
                let row = instance.downcast_ref::<Row>().ok_or("not a row")?;
                *row.checked.lock().unwrap() =
                    value.as_value().and_then(Value::as_bool).unwrap_or(false);
                check_updates.row_updates.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .with_default(false),
        )
        .release(move |_| {
            released.rows_released.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .build();

    let column = Composite::builder("column")
        .ctor(&[], |_| Ok(Instance::new(Column::default())))
        .prop(
            "items",
            Prop::list(|instance, value| {
                let column = instance.downcast_ref::<Column>().ok_or("not a column")?;
                *column.items.lock().unwrap() = value.as_list().unwrap_or_default().to_vec();
                Ok(())
            }),
        )
        .build();

    Registry::new()
        .with_composite(row)
        .with_composite(column)
}

// ── App ──────────────────────────────────────────────────────────────

fn task(id: i64, text: &str, done: bool) -> Value {
    Value::map([
        ("id", Value::from(id)),
        ("text", Value::from(text)),
        ("done", Value::from(done)),
    ])
}

struct App {
    root: Value,
    footer_runs: Arc<AtomicUsize>,
}

fn app() -> App {
    let footer_runs = Arc::new(AtomicUsize::new(0));

    // Keyed by id so that reordering tasks leaves the result unchanged.
    let done_flags = Subscription::new("done-flags", |ctx, _| {
        let tasks = ctx.sub("tasks")?;
        Ok(Value::map(tasks.as_vector().into_iter().flatten().map(|t| {
            (
                t.get(&Value::from("id")).cloned().unwrap_or_default(),
                t.get(&Value::from("done")).cloned().unwrap_or_default(),
            )
        })))
    });
    let runs = Arc::clone(&footer_runs);
    let footer = TypeTag::context_fn("footer", move |ctx, _| {
        runs.fetch_add(1, Ordering::SeqCst);
        let flags = ctx.sub(&done_flags)?;
        let done = flags
            .as_map()
            .map_or(0, |fs| fs.values().filter(|f| f.as_bool() == Some(true)).count());
        Ok(Description::new("row")
            .with("text", format!("{done} done"))
            .into())
    });

    let task_row = TypeTag::func("task-row", |desc| {
        let task = desc.get("task").cloned().unwrap_or_default();
        Ok(Description::new("row")
            .with("text", task.get(&Value::from("text")).cloned().unwrap_or_default())
            .with("checked", task.get(&Value::from("done")).cloned().unwrap_or_default())
            .into())
    });
    let task_list = TypeTag::context_fn("task-list", move |ctx, _| {
        let tasks = ctx.sub("tasks")?;
        let rows = tasks.as_vector().into_iter().flatten().map(|t| {
            Description::new(task_row.clone())
                .with("task", t.clone())
                .keyed(t.get(&Value::from("id")).cloned().unwrap_or_default())
        });
        Ok(Description::new("column")
            .with("items", Value::vector(rows))
            .into())
    });

    let root = Description::new("column")
        .with(
            "items",
            Value::vector([Description::new(task_list), Description::new(footer)]),
        )
        .into();
    App { root, footer_runs }
}

fn column_items(live: &Live) -> Vec<Live> {
    live.downcast_ref::<Column>()
        .map(|c| c.items.lock().unwrap().clone())
        .unwrap_or_default()
}

fn row_text(live: &Live) -> String {
    live.downcast_ref::<Row>()
        .map(|r| r.text.lock().unwrap().clone())
        .unwrap_or_default()
}

// ── Scenario ─────────────────────────────────────────────────────────

#[test]
fn todo_app_reconciles_minimally() {
    let counters = Arc::new(Counters::default());
    let App { root, footer_runs } = app();
    let rt = Runtime::start(Arc::new(toolkit(&counters)), RuntimeConfig::default());

    let ctx = Context::new(Value::map([(
        "tasks",
        Value::vector([
            task(1, "write", false),
            task(2, "test", true),
            task(3, "ship", false),
        ]),
    )]));

    // Initial render: three task rows plus the footer.
    let live = rt.request_with_context(root.clone(), ctx.clone()).wait().unwrap();
    let sections = column_items(&live);
    let rows = column_items(&sections[0]);
    assert_eq!(rows.len(), 3);
    assert_eq!(row_text(&sections[1]), "1 done");
    assert_eq!(counters.rows_built.load(Ordering::SeqCst), 4);
    assert_eq!(footer_runs.load(Ordering::SeqCst), 1);

    // Reorder by id: same row instances, no setter calls, footer untouched.
    let updates = counters.row_updates.load(Ordering::SeqCst);
    let ctx = ctx.swap(|s| {
        s.assoc(
            "tasks",
            Value::vector([
                task(3, "ship", false),
                task(1, "write", false),
                task(2, "test", true),
            ]),
        )
        .unwrap()
    });
    let live = rt.request_with_context(root.clone(), ctx.clone()).wait().unwrap();
    let reordered = column_items(&column_items(&live)[0]);
    assert!(reordered[0].same(&rows[2]));
    assert!(reordered[1].same(&rows[0]));
    assert!(reordered[2].same(&rows[1]));
    assert_eq!(counters.row_updates.load(Ordering::SeqCst), updates);
    assert_eq!(footer_runs.load(Ordering::SeqCst), 1);

    // Toggle one task: one setter call on its row, footer recomputed.
    let ctx = ctx.swap(|s| {
        s.update_in(
            &[Value::from("tasks"), Value::from(0), Value::from("done")],
            |_| Value::from(true),
        )
        .unwrap()
    });
    let live = rt.request_with_context(root.clone(), ctx.clone()).wait().unwrap();
    assert_eq!(counters.row_updates.load(Ordering::SeqCst), updates + 2);
    assert_eq!(row_text(&column_items(&live)[1]), "2 done");
    assert_eq!(footer_runs.load(Ordering::SeqCst), 2);

    // Remove a task: its row is released, nothing else is rebuilt.
    let ctx = ctx.swap(|s| {
        s.assoc(
            "tasks",
            Value::vector([task(3, "ship", true), task(2, "test", true)]),
        )
        .unwrap()
    });
    let live = rt.request_with_context(root, ctx).wait().unwrap();
    assert_eq!(column_items(&column_items(&live)[0]).len(), 2);
    assert_eq!(counters.rows_released.load(Ordering::SeqCst), 1);
    assert_eq!(counters.rows_built.load(Ordering::SeqCst), 4);

    rt.shutdown();
    assert_eq!(counters.rows_released.load(Ordering::SeqCst), 4);
}
