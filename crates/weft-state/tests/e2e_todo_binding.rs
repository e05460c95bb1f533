#![forbid(unsafe_code)]

//! End-to-end tests: a small todo app driven through stores and bindings.
//!
//! These tests validate that a rendering layer can:
//! - Show a row only while its todo is completed
//! - Skip re-rendering rows whose attribute was not touched
//! - Batch several edits into one render request per binding
//! - Undo edits through a history of list snapshots
//! - Tear bindings down without leaking subscriptions

use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{Level, info};
use weft_state::{
    Atom, BindContext, Binding, Content, Filter, FrameQueue, History, ListStore, Model,
    ModelStore, Producer, StateConfig, StateContext, StateError,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(Level::DEBUG)
        .try_init();
}

fn app() -> (StateContext, Rc<FrameQueue>) {
    init_tracing();
    let frames = Rc::new(FrameQueue::new());
    let ctx = StateContext::new(
        StateConfig::default().with_history_max_size(8),
        frames.clone(),
    );
    (ctx, frames)
}

fn todo(ctx: &StateContext, id: u32, text: &str) -> Atom {
    Atom::from_json(ctx, json!({"id": id, "text": text, "completed": false})).unwrap()
}

fn completed_row(ctx: &StateContext, todo: &Atom) -> Binding<String> {
    let atom = todo.clone();
    Binding::build(ctx, todo.attr("completed"))
        .filter(Filter::value_only(|done: &Value| done == &json!(true)))
        .produce(Producer::value_only(move |_: &Value| {
            format!("item {}", atom.get("text").unwrap_or(Value::Null))
        }))
}

#[test]
fn completed_filter_shows_row_and_ignores_text_edits() {
    let (ctx, frames) = app();
    let t = todo(&ctx, 1, "t");
    let row = completed_row(&ctx, &t);

    assert!(row.content().is_suppressed());
    assert_eq!(row.evaluations(), 0);

    t.set("completed", json!(true)).unwrap();
    assert_eq!(row.content(), Content::Rendered("item \"t\"".to_string()));
    assert_eq!(row.evaluations(), 1);
    assert_eq!(frames.drain(), vec![row.id()]);

    t.set("text", json!("t2")).unwrap();
    assert_eq!(row.evaluations(), 1);
    assert!(frames.is_empty());
    info!(version = t.version(), "text edit skipped completed row");
}

#[test]
fn batch_edit_requests_one_render_per_binding() {
    let (ctx, frames) = app();
    let a = todo(&ctx, 1, "milk");
    let text = Binding::new(
        &ctx,
        a.attr("text"),
        Producer::value_only(|v: &Value| v.as_str().unwrap_or_default().to_owned()),
    );
    let whole = Binding::new(&ctx, a.clone(), Producer::no_args(|| ()));

    a.transaction(|a| {
        a.set("text", json!("oat milk"))?;
        a.set("completed", json!(true))?;
        a.set("text", json!("soy milk"))
    })
    .unwrap();

    assert_eq!(text.content(), Content::Rendered("soy milk".to_string()));
    assert_eq!(text.evaluations(), 2);
    assert_eq!(whole.evaluations(), 2);
    assert_eq!(frames.drain(), vec![text.id(), whole.id()]);
}

#[test]
fn invalid_edit_inside_transaction_changes_nothing() {
    let (ctx, frames) = app();
    let a = todo(&ctx, 1, "milk");
    let whole = Binding::new(&ctx, a.clone(), Producer::no_args(|| ()));

    let err = a
        .transaction(|a| {
            a.set("text", json!("bread"))?;
            a.set("completed", json!("not a bool"))
        })
        .unwrap_err();

    assert!(matches!(err, StateError::TypeMismatch { .. }));
    assert_eq!(a.get("text"), Some(json!("milk")));
    assert_eq!(whole.evaluations(), 1);
    assert!(frames.is_empty());
}

#[test]
fn context_binding_reads_args_and_extra_sources() {
    let (ctx, _frames) = app();
    let a = todo(&ctx, 1, "milk");
    let filter = ListStore::new(&ctx, vec!["all".to_string()]);

    let label = Binding::build(&ctx, a.attr("text"))
        .args([json!(">")])
        .also(&filter)
        .produce(Producer::with_context(|cx: &BindContext<'_>, v: &Value| {
            format!("{} {} {}", cx.args[0], v, cx.changes.is_whole())
        }));
    assert_eq!(label.content(), Content::Rendered("\">\" \"milk\" true".into()));

    filter.push("done".to_string());
    assert_eq!(label.evaluations(), 2);
    assert_eq!(label.targets().len(), 2);
}

#[test]
fn history_of_todo_lists_supports_undo() {
    let (ctx, _frames) = app();
    let list = ListStore::new(&ctx, Vec::<String>::new());
    let history = History::with_context(&ctx, list.to_vec());
    assert_eq!(history.max_size(), 8);

    for text in ["milk", "eggs", "bread"] {
        list.push(text.to_string());
        history.present(list.to_vec());
    }
    let shown = Binding::new(
        &ctx,
        history.present_source(),
        Producer::value_only(|t: &weft_state::Timeline<Vec<String>>| {
            t.present().map_or(0, Vec::len)
        }),
    );

    assert!(history.undo());
    list.replace(history.current().unwrap_or_default());
    assert_eq!(list.to_vec(), vec!["milk", "eggs"]);
    assert_eq!(shown.content(), Content::Rendered(2));

    assert_eq!(history.go_to_version(0), 0);
    assert_eq!(shown.content(), Content::Rendered(0));
    assert_eq!(shown.evaluations(), 3);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Settings {
    theme: String,
    show_completed: bool,
}

impl Model for Settings {
    const NAME: &'static str = "settings";
    const READABLE: &'static [&'static str] = &["theme", "show_completed"];
    const WRITABLE: &'static [&'static str] = &["show_completed"];
}

#[test]
fn settings_model_drives_visibility() {
    let (ctx, frames) = app();
    let settings = ModelStore::<Settings>::from_value(
        &ctx,
        json!({"theme": "dark", "show_completed": false}),
    )
    .unwrap();
    let footer = Binding::build(&ctx, settings.attr("show_completed"))
        .filter(Filter::value_only(|s: &Settings| s.show_completed))
        .produce(Producer::value_only(|s: &Settings| s.theme.clone()));
    assert!(footer.content().is_suppressed());

    settings.invoke("set_show_completed", vec![json!(true)]).unwrap();
    assert_eq!(footer.content(), Content::Rendered("dark".to_string()));
    assert_eq!(frames.drain(), vec![footer.id()]);

    assert!(settings.write("theme", json!("light")).is_err());
}

#[test]
fn detached_rows_release_their_subscriptions() {
    let (ctx, _frames) = app();
    let t = todo(&ctx, 1, "t");
    let rows: Vec<_> = (0..4).map(|_| completed_row(&ctx, &t)).collect();
    assert_eq!(t.store().subscriber_count(), 4);

    for row in &rows {
        row.detach();
    }
    assert_eq!(t.store().subscriber_count(), 0);

    t.set("completed", json!(true)).unwrap();
    assert!(rows.iter().all(|r| r.evaluations() == 0));
}
