#![forbid(unsafe_code)]

//! Reactive state for UI frameworks.
//!
//! Stores hold immutable snapshots and notify subscribers with the keys a
//! flush changed. Bindings turn store slices into render content and ask a
//! [`RenderScheduler`] to repaint them. Collection stores and an undo
//! history are layered on the same store machinery.
//!
//! ```ignore
//! let ctx = StateContext::headless();
//! let todo = Atom::from_json(&ctx, json!({"text": "milk", "completed": false}))?;
//! let label = Binding::new(
//!     &ctx,
//!     todo.attr("text"),
//!     Producer::value_only(|text: &Value| text.to_string()),
//! );
//! todo.set("text", json!("eggs"))?;
//! ```

pub mod change;
pub mod collections;
pub mod context;
pub mod error;
pub mod reactive;
pub mod undo;

pub use change::ChangeSet;
pub use collections::{
    Collection, CollectionStore, ListStore, MapStore, Model, ModelStore, OpCategory,
    OperationTable,
};
pub use context::{
    BindingId, FrameQueue, NoopScheduler, RenderScheduler, StateConfig, StateContext, StoreId,
    SubscriberId,
};
pub use error::{StateError, StateResult};
pub use reactive::{
    Atom, AttrSource, Attributes, BindContext, Binding, BindingBuilder, Callback, Content, Filter,
    Producer, Schema, Scoped, Source, Store, Subscriber, Target, ValueKind,
};
pub use undo::{History, Timeline};
