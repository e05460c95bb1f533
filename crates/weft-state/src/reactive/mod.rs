#![forbid(unsafe_code)]

//! Reactive stores and the bindings that observe them.
//!
//! - [`Store`]: a shared, versioned snapshot with copy-then-mutate updates,
//!   scoped subscribers, and nestable transactions.
//! - [`Atom`]: a store of named JSON attributes that reports changes keyed
//!   by attribute.
//! - [`Binding`]: a producer of render content re-evaluated when a flush
//!   touches one of its targets.
//!
//! # Architecture
//!
//! Everything is single-threaded: stores share state through
//! `Rc<RefCell<..>>` and hold subscribers as `Weak` references that are
//! pruned lazily during notification.
//!
//! # Invariants
//!
//! 1. Snapshots handed out by reads never change afterwards.
//! 2. A flush that changes nothing bumps no version and notifies nobody.
//! 3. Subscribers are notified in registration order, once per flush.
//! 4. A transaction notifies once, after its outermost frame commits.

pub mod atom;
mod batch;
pub mod binding;
pub mod store;

pub use atom::{AttrSource, Atom, Attributes, Schema, ValueKind};
pub use binding::{
    BindContext, Binding, BindingBuilder, Callback, Content, Filter, Producer, Scoped, Source,
};
pub use store::{Differ, Store, StoreHandle, Subscriber, Target};
