#![forbid(unsafe_code)]

//! Undo/redo over immutable snapshots.
//!
//! [`History`] keeps past, present and future values inside one store so
//! bindings can observe navigation like any other change.

pub mod history;

pub use history::{History, Timeline};
