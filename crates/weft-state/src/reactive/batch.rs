#![forbid(unsafe_code)]

//! Savepoint stack backing [`Store::transaction`](super::Store::transaction).
//!
//! Each `begin` pins the snapshot current at that depth together with the
//! changes pending so far. Pinning is also what makes the first write inside
//! the outermost transaction duplicate the state exactly once: the pinned
//! `Rc` forces `Rc::make_mut` to copy, and later writes find the working copy
//! unshared.
//!
//! # Invariants
//!
//! 1. Only the outermost `commit` yields changes to flush.
//! 2. `rollback` restores the snapshot and pending set of its own depth;
//!    outer depths are untouched.
//! 3. After the outermost commit or rollback no snapshot stays pinned.

use std::rc::Rc;

use crate::change::ChangeSet;

struct Savepoint<S> {
    snapshot: Rc<S>,
    pending: ChangeSet,
}

/// Open transaction frames of one store.
pub(crate) struct BatchState<S> {
    frames: Vec<Savepoint<S>>,
    pending: ChangeSet,
}

impl<S> Default for BatchState<S> {
    fn default() -> Self {
        Self {
            frames: Vec::new(),
            pending: ChangeSet::none(),
        }
    }
}

impl<S> BatchState<S> {
    pub(crate) fn is_active(&self) -> bool {
        !self.frames.is_empty()
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn begin(&mut self, snapshot: Rc<S>) {
        self.frames.push(Savepoint {
            snapshot,
            pending: self.pending.clone(),
        });
    }

    pub(crate) fn record(&mut self, changes: &ChangeSet) {
        self.pending.union_with(changes);
    }

    /// Close the innermost frame. Returns the accumulated changes and the
    /// pre-transaction snapshot when the outermost frame closes.
    pub(crate) fn commit(&mut self) -> Option<(ChangeSet, Rc<S>)> {
        let frame = self.frames.pop()?;
        if self.frames.is_empty() {
            Some((std::mem::take(&mut self.pending), frame.snapshot))
        } else {
            None
        }
    }

    /// Discard the innermost frame, returning the snapshot to restore.
    pub(crate) fn rollback(&mut self) -> Option<Rc<S>> {
        let frame = self.frames.pop()?;
        self.pending = frame.pending;
        Some(frame.snapshot)
    }
}
