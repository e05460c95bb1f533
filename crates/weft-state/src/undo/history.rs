#![forbid(unsafe_code)]

//! Bounded undo/redo over a sequence of snapshots.
//!
//! [`History<T>`] keeps a [`Timeline`] in a [`Store`]: the `past` snapshots,
//! the `present` one and the `future` ones that `redo` walks back into. The
//! timeline's changes are keyed by `past`, `present`, `future` and
//! `version`, so a binding scoped to `present` only runs when the current
//! value moves.
//!
//! # Invariants
//!
//! 1. `past.len() <= max_size` after every operation (oldest evicted first).
//! 2. `present(v)` clears `future` and increments `version`.
//! 3. `undo` then `redo` restores the same present and version.
//! 4. Reachable versions are exactly
//!    `version - past.len() ..= version + future.len()`.
//!
//! ```text
//! present(D) with max_size = 2
//! ┌────────────────────────────────────────────┐
//! │ past: [A, B, C] -> [B, C]   present: D     │
//! │ future: []                  version: +1    │
//! └────────────────────────────────────────────┘
//!
//! undo()
//! ┌────────────────────────────────────────────┐
//! │ past: [B]   present: C   future: [D]       │
//! └────────────────────────────────────────────┘
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::ops::RangeInclusive;
use std::rc::Rc;

use tracing::debug;

use crate::change::ChangeSet;
use crate::context::{StateContext, StoreId};
use crate::reactive::{Scoped, Source, Store, Target};

const PAST: &str = "past";
const PRESENT: &str = "present";
const FUTURE: &str = "future";
const VERSION: &str = "version";

/// Snapshot of a history: past, present, future and version.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline<T> {
    past: VecDeque<T>,
    present: Option<T>,
    future: VecDeque<T>,
    version: u64,
    max_size: usize,
}

impl<T> Timeline<T> {
    fn new(present: Option<T>, max_size: usize) -> Self {
        Self {
            past: VecDeque::new(),
            present,
            future: VecDeque::new(),
            version: 0,
            max_size,
        }
    }

    /// The current value; `None` while empty.
    #[must_use]
    pub fn present(&self) -> Option<&T> {
        self.present.as_ref()
    }

    /// Earlier values, oldest first.
    pub fn past(&self) -> impl Iterator<Item = &T> {
        self.past.iter()
    }

    /// Undone values, next redo first.
    pub fn future(&self) -> impl Iterator<Item = &T> {
        self.future.iter()
    }

    /// Current version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Versions `go_to_version` can reach.
    #[must_use]
    pub fn reachable(&self) -> RangeInclusive<u64> {
        let low = self.version.saturating_sub(self.past.len() as u64);
        let high = self.version + self.future.len() as u64;
        low..=high
    }

    fn push(&mut self, value: T) {
        if let Some(previous) = self.present.take() {
            self.past.push_back(previous);
            while self.past.len() > self.max_size {
                self.past.pop_front();
                debug!(max_size = self.max_size, "history evicted oldest snapshot");
            }
        }
        self.present = Some(value);
        self.future.clear();
        self.version += 1;
    }

    fn step_back(&mut self) -> bool {
        let Some(previous) = self.past.pop_back() else {
            return false;
        };
        if let Some(current) = self.present.replace(previous) {
            self.future.push_front(current);
        }
        self.version = self.version.saturating_sub(1);
        true
    }

    fn step_forward(&mut self) -> bool {
        let Some(next) = self.future.pop_front() else {
            return false;
        };
        if let Some(current) = self.present.replace(next) {
            self.past.push_back(current);
        }
        self.version += 1;
        true
    }
}

fn timeline_diff<T: PartialEq>(old: &Timeline<T>, new: &Timeline<T>) -> ChangeSet {
    let mut changes = ChangeSet::none();
    if old.past != new.past {
        changes.insert(PAST);
    }
    if old.present != new.present {
        changes.insert(PRESENT);
    }
    if old.future != new.future {
        changes.insert(FUTURE);
    }
    if old.version != new.version {
        changes.insert(VERSION);
    }
    changes
}

/// Undo/redo history atom.
///
/// Cloning shares the same timeline.
pub struct History<T> {
    store: Store<Timeline<T>>,
}

impl<T> Clone for History<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<T: fmt::Debug + Clone + 'static> fmt::Debug for History<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("History")
            .field("timeline", &self.store.get())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> History<T> {
    /// A history whose present is `present`, at version 0.
    #[must_use]
    pub fn initial(ctx: &StateContext, present: T, max_size: usize) -> Self {
        Self::from_timeline(ctx, Timeline::new(Some(present), max_size))
    }

    /// A history with no present value.
    #[must_use]
    pub fn empty(ctx: &StateContext, max_size: usize) -> Self {
        Self::from_timeline(ctx, Timeline::new(None, max_size))
    }

    /// Like [`initial`](Self::initial) with the context's configured size.
    #[must_use]
    pub fn with_context(ctx: &StateContext, present: T) -> Self {
        Self::initial(ctx, present, ctx.config().history_max_size)
    }

    fn from_timeline(ctx: &StateContext, timeline: Timeline<T>) -> Self {
        Self {
            store: Store::with_differ(ctx, timeline, timeline_diff::<T>),
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Store<Timeline<T>> {
        &self.store
    }

    /// Store id.
    #[must_use]
    pub fn id(&self) -> StoreId {
        self.store.id()
    }

    /// The current timeline snapshot.
    #[must_use]
    pub fn timeline(&self) -> Rc<Timeline<T>> {
        self.store.get()
    }

    /// A copy of the present value.
    #[must_use]
    pub fn current(&self) -> Option<T> {
        self.store.with(|t| t.present.clone())
    }

    /// Past values, oldest first.
    #[must_use]
    pub fn past(&self) -> Vec<T> {
        self.store.with(|t| t.past.iter().cloned().collect())
    }

    /// Future values, next redo first.
    #[must_use]
    pub fn future(&self) -> Vec<T> {
        self.store.with(|t| t.future.iter().cloned().collect())
    }

    /// Current version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.store.with(Timeline::version)
    }

    /// Maximum length of `past`.
    #[must_use]
    pub fn max_size(&self) -> usize {
        self.store.with(|t| t.max_size)
    }

    /// Whether `undo` would move.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.store.with(|t| !t.past.is_empty())
    }

    /// Whether `redo` would move.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.store.with(|t| !t.future.is_empty())
    }

    /// Versions `go_to_version` can reach.
    #[must_use]
    pub fn reachable(&self) -> RangeInclusive<u64> {
        self.store.with(Timeline::reachable)
    }

    /// Make `value` the present, pushing the old present onto `past` and
    /// dropping the future. Returns the new version.
    pub fn present(&self, value: T) -> u64 {
        let changes = self.store.with(|t| {
            let mut c = ChangeSet::keys([PRESENT, VERSION]);
            if t.present.is_some() {
                c.insert(PAST);
            }
            if !t.future.is_empty() {
                c.insert(FUTURE);
            }
            c
        });
        self.store.mutate_keys(changes, |t| t.push(value));
        self.version()
    }

    /// Step back one snapshot. Returns false when there is no past.
    pub fn undo(&self) -> bool {
        if !self.can_undo() {
            return false;
        }
        self.store
            .mutate_keys(ChangeSet::keys([PAST, PRESENT, FUTURE, VERSION]), |t| {
                t.step_back();
            });
        true
    }

    /// Alias of [`undo`](Self::undo).
    pub fn back(&self) -> bool {
        self.undo()
    }

    /// Step forward one snapshot. Returns false when there is no future.
    pub fn redo(&self) -> bool {
        if !self.can_redo() {
            return false;
        }
        self.store
            .mutate_keys(ChangeSet::keys([PAST, PRESENT, FUTURE, VERSION]), |t| {
                t.step_forward();
            });
        true
    }

    /// Alias of [`redo`](Self::redo).
    pub fn forward(&self) -> bool {
        self.redo()
    }

    /// Walk to version `target`, clamped to [`reachable`](Self::reachable).
    ///
    /// Runs as one transaction, so subscribers see a single change however
    /// many steps it takes. Returns the version reached.
    pub fn go_to_version(&self, target: u64) -> u64 {
        let reached = self.store.transaction(|_| {
            while self.version() < target && self.redo() {}
            while self.version() > target && self.undo() {}
            Ok::<_, std::convert::Infallible>(self.version())
        });
        let reached = match reached {
            Ok(v) => v,
            Err(never) => match never {},
        };
        if reached != target {
            debug!(requested = target, reached, "go_to_version clamped to reachable range");
        }
        reached
    }

    /// Reset to an empty history at version 0.
    pub fn clear(&self) {
        self.store.reduce(|t| Timeline::new(None, t.max_size));
    }

    /// Binding source scoped to the present value.
    #[must_use]
    pub fn present_source(&self) -> Scoped<Timeline<T>> {
        self.store.scoped(PRESENT)
    }
}

impl<T: Clone + PartialEq + 'static> Source for History<T> {
    type Value = Timeline<T>;

    fn target(&self) -> Target {
        Target::new(&self.store, None)
    }

    fn read<R, F: FnOnce(&Timeline<T>) -> R>(&self, f: F) -> R {
        self.store.with(f)
    }
}

// ============================================================================
// Tests
// ============================================================================
