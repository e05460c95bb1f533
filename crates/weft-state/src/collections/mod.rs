#![forbid(unsafe_code)]

//! Collection-backed stores.
//!
//! Each collection type publishes one [`OperationTable`] mapping every
//! operation name to an [`OpCategory`]. Public operations route through the
//! helper for their category, which checks the table:
//!
//! - [`CollectionStore::read_op`]: pass-through query, no duplication, no
//!   notification.
//! - [`CollectionStore::copy_mutate_op`]: duplicate, apply, install, notify
//!   with [`ChangeSet::Whole`](crate::change::ChangeSet::Whole).
//! - [`CollectionStore::reduce_mutate_op`]: the operation itself builds the
//!   next collection from a reference to the current one, so no separate
//!   duplication step runs.
//!
//! Calling an operation through the wrong helper fails with
//! `InvalidMutation`; a name missing from the table fails with
//! `UnknownOperation`.

pub mod list;
pub mod map;
pub mod model;

use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

use crate::context::{StateContext, StoreId};
use crate::error::{StateError, StateResult};
use crate::reactive::{Source, Store, Target};

pub use list::ListStore;
pub use map::MapStore;
pub use model::{Model, ModelStore};

/// How an operation touches the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCategory {
    /// Query only.
    Read,
    /// Duplicate, apply in place, install.
    CopyMutate,
    /// Build the next value from the current one without a separate copy.
    ReduceMutate,
}

impl OpCategory {
    /// Lower-case name used in error messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::CopyMutate => "copy-mutate",
            Self::ReduceMutate => "reduce-mutate",
        }
    }
}

impl fmt::Display for OpCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

type Entry = (Cow<'static, str>, OpCategory);

/// Operation name to category, declared once per store type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationTable {
    kind: Cow<'static, str>,
    entries: Cow<'static, [Entry]>,
}

/// A table entry usable in `const` tables.
#[must_use]
pub const fn op(name: &'static str, category: OpCategory) -> Entry {
    (Cow::Borrowed(name), category)
}

impl OperationTable {
    /// A table over static entries.
    #[must_use]
    pub const fn from_static(kind: &'static str, entries: &'static [Entry]) -> Self {
        Self {
            kind: Cow::Borrowed(kind),
            entries: Cow::Borrowed(entries),
        }
    }

    /// A table built at runtime.
    #[must_use]
    pub fn from_entries(kind: impl Into<Cow<'static, str>>, entries: Vec<Entry>) -> Self {
        Self {
            kind: kind.into(),
            entries: Cow::Owned(entries),
        }
    }

    /// The store kind this table describes.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Category of `name`, if declared.
    #[must_use]
    pub fn category_of(&self, name: &str) -> Option<OpCategory> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| *c)
    }

    /// Category of `name`, or `UnknownOperation`.
    pub fn lookup(&self, name: &str) -> StateResult<OpCategory> {
        self.category_of(name)
            .ok_or_else(|| StateError::unknown(self.kind.as_ref(), name))
    }

    /// Check that `name` is declared as `expected`.
    pub fn require(&self, name: &str, expected: OpCategory) -> StateResult<()> {
        let actual = self.lookup(name)?;
        if actual != expected {
            return Err(StateError::invalid(
                name,
                format!("{actual} operation invoked as {expected}"),
            ));
        }
        Ok(())
    }

    /// Names declared with `category`, in table order.
    pub fn names(&self, category: OpCategory) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(move |(_, c)| *c == category)
            .map(|(n, _)| n.as_ref())
    }

    /// Number of declared operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True for a table with no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A collection type that can back a [`CollectionStore`].
pub trait Collection: Clone + PartialEq + 'static {
    /// The collection's operation table.
    fn operations() -> &'static OperationTable;
}

/// A store over a collection, inheriting all [`Store`] machinery.
///
/// Collections have no attribute granularity: every change is reported as
/// whole-state.
pub struct CollectionStore<C> {
    store: Store<C>,
}

impl<C> Clone for CollectionStore<C> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<C: fmt::Debug> fmt::Debug for CollectionStore<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CollectionStore").field(&self.store).finish()
    }
}

impl<C: Collection> CollectionStore<C> {
    /// Create a store holding `value`.
    #[must_use]
    pub fn new(ctx: &StateContext, value: C) -> Self {
        Self {
            store: Store::new(ctx, value),
        }
    }

    /// The operation table of `C`.
    #[must_use]
    pub fn operations() -> &'static OperationTable {
        C::operations()
    }

    /// Category of operation `name`.
    #[must_use]
    pub fn category_of(name: &str) -> Option<OpCategory> {
        C::operations().category_of(name)
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Store<C> {
        &self.store
    }

    /// Store id.
    #[must_use]
    pub fn id(&self) -> StoreId {
        self.store.id()
    }

    /// Number of flushes that changed something.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.store.version()
    }

    /// The current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Rc<C> {
        self.store.get()
    }

    /// Replace the whole collection.
    pub fn replace(&self, value: C) {
        self.store.replace(value);
    }

    /// Run `f` as one transaction.
    ///
    /// # Errors
    ///
    /// Whatever `f` returns; the collection is then restored.
    pub fn transaction<R, E>(&self, f: impl FnOnce(&Self) -> Result<R, E>) -> Result<R, E> {
        self.store.transaction(|_| f(self))
    }

    /// Run read operation `name`.
    ///
    /// # Errors
    ///
    /// `UnknownOperation` or `InvalidMutation` when `name` is not a read.
    pub fn read_op<R>(&self, name: &str, f: impl FnOnce(&C) -> R) -> StateResult<R> {
        C::operations().require(name, OpCategory::Read)?;
        Ok(self.store.with(f))
    }

    /// Run copy-mutate operation `name`.
    ///
    /// # Errors
    ///
    /// `UnknownOperation` or `InvalidMutation` when `name` is not a
    /// copy-mutate operation.
    pub fn copy_mutate_op<R>(&self, name: &str, f: impl FnOnce(&mut C) -> R) -> StateResult<R> {
        C::operations().require(name, OpCategory::CopyMutate)?;
        Ok(self.store.mutate(f))
    }

    /// Run reduce-mutate operation `name`.
    ///
    /// # Errors
    ///
    /// `UnknownOperation` or `InvalidMutation` when `name` is not a
    /// reduce-mutate operation.
    pub fn reduce_mutate_op(&self, name: &str, f: impl FnOnce(&C) -> C) -> StateResult<()> {
        C::operations().require(name, OpCategory::ReduceMutate)?;
        self.store.reduce(f);
        Ok(())
    }

    pub(crate) fn read<R>(&self, name: &'static str, f: impl FnOnce(&C) -> R) -> R {
        debug_assert_eq!(Self::category_of(name), Some(OpCategory::Read), "{name}");
        self.store.with(f)
    }

    pub(crate) fn copy_mutate<R>(&self, name: &'static str, f: impl FnOnce(&mut C) -> R) -> R {
        debug_assert_eq!(
            Self::category_of(name),
            Some(OpCategory::CopyMutate),
            "{name}"
        );
        self.store.mutate(f)
    }

    pub(crate) fn reduce_mutate(&self, name: &'static str, f: impl FnOnce(&C) -> C) {
        debug_assert_eq!(
            Self::category_of(name),
            Some(OpCategory::ReduceMutate),
            "{name}"
        );
        self.store.reduce(f);
    }
}

impl<C: Collection> Source for CollectionStore<C> {
    type Value = C;

    fn target(&self) -> Target {
        Target::new(&self.store, None)
    }

    fn read<R, F: FnOnce(&C) -> R>(&self, f: F) -> R {
        self.store.with(f)
    }
}
