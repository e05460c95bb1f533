#![forbid(unsafe_code)]

//! Typed record stores.
//!
//! A [`Model`] is a plain serde struct that declares which of its fields
//! are readable and writable. [`ModelStore`] builds an operation table from
//! those declarations when constructed, so the same store can be driven by
//! typed closures or by name with JSON arguments:
//!
//! | operation       | category     | arguments |
//! |-----------------|--------------|-----------|
//! | `<field>`       | read         | none      |
//! | `set_<field>`   | copy-mutate  | value     |
//! | `replace`       | reduce-mutate| record    |
//!
//! Changes are reported keyed by field name.

use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use super::{Entry, OpCategory, OperationTable};
use crate::change::ChangeSet;
use crate::context::{StateContext, StoreId, SubscriberId};
use crate::error::{StateError, StateResult};
use crate::reactive::atom::ValueKind;
use crate::reactive::{Scoped, Source, Store, Subscriber, Target};

/// A record type that can back a [`ModelStore`].
pub trait Model: Clone + PartialEq + Serialize + DeserializeOwned + 'static {
    /// Kind name used in error messages.
    const NAME: &'static str;
    /// Fields exposed as read operations.
    const READABLE: &'static [&'static str];
    /// Fields exposed as `set_<field>` operations.
    const WRITABLE: &'static [&'static str];
}

const REPLACE: &str = "replace";
const SETTER_PREFIX: &str = "set_";

fn fields<M: Model>(model: &M) -> Option<Map<String, Value>> {
    match serde_json::to_value(model) {
        Ok(Value::Object(fields)) => Some(fields),
        _ => None,
    }
}

/// Differ for models: field names whose serialized value changed.
///
/// Falls back to [`ChangeSet::Whole`] for models that do not serialize to
/// an object.
pub fn model_diff<M: Model>(old: &M, new: &M) -> ChangeSet {
    if old == new {
        return ChangeSet::none();
    }
    let (Some(old), Some(new)) = (fields(old), fields(new)) else {
        return ChangeSet::Whole;
    };
    let mut changes = ChangeSet::none();
    for (name, value) in &new {
        if old.get(name) != Some(value) {
            changes.insert(name.clone());
        }
    }
    for name in old.keys() {
        if !new.contains_key(name) {
            changes.insert(name.clone());
        }
    }
    changes
}

fn decode<M: Model>(value: Value) -> StateResult<M> {
    serde_json::from_value(value)
        .map_err(|err| StateError::type_mismatch(M::NAME, err.to_string()))
}

fn table_for<M: Model>() -> OperationTable {
    let mut entries: Vec<Entry> =
        Vec::with_capacity(M::READABLE.len() + M::WRITABLE.len() + 1);
    entries.extend(M::READABLE.iter().map(|&name| (name.into(), OpCategory::Read)));
    entries.extend(
        M::WRITABLE
            .iter()
            .map(|name| (format!("{SETTER_PREFIX}{name}").into(), OpCategory::CopyMutate)),
    );
    entries.push((REPLACE.into(), OpCategory::ReduceMutate));
    OperationTable::from_entries(M::NAME, entries)
}

/// A store holding one [`Model`].
pub struct ModelStore<M> {
    store: Store<M>,
    table: Rc<OperationTable>,
}

impl<M> Clone for ModelStore<M> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            table: Rc::clone(&self.table),
        }
    }
}

impl<M: fmt::Debug> fmt::Debug for ModelStore<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelStore")
            .field("kind", &self.table.kind())
            .field("store", &self.store)
            .finish()
    }
}

impl<M: Model> ModelStore<M> {
    /// Create a store holding `model`.
    #[must_use]
    pub fn new(ctx: &StateContext, model: M) -> Self {
        Self {
            store: Store::with_differ(ctx, model, model_diff::<M>),
            table: Rc::new(table_for::<M>()),
        }
    }

    /// Create a store from a JSON record.
    ///
    /// # Errors
    ///
    /// `TypeMismatch` when `value` does not deserialize into `M`.
    pub fn from_value(ctx: &StateContext, value: Value) -> StateResult<Self> {
        Ok(Self::new(ctx, decode(value)?))
    }

    /// The table built from `M`'s declarations.
    #[must_use]
    pub fn operations(&self) -> &OperationTable {
        &self.table
    }

    /// Category of operation `name`.
    #[must_use]
    pub fn category_of(&self, name: &str) -> Option<OpCategory> {
        self.table.category_of(name)
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Store<M> {
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
    pub fn get(&self) -> Rc<M> {
        self.store.get()
    }

    /// Access the current snapshot by reference.
    pub fn with<R>(&self, f: impl FnOnce(&M) -> R) -> R {
        self.store.with(f)
    }

    /// Changed fields of the most recent flush.
    #[must_use]
    pub fn last_changes(&self) -> ChangeSet {
        self.store.last_changes()
    }

    /// Read field `name` as JSON.
    ///
    /// # Errors
    ///
    /// `UnknownOperation` when `name` is not readable, `TypeMismatch` when
    /// the model does not serialize to an object.
    pub fn read(&self, name: &str) -> StateResult<Value> {
        self.table.require(name, OpCategory::Read)?;
        let fields = self
            .store
            .with(fields::<M>)
            .ok_or_else(|| StateError::type_mismatch("object", M::NAME))?;
        Ok(fields.get(name).cloned().unwrap_or(Value::Null))
    }

    /// Assign field `name` from JSON.
    ///
    /// # Errors
    ///
    /// `InvalidMutation` when `name` is readable but not writable,
    /// `UnknownOperation` when it is neither, `TypeMismatch` when `value`
    /// does not fit the field.
    pub fn write(&self, name: &str, value: Value) -> StateResult<()> {
        let setter = format!("{SETTER_PREFIX}{name}");
        if self.table.category_of(&setter).is_none() {
            self.table.lookup(name)?;
            return Err(StateError::invalid(setter, "attribute is read-only"));
        }

        let mut fields = self
            .store
            .with(fields::<M>)
            .ok_or_else(|| StateError::type_mismatch("object", M::NAME))?;
        let found = ValueKind::of(&value);
        fields.insert(name.to_owned(), value);
        let next: M = serde_json::from_value(Value::Object(fields)).map_err(|err| {
            debug!(model = M::NAME, field = name, error = %err, "rejected write");
            StateError::type_mismatch(format!("{}.{name}", M::NAME), found.name())
        })?;
        self.store.mutate(move |model| *model = next);
        Ok(())
    }

    /// Copy-then-mutate with a typed closure.
    pub fn update<R>(&self, f: impl FnOnce(&mut M) -> R) -> R {
        self.store.mutate(f)
    }

    /// Replace the whole record.
    pub fn replace(&self, model: M) {
        self.store.replace(model);
    }

    /// Replace the whole record from JSON.
    ///
    /// # Errors
    ///
    /// `TypeMismatch` when `value` does not deserialize into `M`; the
    /// record is left untouched.
    pub fn replace_value(&self, value: Value) -> StateResult<()> {
        let model = decode::<M>(value)?;
        self.replace(model);
        Ok(())
    }

    /// Run operation `name` with JSON arguments.
    ///
    /// Reads return the field value; mutations return `null`.
    ///
    /// # Errors
    ///
    /// `UnknownOperation` for names missing from the table,
    /// `InvalidMutation` for the wrong number of arguments, plus whatever
    /// the operation itself reports.
    pub fn invoke(&self, name: &str, args: Vec<Value>) -> StateResult<Value> {
        let category = self.table.lookup(name)?;
        let expected = match category {
            OpCategory::Read => 0,
            OpCategory::CopyMutate | OpCategory::ReduceMutate => 1,
        };
        if args.len() != expected {
            return Err(StateError::invalid(
                name,
                format!("expected {expected} argument(s), got {}", args.len()),
            ));
        }
        let mut args = args.into_iter();
        let arg = args.next().unwrap_or(Value::Null);
        match category {
            OpCategory::Read => self.read(name),
            OpCategory::CopyMutate => {
                let field = name.strip_prefix(SETTER_PREFIX).unwrap_or(name);
                self.write(field, arg).map(|()| Value::Null)
            }
            OpCategory::ReduceMutate => self.replace_value(arg).map(|()| Value::Null),
        }
    }

    /// Run `f` as one transaction.
    ///
    /// # Errors
    ///
    /// Whatever `f` returns; the record is then restored.
    pub fn transaction<R, E>(&self, f: impl FnOnce(&Self) -> Result<R, E>) -> Result<R, E> {
        self.store.transaction(|_| f(self))
    }

    /// Binding source scoped to field `name`.
    #[must_use]
    pub fn attr(&self, name: impl Into<String>) -> Scoped<M> {
        self.store.scoped(name)
    }

    /// See [`Store::subscribe`].
    pub fn subscribe(&self, subscriber: &Rc<dyn Subscriber>, scope: Option<&str>) -> bool {
        self.store.subscribe(subscriber, scope)
    }

    /// See [`Store::unsubscribe`].
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.store.unsubscribe(id)
    }
}

impl<M: Model> Source for ModelStore<M> {
    type Value = M;

    fn target(&self) -> Target {
        Target::new(&self.store, None)
    }

    fn read<R, F: FnOnce(&M) -> R>(&self, f: F) -> R {
        self.store.with(f)
    }
}
