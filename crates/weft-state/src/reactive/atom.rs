#![forbid(unsafe_code)]

//! Record stores with a fixed set of named attributes.
//!
//! An [`Atom`] is a [`Store`] whose state is [`Attributes`]: a map from the
//! attribute names declared in a [`Schema`] to JSON values. Changes are
//! computed per key, so a binding scoped to one attribute ignores writes to
//! the others.
//!
//! # Invariants
//!
//! 1. Only declared attributes exist; writing any other name fails with
//!    `InvalidMutation` and changes nothing.
//! 2. A partial mutation changes only the listed keys, and `last_changes`
//!    holds exactly the listed keys whose value actually differs.
//! 3. Every write is validated against the attribute's [`ValueKind`] before
//!    anything is applied.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde_json::{Map, Value};

use super::binding::{Scoped, Source};
use super::store::{Store, Subscriber, Target};
use crate::change::ChangeSet;
use crate::context::{StateContext, StoreId, SubscriberId};
use crate::error::{StateError, StateResult};

/// JSON type an attribute accepts. `null` is accepted by every kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Any,
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl ValueKind {
    /// The kind of `value`.
    #[must_use]
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Bool,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }

    /// Whether an attribute of this kind may hold `value`.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            kind => value.is_null() || Self::of(value) == kind,
        }
    }

    /// Lower-case name used in error messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Declared attributes of an atom, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<(String, ValueKind)>,
}

impl Schema {
    /// An empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `name` with `kind`. Redeclaring replaces the kind.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, kind: ValueKind) -> Self {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = kind,
            None => self.fields.push((name, kind)),
        }
        self
    }

    /// Declare every key of `object` with the kind of its value. Keys that
    /// start out `null` accept any kind.
    #[must_use]
    pub fn infer(object: &Map<String, Value>) -> Self {
        object.iter().fold(Self::new(), |schema, (name, value)| {
            let kind = match ValueKind::of(value) {
                ValueKind::Null => ValueKind::Any,
                kind => kind,
            };
            schema.field(name.clone(), kind)
        })
    }

    /// Kind of `name`, if declared.
    #[must_use]
    pub fn kind_of(&self, name: &str) -> Option<ValueKind> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, k)| *k)
    }

    /// Whether `name` is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.kind_of(name).is_some()
    }

    /// Declared names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    /// Number of declared attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check that `value` may be written to `name`.
    pub fn validate(&self, name: &str, value: &Value) -> StateResult<()> {
        let Some(kind) = self.kind_of(name) else {
            return Err(StateError::invalid(name, "attribute not declared"));
        };
        if !kind.accepts(value) {
            return Err(StateError::type_mismatch(
                format!("{kind} for '{name}'"),
                ValueKind::of(value).name(),
            ));
        }
        Ok(())
    }
}

/// Snapshot of an atom's attribute values.
#[derive(Debug, Clone, PartialEq)]
pub struct Attributes {
    schema: Rc<Schema>,
    values: BTreeMap<String, Value>,
}

impl Attributes {
    /// Value of `name`; `None` when undeclared.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// The schema these attributes follow.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Iterate `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True for an atom with no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The attributes as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Keys whose value differs between two snapshots.
    #[must_use]
    pub fn changed_keys(old: &Self, new: &Self) -> ChangeSet {
        let mut changes = ChangeSet::none();
        for (key, value) in &new.values {
            if old.values.get(key) != Some(value) {
                changes.insert(key.clone());
            }
        }
        for key in old.values.keys() {
            if !new.values.contains_key(key) {
                changes.insert(key.clone());
            }
        }
        changes
    }

    /// Keys of `partial` whose value differs from this snapshot.
    fn diff_partial(&self, partial: &BTreeMap<String, Value>) -> ChangeSet {
        let mut changes = ChangeSet::none();
        for (key, value) in partial {
            if self.values.get(key) != Some(value) {
                changes.insert(key.clone());
            }
        }
        changes
    }
}

/// A reactive record with declared attributes.
///
/// Cloning shares the same underlying store.
#[derive(Clone)]
pub struct Atom {
    store: Store<Attributes>,
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Atom")
            .field("id", &self.store.id())
            .field("attributes", &self.store.get().values)
            .field("version", &self.store.version())
            .finish()
    }
}

impl Atom {
    /// Create an atom following `schema`. Attributes missing from `initial`
    /// start as `null`.
    ///
    /// # Errors
    ///
    /// `InvalidMutation` for undeclared names, `TypeMismatch` for values of
    /// the wrong kind.
    pub fn new<I, K>(ctx: &StateContext, schema: Schema, initial: I) -> StateResult<Self>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut values: BTreeMap<String, Value> = schema
            .names()
            .map(|name| (name.to_owned(), Value::Null))
            .collect();
        for (name, value) in initial {
            let name = name.into();
            schema.validate(&name, &value)?;
            values.insert(name, value);
        }
        let attributes = Attributes {
            schema: Rc::new(schema),
            values,
        };
        Ok(Self {
            store: Store::with_differ(ctx, attributes, Attributes::changed_keys),
        })
    }

    /// Create an atom from a JSON object, inferring the schema from it.
    ///
    /// # Errors
    ///
    /// `TypeMismatch` when `value` is not an object.
    pub fn from_json(ctx: &StateContext, value: Value) -> StateResult<Self> {
        let Value::Object(object) = value else {
            return Err(StateError::type_mismatch(
                "object",
                ValueKind::of(&value).name(),
            ));
        };
        let schema = Schema::infer(&object);
        Self::new(ctx, schema, object)
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Store<Attributes> {
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
    pub fn snapshot(&self) -> Rc<Attributes> {
        self.store.get()
    }

    /// A copy of attribute `name`; `None` when undeclared.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.store.with(|a| a.get(name).cloned())
    }

    /// All attributes as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> Value {
        self.store.with(Attributes::to_json)
    }

    /// Changed keys of the most recent flush.
    #[must_use]
    pub fn last_changes(&self) -> ChangeSet {
        self.store.last_changes()
    }

    /// Assign one attribute.
    ///
    /// # Errors
    ///
    /// See [`Schema::validate`].
    pub fn set(&self, name: &str, value: Value) -> StateResult<()> {
        self.mutate([(name, value)]).map(|_| ())
    }

    /// Merge `partial` into the attributes as one mutation.
    ///
    /// Every entry is validated before anything is written. Returns the
    /// new snapshot.
    ///
    /// # Errors
    ///
    /// See [`Schema::validate`].
    pub fn mutate<I, K>(&self, partial: I) -> StateResult<Rc<Attributes>>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let partial: Vec<(String, Value)> =
            partial.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let (changes, partial) = self.store.with(|current| -> StateResult<_> {
            for (name, value) in &partial {
                current.schema.validate(name, value)?;
            }
            // Repeated keys: the last write wins.
            let merged: BTreeMap<String, Value> = partial.into_iter().collect();
            Ok((current.diff_partial(&merged), merged))
        })?;

        self.store.mutate_keys(changes, move |attrs| {
            attrs.values.extend(partial);
        });
        Ok(self.store.get())
    }

    /// Run `f` as one transaction: any number of `set`/`mutate` calls
    /// inside notify once, with the union of their changed keys.
    ///
    /// # Errors
    ///
    /// Whatever `f` returns; the atom is then left as it was.
    pub fn transaction<R, E>(&self, f: impl FnOnce(&Atom) -> Result<R, E>) -> Result<R, E> {
        self.store.transaction(|_| f(self))
    }

    /// Apply `partial`, then run `f`, as one transaction.
    ///
    /// # Errors
    ///
    /// Validation errors from `partial`, or whatever `f` returns.
    pub fn mutate_with<I, K, R>(
        &self,
        partial: I,
        f: impl FnOnce(&Atom) -> StateResult<R>,
    ) -> StateResult<R>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.transaction(|atom| {
            atom.mutate(partial)?;
            f(atom)
        })
    }

    /// Binding source scoped to attribute `name`; producers receive the
    /// attribute value.
    #[must_use]
    pub fn attr(&self, name: impl Into<String>) -> AttrSource {
        AttrSource {
            atom: self.clone(),
            name: name.into(),
        }
    }

    /// Binding source scoped to attribute `name`; producers receive the
    /// whole snapshot.
    #[must_use]
    pub fn scoped(&self, name: impl Into<String>) -> Scoped<Attributes> {
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

impl Source for Atom {
    type Value = Attributes;

    fn target(&self) -> Target {
        Target::new(&self.store, None)
    }

    fn read<R, F: FnOnce(&Attributes) -> R>(&self, f: F) -> R {
        self.store.with(f)
    }
}

/// One attribute of an atom as a binding source.
#[derive(Debug, Clone)]
pub struct AttrSource {
    atom: Atom,
    name: String,
}

impl AttrSource {
    /// The attribute name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Source for AttrSource {
    type Value = Value;

    fn target(&self) -> Target {
        Target::new(&self.atom.store, Some(&self.name))
    }

    fn read<R, F: FnOnce(&Value) -> R>(&self, f: F) -> R {
        self.atom
            .store
            .with(|attrs| f(attrs.get(&self.name).unwrap_or(&Value::Null)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::binding::{Binding, Content, Filter, Producer};
    use serde_json::json;

    fn todo(ctx: &StateContext) -> Atom {
        Atom::from_json(ctx, json!({"id": 1, "text": "t", "completed": false})).unwrap()
    }

    #[test]
    fn partial_mutate_changes_only_listed_keys() {
        let ctx = StateContext::headless();
        let atom = todo(&ctx);
        atom.mutate([("text", json!("t2"))]).unwrap();

        assert_eq!(atom.last_changes(), ChangeSet::keys(["text"]));
        assert_eq!(atom.get("text"), Some(json!("t2")));
        assert_eq!(atom.get("completed"), Some(json!(false)));
        assert_eq!(atom.get("id"), Some(json!(1)));
    }

    #[test]
    fn unchanged_values_are_not_reported() {
        let ctx = StateContext::headless();
        let atom = todo(&ctx);
        atom.mutate([("text", json!("t")), ("completed", json!(true))])
            .unwrap();
        assert_eq!(atom.last_changes(), ChangeSet::keys(["completed"]));

        let v = atom.version();
        atom.set("completed", json!(true)).unwrap();
        assert_eq!(atom.version(), v);
    }

    #[test]
    fn repeated_key_in_partial_uses_last_value() {
        let ctx = StateContext::headless();
        let atom = todo(&ctx);
        let text = Binding::new(&ctx, atom.attr("text"), Producer::value_only(Value::clone));

        atom.mutate([("text", json!("x")), ("text", json!("t"))]).unwrap();
        assert_eq!(atom.version(), 0);
        assert_eq!(text.evaluations(), 1);

        atom.mutate([("text", json!("t")), ("text", json!("y"))]).unwrap();
        assert_eq!(atom.get("text"), Some(json!("y")));
        assert_eq!(atom.last_changes(), ChangeSet::keys(["text"]));
        assert_eq!(text.evaluations(), 2);
    }

    #[test]
    fn undeclared_attribute_is_invalid() {
        let ctx = StateContext::headless();
        let atom = todo(&ctx);
        let err = atom
            .mutate([("text", json!("x")), ("color", json!("red"))])
            .unwrap_err();
        assert!(matches!(err, StateError::InvalidMutation { .. }));
        // Nothing applied, not even the valid entry.
        assert_eq!(atom.get("text"), Some(json!("t")));
        assert_eq!(atom.version(), 0);
    }

    #[test]
    fn wrong_kind_is_type_mismatch() {
        let ctx = StateContext::headless();
        let atom = todo(&ctx);
        let err = atom.set("completed", json!("yes")).unwrap_err();
        assert_eq!(
            err,
            StateError::TypeMismatch {
                expected: "bool for 'completed'".into(),
                found: "string".into(),
            }
        );
        atom.set("completed", Value::Null).unwrap();
    }

    #[test]
    fn constructor_validates() {
        let ctx = StateContext::headless();
        let schema = Schema::new()
            .field("name", ValueKind::String)
            .field("age", ValueKind::Number);

        let atom = Atom::new(&ctx, schema.clone(), [("name", json!("ada"))]).unwrap();
        assert_eq!(atom.get("age"), Some(Value::Null));

        let err = Atom::new(&ctx, schema.clone(), [("age", json!("old"))]).unwrap_err();
        assert!(matches!(err, StateError::TypeMismatch { .. }));

        let err = Atom::new(&ctx, schema, [("email", json!("a@b"))]).unwrap_err();
        assert!(matches!(err, StateError::InvalidMutation { .. }));

        let err = Atom::from_json(&ctx, json!([1, 2])).unwrap_err();
        assert_eq!(err, StateError::type_mismatch("object", "array"));
    }

    #[test]
    fn transaction_collapses_to_one_flush() {
        let ctx = StateContext::headless();
        let atom = todo(&ctx);
        let b = Binding::new(&ctx, atom.clone(), Producer::value_only(|a: &Attributes| a.len()));

        atom.transaction(|a| {
            a.set("text", json!("one"))?;
            a.set("text", json!("two"))?;
            a.transaction(|a| a.set("completed", json!(true)))?;
            assert_eq!(a.get("text"), Some(json!("two")));
            Ok::<_, StateError>(())
        })
        .unwrap();

        assert_eq!(b.evaluations(), 2);
        assert_eq!(atom.version(), 1);
        assert_eq!(atom.last_changes(), ChangeSet::keys(["completed", "text"]));
    }

    #[test]
    fn transaction_skips_attributes_set_back() {
        let ctx = StateContext::headless();
        let atom = todo(&ctx);
        let text = Binding::new(&ctx, atom.attr("text"), Producer::value_only(Value::clone));

        atom.transaction(|a| {
            a.set("text", json!("x"))?;
            a.set("text", json!("t"))?;
            a.set("completed", json!(true))
        })
        .unwrap();

        assert_eq!(atom.last_changes(), ChangeSet::keys(["completed"]));
        assert_eq!(text.evaluations(), 1);
    }

    #[test]
    fn failed_block_leaves_atom_untouched() {
        let ctx = StateContext::headless();
        let atom = todo(&ctx);
        let before = atom.snapshot();
        let err = atom
            .mutate_with([("text", json!("new"))], |a| a.set("nope", json!(1)))
            .unwrap_err();
        assert!(matches!(err, StateError::InvalidMutation { .. }));
        assert_eq!(*atom.snapshot(), *before);
        assert_eq!(atom.version(), 0);
    }

    #[test]
    fn mutate_with_merges_partial_and_block() {
        let ctx = StateContext::headless();
        let atom = todo(&ctx);
        atom.mutate_with([("text", json!("a"))], |a| a.set("id", json!(2)))
            .unwrap();
        assert_eq!(atom.last_changes(), ChangeSet::keys(["id", "text"]));
        assert_eq!(atom.version(), 1);
    }

    #[test]
    fn attr_binding_scope() {
        let ctx = StateContext::headless();
        let atom = todo(&ctx);
        let b = Binding::build(&ctx, atom.attr("completed"))
            .filter(Filter::value_only(|v: &Value| v == &json!(true)))
            .produce(Producer::value_only(|_: &Value| "item"));
        assert!(b.content().is_suppressed());

        atom.set("completed", json!(true)).unwrap();
        assert_eq!(b.content(), Content::Rendered("item"));
        assert_eq!(b.evaluations(), 1);

        atom.set("text", json!("t2")).unwrap();
        assert_eq!(b.evaluations(), 1);
    }

    #[test]
    fn schema_infer_treats_null_as_any() {
        let schema = Schema::infer(json!({"a": null, "b": 1}).as_object().unwrap());
        assert_eq!(schema.kind_of("a"), Some(ValueKind::Any));
        assert_eq!(schema.kind_of("b"), Some(ValueKind::Number));
        assert_eq!(schema.names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn to_json_round_trips_attributes() {
        let ctx = StateContext::headless();
        let atom = todo(&ctx);
        assert_eq!(
            atom.to_json(),
            json!({"id": 1, "text": "t", "completed": false})
        );
    }
}
