#![forbid(unsafe_code)]

//! Changed-key sets produced by every flush.
//!
//! A [`ChangeSet`] is either [`ChangeSet::Whole`] ("assume everything may
//! have changed", used by collections and untyped stores) or a set of
//! attribute names. An empty key set means nothing changed and nobody is
//! notified.

use std::collections::BTreeSet;
use std::fmt;

/// The attribute names that differ between two snapshots.
#[derive(Clone, PartialEq, Eq)]
pub enum ChangeSet {
    /// The whole state may have changed; every subscriber is in scope.
    Whole,
    /// Exactly these attributes changed.
    Keys(BTreeSet<String>),
}

impl Default for ChangeSet {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Debug for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Whole => f.write_str("Whole"),
            Self::Keys(keys) => f.debug_set().entries(keys).finish(),
        }
    }
}

impl ChangeSet {
    /// An empty change set.
    #[must_use]
    pub fn none() -> Self {
        Self::Keys(BTreeSet::new())
    }

    /// The whole-state change set.
    #[must_use]
    pub fn whole() -> Self {
        Self::Whole
    }

    /// A change set naming the given keys.
    pub fn keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self::Keys(keys.into_iter().map(Into::into).collect())
    }

    /// True when nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Keys(keys) if keys.is_empty())
    }

    /// True for [`ChangeSet::Whole`].
    #[must_use]
    pub fn is_whole(&self) -> bool {
        matches!(self, Self::Whole)
    }

    /// Whether `key` is part of this change. `Whole` contains every key.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        match self {
            Self::Whole => true,
            Self::Keys(keys) => keys.contains(key),
        }
    }

    /// Whether a subscriber with the given attribute scope must be notified.
    ///
    /// Unscoped subscribers see every non-empty change; scoped ones only see
    /// whole-state changes or changes naming their attribute.
    #[must_use]
    pub fn touches(&self, scope: Option<&str>) -> bool {
        match scope {
            None => !self.is_empty(),
            Some(key) => self.contains(key),
        }
    }

    /// Number of changed keys, or `None` for `Whole`.
    #[must_use]
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::Whole => None,
            Self::Keys(keys) => Some(keys.len()),
        }
    }

    /// Iterate the changed keys. Empty for `Whole`.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let keys = match self {
            Self::Whole => None,
            Self::Keys(keys) => Some(keys.iter().map(String::as_str)),
        };
        keys.into_iter().flatten()
    }

    /// Accumulate `other` into `self`.
    pub fn union_with(&mut self, other: &ChangeSet) {
        if other.is_whole() {
            *self = Self::Whole;
            return;
        }
        if let (Self::Keys(mine), Self::Keys(theirs)) = (self, other) {
            mine.extend(theirs.iter().cloned());
        }
    }

    /// Keep only the keys also present in `other`. `Whole` acts as the
    /// full key set on either side.
    pub fn intersect_with(&mut self, other: &ChangeSet) {
        let Self::Keys(theirs) = other else {
            return;
        };
        match self {
            Self::Whole => *self = other.clone(),
            Self::Keys(mine) => mine.retain(|k| theirs.contains(k)),
        }
    }

    /// Insert a single key. No-op on `Whole`.
    pub fn insert(&mut self, key: impl Into<String>) {
        if let Self::Keys(keys) = self {
            keys.insert(key.into());
        }
    }
}

/// The default differ: `Whole` when the snapshots differ, empty otherwise.
pub fn whole_diff<S: PartialEq>(old: &S, new: &S) -> ChangeSet {
    if old == new {
        ChangeSet::none()
    } else {
        ChangeSet::Whole
    }
}
