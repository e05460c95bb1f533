#![forbid(unsafe_code)]

//! Error taxonomy for store construction and mutation.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | `TypeMismatch` | Value does not match the declared model/schema | Returned to caller, state untouched |
//! | `InvalidMutation` | Undeclared attribute, bad index, wrong category or arity | Returned to caller, state untouched |
//! | `UnknownOperation` | Name missing from a store's operation table | Returned to caller |
//!
//! Nothing here is retried. Panics raised inside producers or transaction
//! blocks are never caught.

use std::fmt;

/// Result alias used throughout the crate.
pub type StateResult<T> = Result<T, StateError>;

/// Errors from store, atom, collection and history operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// A value did not match the declared model type or attribute kind.
    TypeMismatch {
        /// What the store declared.
        expected: String,
        /// What the caller supplied.
        found: String,
    },
    /// The mutation shape is incompatible with the store.
    InvalidMutation {
        /// Operation or attribute name.
        operation: String,
        /// Human readable reason.
        reason: String,
    },
    /// The operation name is not present in the store's operation table.
    UnknownOperation {
        /// Store kind (`"list"`, `"map"`, model name).
        kind: String,
        /// The requested operation.
        operation: String,
    },
}

impl StateError {
    pub(crate) fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub(crate) fn invalid(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidMutation {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unknown(kind: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::UnknownOperation {
            kind: kind.into(),
            operation: operation.into(),
        }
    }
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch { expected, found } => {
                write!(f, "type mismatch: expected {expected}, found {found}")
            }
            Self::InvalidMutation { operation, reason } => {
                write!(f, "invalid mutation '{operation}': {reason}")
            }
            Self::UnknownOperation { kind, operation } => {
                write!(f, "unknown operation '{operation}' on {kind} store")
            }
        }
    }
}

impl std::error::Error for StateError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let e = StateError::type_mismatch("Todo", "string");
        assert_eq!(e.to_string(), "type mismatch: expected Todo, found string");

        let e = StateError::invalid("color", "attribute not declared");
        assert_eq!(
            e.to_string(),
            "invalid mutation 'color': attribute not declared"
        );

        let e = StateError::unknown("list", "frobnicate");
        assert_eq!(e.to_string(), "unknown operation 'frobnicate' on list store");
    }

    #[test]
    fn is_std_error() {
        fn takes_error(_: &dyn std::error::Error) {}
        takes_error(&StateError::invalid("x", "y"));
    }
}
