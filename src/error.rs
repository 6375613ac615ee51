//! Error types for nested map operations.

use std::fmt::Debug;

use thiserror::Error;

/// Result type alias for nested map operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for nested map operations.
///
/// Every variant is structural: nothing here is transient, so callers decide
/// between "treat as absent" (`KeyNotFound`) and "programming error"
/// (`Address`, `TypeMismatch`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A key (or the first unresolved path segment) is absent and the node
    /// governing it refuses to create a new level.
    #[error("missing key: {key}")]
    KeyNotFound { key: String },

    /// The path cannot be walked.
    #[error("invalid address: {0}")]
    Address(#[from] AddressError),

    /// A container was expected but a leaf was found, or vice versa.
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Creating or attaching a node would nest deeper than `Config::max_depth`.
    #[error("nesting depth limit {limit} exceeded")]
    DepthExceeded { limit: usize },
}

/// Malformed or non-walkable addresses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// A path with no segments.
    #[error("empty path")]
    EmptyPath,

    /// A path tried to descend through a leaf value.
    #[error("target under key {key} is not a container")]
    NotAContainer { key: String },
}

impl Error {
    pub(crate) fn key_not_found(key: &impl Debug) -> Self {
        Error::KeyNotFound {
            key: format!("{key:?}"),
        }
    }

    pub(crate) fn not_a_container(key: &impl Debug) -> Self {
        Error::Address(AddressError::NotAContainer {
            key: format!("{key:?}"),
        })
    }

    pub(crate) fn expected_container() -> Self {
        Error::TypeMismatch {
            expected: "container",
            found: "leaf",
        }
    }

    pub(crate) fn expected_leaf() -> Self {
        Error::TypeMismatch {
            expected: "leaf",
            found: "container",
        }
    }

    /// `true` for a key that is absent because its node is locked (or because
    /// a strict lookup was used).
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, Error::KeyNotFound { .. })
    }

    /// `true` for malformed paths and paths running through leaves.
    pub fn is_address_error(&self) -> bool {
        matches!(self, Error::Address(_))
    }
}
