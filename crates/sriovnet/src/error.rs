//! Error types for SR-IOV device management operations.
//!
//! All errors implement `std::error::Error` via `thiserror`. Callers are
//! expected to branch on the error variant, not on message text; messages
//! exist for diagnostics only.

use std::io;
use thiserror::Error;

/// Result type alias for sriovnet operations.
pub type SriovResult<T> = Result<T, SriovError>;

/// Errors that can occur during SR-IOV device management.
#[derive(Debug, Error)]
pub enum SriovError {
    /// A named entity (netdev, PCI device, VF index) does not exist.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// What kind of entity was looked up (e.g. "netdev", "PCI device").
        kind: &'static str,
        /// The name or index that was looked up.
        name: String,
    },

    /// A name resolved to a device of the wrong kind, or a naming
    /// convention did not match.
    #[error("Failed to resolve '{name}': {reason}")]
    Lookup {
        /// The name that failed to resolve.
        name: String,
        /// Why resolution failed.
        reason: String,
    },

    /// An underlying device read/write failed.
    #[error("Device access failed: {operation}: {source}")]
    Accessor {
        /// The operation that failed (e.g. a sysfs path).
        operation: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// An external command returned a non-zero exit code.
    #[error("Command failed: '{command}' (exit code {exit_code}): {output}")]
    Command {
        /// The command that failed.
        command: String,
        /// The exit code.
        exit_code: i32,
        /// Combined stdout/stderr output.
        output: String,
    },

    /// A batch operation completed with a subset of failures.
    ///
    /// Already-succeeded work is kept; `failed` carries the VF indices
    /// that could not be configured.
    #[error("Batch operation failed for VF indices {failed:?}")]
    PartialFailure {
        /// The VF indices that failed.
        failed: Vec<u32>,
    },
}

impl SriovError {
    /// Creates a not-found error.
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Creates a lookup error.
    pub fn lookup(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Lookup {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates an accessor error wrapping an IO failure.
    pub fn accessor(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Accessor {
            operation: operation.into(),
            source,
        }
    }

    /// Returns true if this error indicates a missing entity rather than
    /// a failed operation on an existing one.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SriovError::NotFound { .. })
    }
}
