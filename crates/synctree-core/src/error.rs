//! Error taxonomy for the graph subsystem.
//!
//! Every failure surfaces synchronously to the caller of the operation that
//! detected it; nothing is retried or swallowed internally. The subsystem
//! performs no I/O, so there is no transient-failure class.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeError {
    /// A scalar value was rejected by its field's validator.
    #[error("validation failed at '{path}': {message}")]
    Validation { path: String, message: String },

    /// An assigned value's runtime type disagrees with its descriptor.
    #[error("type mismatch at '{path}': expected {expected}, got {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    /// A referenced type or field has no registered descriptor.
    #[error("no field descriptors registered for {0}")]
    SchemaMissing(String),

    /// An object that already has a parent was attached somewhere else.
    #[error("ownership violation: {0}")]
    OwnershipViolation(String),

    /// Internal corruption (reverse-index miss, dirty-child mark pointing at
    /// a non-structured value). Not a caller error.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// A `modify`/`remove` patch operation targets a location the replica
    /// does not have; the two replicas have diverged.
    #[error("patch path not found: {0}")]
    PathNotFound(String),

    #[error("unsupported field kind: {0}")]
    Unsupported(&'static str),
}
