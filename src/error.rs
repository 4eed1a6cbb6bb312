// src/error.rs

//! Crate-wide error taxonomy
//!
//! One variant per error kind surfaced by the engine (see the component
//! design doc): validation, projected-state conflicts, execute-time
//! prerequisite failures, dependency/cycle errors, checksum mismatches,
//! filesystem errors, budget exhaustion, and the two wrapping kinds
//! (`RollbackError`, `PipelineError`). Every variant that names a path or
//! operation carries the `OperationId` and path so callers can always
//! answer "what failed and where" from the error alone.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::op::OperationId;

pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An operation's own preconditions failed (empty path, bad mode bits,
    /// missing item for create, invalid archive format, etc).
    #[error("validation failed for operation {id}: {message}")]
    ValidationError { id: OperationId, message: String },

    /// Add-time conflict between batch-internal operations.
    #[error(
        "projected state conflict: operation {id} on {path} conflicts with operation \
         {conflicting_id}: {message}"
    )]
    ProjectedStateConflict {
        id: OperationId,
        conflicting_id: OperationId,
        path: PathBuf,
        message: String,
    },

    /// Execute-time prerequisite failure (parent_dir / no_conflict /
    /// source_exists).
    #[error("prerequisite failed for operation {id} on {path}: {message}")]
    PrerequisiteError {
        id: OperationId,
        path: PathBuf,
        message: String,
    },

    /// An operation's `dependencies` list referenced an unknown operation id.
    #[error("operation {id} depends on unknown operation {depends_on}")]
    DependencyError {
        id: OperationId,
        depends_on: OperationId,
    },

    /// Topological sort found a cycle among the named operations.
    #[error("dependency cycle detected among operations: {cycle:?}")]
    CycleError { cycle: Vec<OperationId> },

    /// Source content changed between add-time and execute-time.
    #[error("checksum mismatch for operation {id} on {path}: content changed since it was added")]
    ChecksumMismatch { id: OperationId, path: PathBuf },

    /// The underlying filesystem port returned an error.
    #[error("filesystem error for operation {id} on {path}: {source}")]
    FilesystemError {
        id: OperationId,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reverse-op synthesis could not fit within the backup budget. This is
    /// a warning-level condition surfaced through `RunResult`, not normally
    /// returned from `run` itself, but kept as a variant so a caller that
    /// treats `restorable` as mandatory can turn it into a hard error.
    #[error("backup budget exceeded while synthesizing reverse of operation {id} on {path}")]
    BudgetExceeded { id: OperationId, path: PathBuf },

    /// Rollback was attempted after a failure and one or more reverse
    /// operations themselves failed. Never masks the original error.
    #[error("rollback failed after original error ({original}); {} rollback operation(s) also failed", .rollback_errors.len())]
    RollbackError {
        #[source]
        original: Box<Error>,
        rollback_errors: HashMap<OperationId, Error>,
    },

    /// Wraps the first failing operation in a pipeline run.
    #[error(
        "pipeline failed at operation {index} of {total} (id {failing_id}): {source}"
    )]
    PipelineError {
        index: usize,
        total: usize,
        failing_id: OperationId,
        successful_ids: Vec<OperationId>,
        #[source]
        source: Box<Error>,
    },

    /// A path escaped the filesystem root, or contained `..` components.
    #[error("path traversal rejected: {0}")]
    PathTraversal(String),

    /// A path was structurally invalid (empty, bad encoding, etc).
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A batch-wide operation was cancelled cooperatively.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// Unclassified I/O error passthrough, for call sites that have no
    /// operation id / path context to attach (e.g. journal bookkeeping).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The operation id this error is about, when it names one.
    pub fn operation_id(&self) -> Option<&OperationId> {
        match self {
            Error::ValidationError { id, .. }
            | Error::ProjectedStateConflict { id, .. }
            | Error::PrerequisiteError { id, .. }
            | Error::DependencyError { id, .. }
            | Error::ChecksumMismatch { id, .. }
            | Error::FilesystemError { id, .. }
            | Error::BudgetExceeded { id, .. } => Some(id),
            Error::PipelineError { failing_id, .. } => Some(failing_id),
            _ => None,
        }
    }
}
