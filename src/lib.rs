// src/lib.rs

//! fsbatch: a transactional filesystem operation engine.
//!
//! Callers describe a batch of filesystem mutations — creating files,
//! directories, and symlinks, copying and moving paths, building and
//! extracting archives, or running custom operations — against a `Batch`.
//! Each addition is validated structurally and against a projected
//! post-batch filesystem state, so conflicts between operations in the same
//! batch are caught immediately rather than mid-run. Declared and inferred
//! dependencies between operations are topologically sorted into an
//! execution order before anything touches a filesystem.
//!
//! # Architecture
//!
//! - `fs`: the `Filesystem` port (`MemFilesystem` for tests, `OsFilesystem`
//!   for a real, root-confined tree) every other module is built against.
//! - `op`: the tagged-union operation model and its structural validation.
//! - `tracker`: the projected-state simulation used at add-time.
//! - `resolver`: auto-parent-directory insertion, inferred edges, and
//!   topological sort.
//! - `batch`: the fluent builder most callers use directly.
//! - `pipeline` / `executor`: the resolved, run-ready operation list and the
//!   engine that walks it, publishing lifecycle events as it goes.
//! - `reverse`: reverse-operation synthesis for restorable runs, budgeted
//!   in-memory backup capture.
//! - `checksum`, `archive`, `events`, `id`: supporting infrastructure shared
//!   across the above.

pub mod archive;
pub mod batch;
pub mod checksum;
pub mod convenience;
mod error;
pub mod events;
pub mod executor;
pub mod fs;
pub mod id;
pub mod op;
pub mod pipeline;
pub mod resolver;
pub mod reverse;
pub mod tracker;

pub use archive::{create as create_archive, extract as extract_archive};
pub use batch::Batch;
pub use checksum::{ChecksumAlgorithm, ChecksumRecord};
pub use convenience::{mkdir_all, remove, write_file};
pub use error::{Error, Result};
pub use events::{Event, EventBus, Handler, SubscriptionId};
pub use executor::{
    BudgetReport, CancellationToken, Executor, ExecutorOptions, OperationOutcome,
    OperationStatus, RunResult,
};
pub use fs::{FileKind, Filesystem, MemFilesystem, Metadata, OsFilesystem};
pub use id::{IdGenerator, IdStrategy};
pub use op::{ArchiveFormat, CustomSpec, Operation, OperationId, OperationKind, Prerequisite};
pub use pipeline::Pipeline;
pub use reverse::{Budget, Reverse, DEFAULT_BUDGET_BYTES};
pub use tracker::{PathState, ProjectedStateTracker};
