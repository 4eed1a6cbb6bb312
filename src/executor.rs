// src/executor.rs

//! Pipeline executor (C7): runs a resolved operation list in order,
//! publishing lifecycle events, re-verifying prerequisites and checksums
//! right before each operation's turn, and — in restorable mode —
//! synthesizing and capturing reverse operations as it goes.
//!
//! Grounded on `Transaction`'s phase methods in the teacher crate
//! (`plan_operations`, `prepare`, `backup_files`, `stage_files`,
//! `apply_filesystem`) as the model for a staged executor, and on
//! `TransactionOptions` (`cancel`, `progress`, `is_cancelled`) kept close to
//! verbatim as `ExecutorOptions`'s cancellation plumbing. Uses `log` the
//! way `src/transaction/mod.rs` does, since this module is this crate's
//! direct analogue of it.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::archive;
use crate::checksum;
use crate::events::{Event, EventBus};
use crate::fs::{FileKind, Filesystem};
use crate::id::IdGenerator;
use crate::op::{Operation, OperationId, OperationKind, Prerequisite};
use crate::pipeline::Pipeline;
use crate::reverse::{self, Budget, Reverse};
use crate::{Error, Result};

/// Cooperative cancellation signal, checked between operations and before
/// expensive archive-creation scans. Mirrors the teacher's
/// `TransactionOptions::cancel` / `is_cancelled` pair.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Options controlling one `Executor::run` call. §4.6 of the spec.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    pub restorable: bool,
    pub max_backup_size_mb: u64,
    pub rollback_on_error: bool,
    pub dry_run: bool,
    pub continue_on_error: bool,
    pub resolve_prerequisites: bool,
    pub cancel: Option<CancellationToken>,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            restorable: false,
            max_backup_size_mb: reverse::DEFAULT_BUDGET_BYTES / (1024 * 1024),
            rollback_on_error: false,
            dry_run: false,
            continue_on_error: false,
            resolve_prerequisites: true,
            cancel: None,
        }
    }
}

/// What happened to a single operation during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    Success,
    Failure,
    ValidationFailure,
    Skipped,
}

/// Per-operation outcome, recorded regardless of whether the operation
/// succeeded, so a caller can reconstruct exactly what happened to a batch
/// from `RunResult` alone.
#[derive(Debug, Clone)]
pub struct OperationOutcome {
    pub id: OperationId,
    pub op_type: &'static str,
    pub path: PathBuf,
    pub status: OperationStatus,
    pub error: Option<String>,
    pub duration: Duration,
    pub backup_size_mb: Option<u64>,
    pub outputs: Option<serde_json::Value>,
}

/// How much of the restorable budget was used vs. available.
#[derive(Debug, Clone, Copy)]
pub struct BudgetReport {
    pub used_mb: u64,
    pub max_mb: u64,
}

/// The result of running a pipeline. Mirrors §6's result shape field for
/// field.
#[derive(Debug)]
pub struct RunResult {
    pub success: bool,
    pub operations: Vec<OperationOutcome>,
    pub restore_ops: Vec<Operation>,
    pub duration: Duration,
    pub errors: Vec<Error>,
    pub budget: Option<BudgetReport>,
}

impl RunResult {
    /// Replay `restore_ops` in LIFO order against `fs`, for a caller
    /// invoking rollback manually after inspecting a successful (or
    /// already-handled) run — the automatic rollback a failing `run` itself
    /// performs is `handle_failure`'s job, which aggregates every rollback
    /// failure into a `RollbackError` alongside the original failure; this
    /// method has no "original" failure to pair them with, so it
    /// short-circuits on the first reverse operation that won't undo.
    pub fn rollback(&self, fs: &dyn Filesystem) -> Result<()> {
        for op in self.restore_ops.iter().rev() {
            execute_operation(op, fs)?;
        }
        Ok(())
    }
}

fn check_prerequisite(p: &Prerequisite, fs: &dyn Filesystem) -> Result<bool> {
    match p {
        Prerequisite::ParentDir(path) => match path.parent() {
            None => Ok(true),
            Some(parent) if parent.as_os_str().is_empty() => Ok(true),
            Some(parent) => Ok(fs.stat(parent)?.map(|m| m.is_dir()).unwrap_or(false)),
        },
        Prerequisite::NoConflict(path) => Ok(fs.stat(path)?.is_none()),
        Prerequisite::SourceExists(path) => Ok(fs.stat(path)?.is_some()),
    }
}

fn verify_prerequisites(op: &Operation, fs: &dyn Filesystem) -> Result<()> {
    for prereq in &op.prerequisites {
        if !check_prerequisite(prereq, fs)? {
            let (path, message) = match prereq {
                Prerequisite::ParentDir(p) => (p.clone(), "parent directory does not exist".to_string()),
                Prerequisite::NoConflict(p) => (p.clone(), "path already exists".to_string()),
                Prerequisite::SourceExists(p) => (p.clone(), "path does not exist".to_string()),
            };
            return Err(Error::PrerequisiteError { id: op.id.clone(), path, message });
        }
    }
    Ok(())
}

fn copy_path(fs: &dyn Filesystem, src: &Path, dst: &Path) -> Result<()> {
    let meta = fs.stat(src)?.ok_or_else(|| Error::FilesystemError {
        id: OperationId::new("copy"),
        path: src.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "copy source vanished"),
    })?;
    match meta.kind {
        FileKind::File => {
            let content = fs.read(src)?;
            fs.write_file(dst, &content, meta.mode)
        }
        FileKind::Symlink => {
            let target = fs.readlink(src)?;
            fs.symlink(&target, dst)
        }
        FileKind::Directory => {
            fs.mkdir_all(dst, meta.mode)?;
            for name in fs.read_dir(src)? {
                copy_path(fs, &src.join(&name), &dst.join(&name))?;
            }
            Ok(())
        }
    }
}

fn delete_path(fs: &dyn Filesystem, path: &Path) -> Result<()> {
    match fs.stat(path)? {
        Some(meta) if meta.kind == FileKind::Directory => fs.remove_all(path),
        Some(_) => fs.remove(path),
        None => Ok(()),
    }
}

/// Dispatch a single operation against `fs`. The one place every operation
/// kind's actual filesystem effect is defined — the pattern match the
/// design notes' "polymorphism over operation kinds" guidance calls for in
/// place of an inheritance-style adapter hierarchy.
fn execute_operation(op: &Operation, fs: &dyn Filesystem) -> Result<Option<serde_json::Value>> {
    match &op.kind {
        OperationKind::CreateFile { path, content, mode } => {
            fs.write_file(path, content, *mode)?;
            Ok(None)
        }
        OperationKind::CreateDirectory { path, mode } => {
            fs.mkdir_all(path, *mode)?;
            Ok(None)
        }
        OperationKind::CreateSymlink { link, target } => {
            let resolved = crate::fs::path::resolve_symlink_target(link, target)?;
            fs.symlink(&resolved, link)?;
            Ok(None)
        }
        OperationKind::CreateArchive { path, format, sources } => {
            let bytes = archive::create(fs, *format, sources)?;
            fs.write_file(path, &bytes, crate::op::DEFAULT_FILE_MODE)?;
            Ok(None)
        }
        OperationKind::Unarchive { path, extract_path, format, patterns } => {
            let extracted = archive::extract(fs, *format, path, extract_path, patterns)?;
            Ok(Some(serde_json::json!({
                "extracted": extracted.iter().map(|p| p.display().to_string()).collect::<Vec<_>>()
            })))
        }
        OperationKind::Copy { src, dst } => {
            copy_path(fs, src, dst)?;
            Ok(None)
        }
        OperationKind::Move { src, dst } => {
            fs.rename(src, dst)?;
            Ok(None)
        }
        OperationKind::Delete { path } => {
            delete_path(fs, path)?;
            Ok(None)
        }
        OperationKind::Custom { spec, .. } => {
            if let Some(validate) = &spec.validate {
                validate(fs)?;
            }
            let output = (spec.execute)(fs)?;
            Ok(if output.is_null() { None } else { Some(output) })
        }
    }
}

/// Runs a resolved `Pipeline` to completion (or failure) against a bound
/// `Filesystem`, owning the backup budget and reverse-op list for the
/// duration of the run (§3's "ownership & lifetime").
pub struct Executor<'a> {
    ids: &'a IdGenerator,
    events: EventBus,
}

impl<'a> Executor<'a> {
    pub fn new(ids: &'a IdGenerator) -> Self {
        Self { ids, events: EventBus::new() }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn run(&self, pipeline: Pipeline, fs: &dyn Filesystem, opts: ExecutorOptions) -> Result<RunResult> {
        let start = Instant::now();
        pipeline.validate()?;
        let (operations, checksums) = pipeline.into_parts();
        let ordered = crate::resolver::resolve(operations, opts.resolve_prerequisites)?;

        let mut outcomes = Vec::with_capacity(ordered.len());
        let mut errors = Vec::new();
        let mut restore_ops = Vec::new();
        let mut budget = Budget::from_mb(opts.max_backup_size_mb);

        // Step 2: structural validation, already covered by
        // `pipeline.validate()` above; nothing left to check per-op here
        // since live prerequisites are checked at each operation's own
        // turn (step 5a), not upfront (see `pipeline::Pipeline::validate`).

        let total = ordered.len();
        for (index, op) in ordered.iter().enumerate() {
            if let Some(cancel) = &opts.cancel {
                if cancel.is_cancelled() {
                    let err = Error::Cancelled(format!("batch cancelled before operation {}", op.id));
                    errors.push(err);
                    break;
                }
            }

            let op_start = Instant::now();

            if let Err(e) = verify_prerequisites(op, fs) {
                outcomes.push(OperationOutcome {
                    id: op.id.clone(),
                    op_type: op.type_tag(),
                    path: op.path().to_path_buf(),
                    status: OperationStatus::ValidationFailure,
                    error: Some(e.to_string()),
                    duration: op_start.elapsed(),
                    backup_size_mb: None,
                    outputs: None,
                });
                let stop = handle_failure(
                    e, op, index, total, &ordered, fs, &opts, &mut errors, &mut restore_ops,
                )?;
                if stop {
                    break;
                }
                continue;
            }

            if let Some(records) = checksums.get(&op.id) {
                let mut mismatch = None;
                for (path, record) in records {
                    if !checksum::matches(fs, path, record)? {
                        mismatch = Some(Error::ChecksumMismatch { id: op.id.clone(), path: path.clone() });
                        break;
                    }
                }
                if let Some(e) = mismatch {
                    outcomes.push(OperationOutcome {
                        id: op.id.clone(),
                        op_type: op.type_tag(),
                        path: op.path().to_path_buf(),
                        status: OperationStatus::Failure,
                        error: Some(e.to_string()),
                        duration: op_start.elapsed(),
                        backup_size_mb: None,
                        outputs: None,
                    });
                    let stop = handle_failure(
                        e, op, index, total, &ordered, fs, &opts, &mut errors, &mut restore_ops,
                    )?;
                    if stop {
                        break;
                    }
                    continue;
                }
            }

            let mut backup_size_mb = None;
            if opts.restorable {
                match reverse::synthesize(fs, op, self.ids, &mut budget)? {
                    Reverse::Operation(rev) => {
                        backup_size_mb = Some(budget.used_mb());
                        restore_ops.push(rev);
                    }
                    Reverse::BudgetExceeded => {
                        log::warn!(
                            "operation {} exceeds restorable budget ({}/{} MiB used); its reverse is unavailable",
                            op.id, budget.used_mb(), budget.max_mb()
                        );
                    }
                    Reverse::NotReversible => {}
                }
            }

            self.events.publish(Event::Started { id: op.id.clone(), type_tag: op.type_tag(), path: op.path().to_path_buf() });

            if opts.dry_run {
                self.events.publish(Event::Completed {
                    id: op.id.clone(),
                    type_tag: op.type_tag(),
                    path: op.path().to_path_buf(),
                    duration: op_start.elapsed(),
                });
                outcomes.push(OperationOutcome {
                    id: op.id.clone(),
                    op_type: op.type_tag(),
                    path: op.path().to_path_buf(),
                    status: OperationStatus::Skipped,
                    error: None,
                    duration: op_start.elapsed(),
                    backup_size_mb,
                    outputs: None,
                });
                continue;
            }

            match execute_operation(op, fs) {
                Ok(outputs) => {
                    let duration = op_start.elapsed();
                    self.events.publish(Event::Completed { id: op.id.clone(), type_tag: op.type_tag(), path: op.path().to_path_buf(), duration });
                    outcomes.push(OperationOutcome {
                        id: op.id.clone(),
                        op_type: op.type_tag(),
                        path: op.path().to_path_buf(),
                        status: OperationStatus::Success,
                        error: None,
                        duration,
                        backup_size_mb,
                        outputs,
                    });
                }
                Err(e) => {
                    let duration = op_start.elapsed();
                    self.events.publish(Event::Failed {
                        id: op.id.clone(),
                        type_tag: op.type_tag(),
                        path: op.path().to_path_buf(),
                        duration,
                        error: e.to_string(),
                    });
                    outcomes.push(OperationOutcome {
                        id: op.id.clone(),
                        op_type: op.type_tag(),
                        path: op.path().to_path_buf(),
                        status: OperationStatus::Failure,
                        error: Some(e.to_string()),
                        duration,
                        backup_size_mb,
                        outputs: None,
                    });
                    let stop = handle_failure(
                        e, op, index, total, &ordered, fs, &opts, &mut errors, &mut restore_ops,
                    )?;
                    if stop {
                        break;
                    }
                }
            }
        }

        let success = errors.is_empty();
        Ok(RunResult {
            success,
            operations: outcomes,
            restore_ops,
            duration: start.elapsed(),
            errors,
            budget: if opts.restorable { Some(BudgetReport { used_mb: budget.used_mb(), max_mb: budget.max_mb() }) } else { None },
        })
    }
}

/// Step 5f: decide what happens after an operation fails. Returns `Ok(true)`
/// to stop the run, `Ok(false)` to keep going (only valid when
/// `continue_on_error`). On `rollback_on_error`, replays every reverse op
/// accumulated so far, in LIFO order, before returning.
#[allow(clippy::too_many_arguments)]
fn handle_failure(
    error: Error,
    failing_op: &Operation,
    index: usize,
    total: usize,
    ordered: &[Operation],
    fs: &dyn Filesystem,
    opts: &ExecutorOptions,
    errors: &mut Vec<Error>,
    restore_ops: &mut Vec<Operation>,
) -> Result<bool> {
    let successful_ids: Vec<OperationId> = ordered[..index].iter().map(|o| o.id.clone()).collect();
    let wrapped = Error::PipelineError {
        index,
        total,
        failing_id: failing_op.id.clone(),
        successful_ids,
        source: Box::new(error),
    };

    if opts.rollback_on_error {
        let mut rollback_errors = std::collections::HashMap::new();
        for rev in restore_ops.iter().rev() {
            if let Err(e) = execute_operation(rev, fs) {
                rollback_errors.insert(rev.id.clone(), e);
            }
        }
        restore_ops.clear();
        if rollback_errors.is_empty() {
            errors.push(wrapped);
        } else {
            errors.push(Error::RollbackError { original: Box::new(wrapped), rollback_errors });
        }
        return Ok(true);
    }

    errors.push(wrapped);
    Ok(!opts.continue_on_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFilesystem;
    use crate::id::{IdGenerator, IdStrategy};
    use crate::op::OperationId;
    use std::path::PathBuf;

    fn ids() -> IdGenerator {
        IdGenerator::new(IdStrategy::Sequence)
    }

    #[test]
    fn dry_run_does_not_touch_the_filesystem() {
        let fs = MemFilesystem::new();
        let mut pipeline = Pipeline::new();
        pipeline.add(Operation::new(
            OperationId::new("f-1"),
            OperationKind::CreateFile {
                path: PathBuf::from("a.txt"),
                content: b"hi".to_vec(),
                mode: 0o644,
            },
        ));
        let ids = ids();
        let result = Executor::new(&ids)
            .run(pipeline, &fs, ExecutorOptions { dry_run: true, ..ExecutorOptions::default() })
            .unwrap();
        assert!(result.success);
        assert_eq!(result.operations[0].status, OperationStatus::Skipped);
        assert!(fs.stat(Path::new("a.txt")).unwrap().is_none());
    }

    #[test]
    fn failing_operation_stops_the_run_by_default() {
        let fs = MemFilesystem::new();
        let mut pipeline = Pipeline::new();
        pipeline.add(Operation::new(
            OperationId::new("d-1"),
            OperationKind::Delete { path: PathBuf::from("missing") },
        ));
        let ids = ids();
        let result = Executor::new(&ids).run(pipeline, &fs, ExecutorOptions::default()).unwrap();
        assert!(!result.success);
        assert_eq!(result.operations[0].status, OperationStatus::ValidationFailure);
    }

    #[test]
    fn restorable_rollback_undoes_executed_operations() {
        let fs = MemFilesystem::new();
        fs.write_file(Path::new("c"), b"pre-existing", 0o644).unwrap();

        let mut pipeline = Pipeline::new();
        pipeline.add(Operation::new(
            OperationId::new("a"),
            OperationKind::CreateFile { path: PathBuf::from("a"), content: b"1".to_vec(), mode: 0o644 },
        ));
        pipeline.add(Operation::new(
            OperationId::new("b"),
            OperationKind::CreateFile { path: PathBuf::from("b"), content: b"2".to_vec(), mode: 0o644 },
        ));
        pipeline.add(Operation::new(
            OperationId::new("c"),
            OperationKind::CreateDirectory { path: PathBuf::from("c"), mode: 0o755 },
        ));

        let ids = ids();
        let result = Executor::new(&ids)
            .run(
                pipeline,
                &fs,
                ExecutorOptions {
                    restorable: true,
                    rollback_on_error: true,
                    resolve_prerequisites: false,
                    ..ExecutorOptions::default()
                },
            )
            .unwrap();

        assert!(!result.success);
        assert!(fs.stat(Path::new("a")).unwrap().is_none());
        assert!(fs.stat(Path::new("b")).unwrap().is_none());
        assert_eq!(fs.read(Path::new("c")).unwrap(), b"pre-existing");
    }

    #[test]
    fn checksum_mismatch_fails_the_copy_and_leaves_destination_absent() {
        let fs = MemFilesystem::new();
        fs.write_file(Path::new("s"), b"hello", 0o644).unwrap();
        let record = checksum::snapshot(&fs, Path::new("s"), checksum::ChecksumAlgorithm::Sha256).unwrap();
        fs.write_file(Path::new("s"), b"tampered-bytes", 0o644).unwrap();

        let mut checksums = std::collections::HashMap::new();
        checksums.insert(OperationId::new("copy-1"), vec![(PathBuf::from("s"), record)]);
        let op = Operation::new(
            OperationId::new("copy-1"),
            OperationKind::Copy { src: PathBuf::from("s"), dst: PathBuf::from("d") },
        );
        let pipeline = Pipeline::from_parts(vec![op], checksums);

        let ids = ids();
        let result = Executor::new(&ids).run(pipeline, &fs, ExecutorOptions::default()).unwrap();
        assert!(!result.success);
        assert!(fs.stat(Path::new("d")).unwrap().is_none());
    }
}
