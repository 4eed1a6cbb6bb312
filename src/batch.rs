// src/batch.rs

//! Batch builder (C6): the fluent, imperative entry point most callers use.
//!
//! Grounded on `Transaction::plan_operations` in the teacher crate — a
//! single object that accumulates a list of intended mutations, validating
//! each one as it's added, then hands the finished list to an engine for
//! execution. `Batch` plays the `Transaction` role here, bound to a
//! `Filesystem` instead of a package database connection.
//!
//! Every `add`-style method does four things, in order, mirroring §4.4's
//! "side effects of adding": (1) structural validation, (2) projected-state
//! update (rejecting batch-internal conflicts immediately — §4.2), (3)
//! auto-parent-directory insertion, (4) for copy/move/archive, a checksum
//! snapshot of every source that exists live right now.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::checksum::{self, ChecksumAlgorithm, ChecksumRecord};
use crate::executor::{Executor, ExecutorOptions, RunResult};
use crate::fs::{FileKind, Filesystem};
use crate::id::{IdGenerator, IdStrategy};
use crate::op::{
    ArchiveFormat, CustomSpec, Operation, OperationId, OperationKind, Prerequisite,
    DEFAULT_DIR_MODE, DEFAULT_FILE_MODE,
};
use crate::pipeline::Pipeline;
use crate::reverse::DEFAULT_BUDGET_BYTES;
use crate::tracker::ProjectedStateTracker;
use crate::{Error, Result};

/// Accumulates a set of filesystem operations against a bound
/// `Filesystem`, validating each one against the live filesystem and the
/// batch's own projected post-batch state as it's added.
pub struct Batch {
    fs: Arc<dyn Filesystem>,
    ids: IdGenerator,
    tracker: ProjectedStateTracker,
    operations: Vec<Operation>,
    checksums: HashMap<OperationId, Vec<(PathBuf, ChecksumRecord)>>,
    known_dirs: std::collections::HashSet<PathBuf>,
    checksum_algorithm: ChecksumAlgorithm,
}

impl Batch {
    pub fn new(fs: Arc<dyn Filesystem>) -> Self {
        Self::with_id_strategy(fs, IdStrategy::default())
    }

    /// Inject an explicit id-minting strategy, per the design notes on
    /// avoiding process-wide singletons — tests want deterministic
    /// `Sequence` ids, callers embedding this in a larger system may want
    /// their own.
    pub fn with_id_strategy(fs: Arc<dyn Filesystem>, strategy: IdStrategy) -> Self {
        Self {
            fs,
            ids: IdGenerator::new(strategy),
            tracker: ProjectedStateTracker::new(),
            operations: Vec::new(),
            checksums: HashMap::new(),
            known_dirs: std::collections::HashSet::new(),
            checksum_algorithm: ChecksumAlgorithm::default(),
        }
    }

    pub fn with_checksum_algorithm(mut self, algorithm: ChecksumAlgorithm) -> Self {
        self.checksum_algorithm = algorithm;
        self
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    fn push(&mut self, op: Operation) -> OperationId {
        let id = op.id.clone();
        self.operations.push(op);
        id
    }

    /// Walk from `path`'s parent up to the root, inserting an implicit
    /// `create_directory` for every ancestor that's neither live nor
    /// already scheduled by this batch, chained parent-first so the
    /// topological sort places the shallowest directory first regardless
    /// of insertion order ties.
    fn auto_create_parents(&mut self, path: &Path) -> Result<Option<OperationId>> {
        let missing = crate::resolver::missing_parent_dirs(self.fs.as_ref(), path, &self.known_dirs)?;
        let mut last = None;
        for dir in missing {
            let mut op = crate::resolver::auto_mkdir(&self.ids, &dir);
            if let Some(prev) = &last {
                op = op.with_dependency(prev.clone());
            }
            self.tracker
                .create(self.fs.as_ref(), &dir, FileKind::Directory, &op.id)?;
            self.known_dirs.insert(dir);
            let id = op.id.clone();
            self.operations.push(op);
            last = Some(id);
        }
        Ok(last)
    }

    fn snapshot_if_live(&self, path: &Path) -> Result<Option<ChecksumRecord>> {
        if self.fs.stat(path)?.map(|m| m.is_file()).unwrap_or(false) {
            Ok(Some(checksum::snapshot(self.fs.as_ref(), path, self.checksum_algorithm)?))
        } else {
            Ok(None)
        }
    }

    /// `path`'s projected kind, used to decide what a copy/move destination
    /// should be created as. Fails add-time if the source isn't live and
    /// wasn't created earlier in this same batch either.
    fn source_kind(&mut self, id: &OperationId, path: &Path) -> Result<FileKind> {
        self.tracker
            .kind_of(self.fs.as_ref(), path)?
            .ok_or_else(|| Error::ValidationError {
                id: id.clone(),
                message: format!("source {} does not exist and is not created by this batch", path.display()),
            })
    }

    pub fn create_directory(&mut self, path: impl Into<PathBuf>, mode: Option<u32>) -> Result<OperationId> {
        let path = path.into();
        let mode = mode.unwrap_or(DEFAULT_DIR_MODE);
        let id = self.ids.next("create_directory", &path);
        let mut op = Operation::new(id.clone(), OperationKind::CreateDirectory { path: path.clone(), mode })
            .with_prerequisite(Prerequisite::NoConflict(path.clone()));
        op.validate_self()?;
        self.tracker.create(self.fs.as_ref(), &path, FileKind::Directory, &id)?;
        if let Some(parent_id) = self.auto_create_parents(&path)? {
            op = op.with_prerequisite(Prerequisite::ParentDir(path.clone())).with_dependency(parent_id);
        } else {
            op = op.with_prerequisite(Prerequisite::ParentDir(path.clone()));
        }
        self.known_dirs.insert(path);
        Ok(self.push(op))
    }

    pub fn create_file(
        &mut self,
        path: impl Into<PathBuf>,
        content: impl Into<Vec<u8>>,
        mode: Option<u32>,
    ) -> Result<OperationId> {
        let path = path.into();
        let content = content.into();
        let mode = mode.unwrap_or(DEFAULT_FILE_MODE);
        let id = self.ids.next("create_file", &path);
        let mut op = Operation::new(
            id.clone(),
            OperationKind::CreateFile { path: path.clone(), content, mode },
        )
        .with_prerequisite(Prerequisite::NoConflict(path.clone()))
        .with_prerequisite(Prerequisite::ParentDir(path.clone()));
        op.validate_self()?;
        self.tracker.create(self.fs.as_ref(), &path, FileKind::File, &id)?;
        if let Some(parent_id) = self.auto_create_parents(&path)? {
            op = op.with_dependency(parent_id);
        }
        Ok(self.push(op))
    }

    pub fn create_symlink(&mut self, link: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Result<OperationId> {
        let link = link.into();
        let target = target.into();
        let id = self.ids.next("create_symlink", &link);
        let mut op = Operation::new(id.clone(), OperationKind::CreateSymlink { link: link.clone(), target: target.clone() })
            .with_prerequisite(Prerequisite::NoConflict(link.clone()))
            .with_prerequisite(Prerequisite::ParentDir(link.clone()));
        op.validate_self()?;

        let resolved_target = crate::fs::path::resolve_symlink_target(&link, &target)?;
        if !self.tracker.will_exist(self.fs.as_ref(), &resolved_target)? {
            return Err(Error::ValidationError {
                id: id.clone(),
                message: format!("symlink target {} is not projected to exist", resolved_target.display()),
            });
        }

        self.tracker.create(self.fs.as_ref(), &link, FileKind::Symlink, &id)?;
        if let Some(parent_id) = self.auto_create_parents(&link)? {
            op = op.with_dependency(parent_id);
        }
        Ok(self.push(op))
    }

    pub fn copy(&mut self, src: impl Into<PathBuf>, dst: impl Into<PathBuf>) -> Result<OperationId> {
        let src = src.into();
        let dst = dst.into();
        let id = self.ids.next("copy", &dst);
        let mut op = Operation::new(id.clone(), OperationKind::Copy { src: src.clone(), dst: dst.clone() })
            .with_prerequisite(Prerequisite::SourceExists(src.clone()))
            .with_prerequisite(Prerequisite::NoConflict(dst.clone()))
            .with_prerequisite(Prerequisite::ParentDir(dst.clone()));
        op.validate_self()?;

        let kind = self.source_kind(&id, &src)?;
        self.tracker.create(self.fs.as_ref(), &dst, kind, &id)?;
        if let Some(parent_id) = self.auto_create_parents(&dst)? {
            op = op.with_dependency(parent_id);
        }
        if let Some(record) = self.snapshot_if_live(&src)? {
            self.checksums.entry(id.clone()).or_default().push((src, record));
        }
        Ok(self.push(op))
    }

    pub fn move_op(&mut self, src: impl Into<PathBuf>, dst: impl Into<PathBuf>) -> Result<OperationId> {
        let src = src.into();
        let dst = dst.into();
        let id = self.ids.next("move", &dst);
        let mut op = Operation::new(id.clone(), OperationKind::Move { src: src.clone(), dst: dst.clone() })
            .with_prerequisite(Prerequisite::SourceExists(src.clone()))
            .with_prerequisite(Prerequisite::NoConflict(dst.clone()))
            .with_prerequisite(Prerequisite::ParentDir(dst.clone()));
        op.validate_self()?;

        let kind = self.source_kind(&id, &src)?;
        self.tracker.delete(self.fs.as_ref(), &src, &id)?;
        self.tracker.create(self.fs.as_ref(), &dst, kind, &id)?;
        if let Some(parent_id) = self.auto_create_parents(&dst)? {
            op = op.with_dependency(parent_id);
        }
        if let Some(record) = self.snapshot_if_live(&src)? {
            self.checksums.entry(id.clone()).or_default().push((src, record));
        }
        Ok(self.push(op))
    }

    pub fn delete(&mut self, path: impl Into<PathBuf>) -> Result<OperationId> {
        let path = path.into();
        let id = self.ids.next("delete", &path);
        let op = Operation::new(id.clone(), OperationKind::Delete { path: path.clone() })
            .with_prerequisite(Prerequisite::SourceExists(path.clone()));
        op.validate_self()?;
        self.tracker.delete(self.fs.as_ref(), &path, &id)?;
        Ok(self.push(op))
    }

    pub fn create_archive(
        &mut self,
        path: impl Into<PathBuf>,
        format: ArchiveFormat,
        sources: Vec<PathBuf>,
    ) -> Result<OperationId> {
        let path = path.into();
        let id = self.ids.next("create_archive", &path);
        let mut op = Operation::new(
            id.clone(),
            OperationKind::CreateArchive { path: path.clone(), format, sources: sources.clone() },
        )
        .with_prerequisite(Prerequisite::NoConflict(path.clone()))
        .with_prerequisite(Prerequisite::ParentDir(path.clone()));
        op.validate_self()?;

        for source in &sources {
            if !self.tracker.will_exist(self.fs.as_ref(), source)? {
                return Err(Error::ValidationError {
                    id: id.clone(),
                    message: format!("archive source {} is not projected to exist", source.display()),
                });
            }
        }

        self.tracker.create(self.fs.as_ref(), &path, FileKind::File, &id)?;
        if let Some(parent_id) = self.auto_create_parents(&path)? {
            op = op.with_dependency(parent_id);
        }
        for source in sources {
            if let Some(record) = self.snapshot_if_live(&source)? {
                self.checksums.entry(id.clone()).or_default().push((source, record));
            }
        }
        Ok(self.push(op))
    }

    pub fn unarchive(
        &mut self,
        path: impl Into<PathBuf>,
        extract_path: impl Into<PathBuf>,
        format: ArchiveFormat,
        patterns: Vec<String>,
    ) -> Result<OperationId> {
        let path = path.into();
        let extract_path = extract_path.into();
        let id = self.ids.next("unarchive", &extract_path);
        let op = Operation::new(
            id.clone(),
            OperationKind::Unarchive { path: path.clone(), extract_path: extract_path.clone(), format, patterns },
        )
        .with_prerequisite(Prerequisite::SourceExists(path.clone()))
        .with_prerequisite(Prerequisite::ParentDir(extract_path.clone()));
        op.validate_self()?;

        if !self.tracker.will_exist(self.fs.as_ref(), &path)? {
            return Err(Error::ValidationError {
                id: id.clone(),
                message: format!("archive {} is not projected to exist", path.display()),
            });
        }
        self.tracker.touch(self.fs.as_ref(), &extract_path)?;
        self.auto_create_parents(&extract_path)?;
        Ok(self.push(op))
    }

    pub fn custom(&mut self, custom_id: impl Into<String>, spec: CustomSpec) -> Result<OperationId> {
        let custom_id = custom_id.into();
        let id = self.ids.next("custom", Path::new(&custom_id));
        let op = Operation::new(id.clone(), OperationKind::Custom { custom_id, spec });
        op.validate_self()?;
        Ok(self.push(op))
    }

    fn into_pipeline(self) -> (Pipeline, Arc<dyn Filesystem>, IdGenerator) {
        (Pipeline::from_parts(self.operations, self.checksums), self.fs, self.ids)
    }

    pub fn run(self) -> Result<RunResult> {
        self.run_with_options(ExecutorOptions::default())
    }

    pub fn run_with_options(self, opts: ExecutorOptions) -> Result<RunResult> {
        let (pipeline, fs, ids) = self.into_pipeline();
        Executor::new(&ids).run(pipeline, fs.as_ref(), opts)
    }

    pub fn run_restorable(self) -> Result<RunResult> {
        self.run_restorable_with_budget(DEFAULT_BUDGET_BYTES / (1024 * 1024))
    }

    pub fn run_restorable_with_budget(self, max_mb: u64) -> Result<RunResult> {
        self.run_with_options(ExecutorOptions {
            restorable: true,
            max_backup_size_mb: max_mb,
            ..ExecutorOptions::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFilesystem;

    fn batch() -> Batch {
        Batch::with_id_strategy(Arc::new(MemFilesystem::new()), IdStrategy::Sequence)
    }

    #[test]
    fn nested_create_auto_inserts_parents() {
        let mut b = batch();
        b.create_file("a/b/c.txt", b"hi".to_vec(), None).unwrap();
        assert_eq!(b.operations().len(), 3);
        assert!(matches!(b.operations()[0].kind, OperationKind::CreateDirectory { .. }));
        assert!(matches!(b.operations()[1].kind, OperationKind::CreateDirectory { .. }));
        assert!(matches!(b.operations()[2].kind, OperationKind::CreateFile { .. }));
    }

    #[test]
    fn duplicate_create_is_rejected_at_add_time() {
        let mut b = batch();
        b.create_file("x", b"1".to_vec(), None).unwrap();
        let err = b.create_file("x", b"2".to_vec(), None).unwrap_err();
        assert!(matches!(err, Error::ProjectedStateConflict { .. }));
    }

    #[test]
    fn copy_of_missing_source_is_rejected() {
        let mut b = batch();
        let err = b.copy("missing", "dst").unwrap_err();
        assert!(matches!(err, Error::ValidationError { .. }));
    }

    #[test]
    fn move_then_delete_of_same_source_conflicts() {
        let fs = Arc::new(MemFilesystem::new());
        fs.write_file(Path::new("s"), b"x", 0o644).unwrap();
        let mut b = Batch::with_id_strategy(fs, IdStrategy::Sequence);
        b.move_op("s", "d").unwrap();
        let err = b.delete("s").unwrap_err();
        assert!(matches!(err, Error::ProjectedStateConflict { .. }));
    }

    #[test]
    fn symlink_requires_live_or_projected_target() {
        let mut b = batch();
        let err = b.create_symlink("link", "missing-target").unwrap_err();
        assert!(matches!(err, Error::ValidationError { .. }));

        let mut b = batch();
        b.create_file("target", b"x".to_vec(), None).unwrap();
        assert!(b.create_symlink("link", "target").is_ok());
    }
}
