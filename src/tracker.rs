// src/tracker.rs

//! Projected-state tracker (C4): the central correctness mechanism.
//!
//! Simulates the post-batch filesystem so batch-internal conflicts
//! (duplicate creation, delete-of-created, move-of-deleted, ...) are
//! rejected at add-time instead of surfacing mid-execution. Conceptually
//! the same job the teacher's `VfsTree` does for a transaction plan —
//! lazily stat a path once, cache the result, then apply projected
//! mutations on top of it — but keyed by a closed state enum instead of
//! an arena of tree nodes, since this engine only ever needs "what's at
//! this path right now" and never needs to walk a tree of siblings.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::fs::{FileKind, Filesystem};
use crate::op::OperationId;
use crate::{Error, Result};

/// The state of a single path, post-batch, as simulated so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathState {
    Absent,
    ExistsFile,
    ExistsDir,
    ExistsSymlink,
    ScheduledCreate { kind: FileKind, by: OperationId },
    ScheduledDelete { by: OperationId },
    /// A path deleted and then recreated within the same batch. The
    /// current transition rules never construct this variant directly —
    /// a create attempted against a `ScheduledDelete` path is rejected,
    /// not promoted to a replace — but it's kept in the closed enum so a
    /// future relaxation of that rule has somewhere to land.
    ScheduledReplace {
        kind: FileKind,
        delete_by: OperationId,
        create_by: OperationId,
    },
}

impl PathState {
    fn will_exist(&self) -> bool {
        !matches!(self, PathState::Absent | PathState::ScheduledDelete { .. })
    }

    fn kind(&self) -> Option<FileKind> {
        match self {
            PathState::ExistsFile => Some(FileKind::File),
            PathState::ExistsDir => Some(FileKind::Directory),
            PathState::ExistsSymlink => Some(FileKind::Symlink),
            PathState::ScheduledCreate { kind, .. } => Some(*kind),
            PathState::ScheduledReplace { kind, .. } => Some(*kind),
            PathState::Absent | PathState::ScheduledDelete { .. } => None,
        }
    }
}

/// Simulates the filesystem state a batch will produce, one path at a
/// time, lazily seeded from the live filesystem the first time each path
/// is touched.
#[derive(Debug, Default)]
pub struct ProjectedStateTracker {
    states: HashMap<PathBuf, PathState>,
}

impl ProjectedStateTracker {
    pub fn new() -> Self {
        Self {
            states: HashMap::new(),
        }
    }

    fn ensure(&mut self, fs: &dyn Filesystem, path: &Path) -> Result<&PathState> {
        if !self.states.contains_key(path) {
            let initial = match fs.stat(path)? {
                None => PathState::Absent,
                Some(meta) if meta.is_dir() => PathState::ExistsDir,
                Some(meta) if meta.is_symlink() => PathState::ExistsSymlink,
                Some(_) => PathState::ExistsFile,
            };
            self.states.insert(path.to_path_buf(), initial);
        }
        Ok(self.states.get(path).expect("just inserted"))
    }

    /// Snapshot a path's initial state without changing it. Used for
    /// unarchive's extraction root, which is only appended to
    /// `modified_by` — no per-entry conflict is enforced at add-time.
    pub fn touch(&mut self, fs: &dyn Filesystem, path: &Path) -> Result<()> {
        self.ensure(fs, path)?;
        Ok(())
    }

    /// Whether `path` is projected to exist after the batch runs.
    pub fn will_exist(&mut self, fs: &dyn Filesystem, path: &Path) -> Result<bool> {
        Ok(self.ensure(fs, path)?.will_exist())
    }

    /// The kind `path` is projected to have, if it's projected to exist.
    pub fn kind_of(&mut self, fs: &dyn Filesystem, path: &Path) -> Result<Option<FileKind>> {
        Ok(self.ensure(fs, path)?.kind())
    }

    /// Record that `id` creates `path` as `kind`. The sole entry point for
    /// the `Absent -> ScheduledCreate` transition (and its rejections).
    pub fn create(
        &mut self,
        fs: &dyn Filesystem,
        path: &Path,
        kind: FileKind,
        id: &OperationId,
    ) -> Result<()> {
        let current = self.ensure(fs, path)?.clone();
        match current {
            PathState::Absent => {
                self.states.insert(
                    path.to_path_buf(),
                    PathState::ScheduledCreate {
                        kind,
                        by: id.clone(),
                    },
                );
                Ok(())
            }
            PathState::ScheduledCreate { by, .. } => Err(Error::ProjectedStateConflict {
                id: id.clone(),
                conflicting_id: by,
                path: path.to_path_buf(),
                message: "already scheduled for creation".to_string(),
            }),
            PathState::ExistsFile | PathState::ExistsDir | PathState::ExistsSymlink => {
                Err(Error::ProjectedStateConflict {
                    id: id.clone(),
                    conflicting_id: id.clone(),
                    path: path.to_path_buf(),
                    message: "already exists".to_string(),
                })
            }
            PathState::ScheduledDelete { by } => Err(Error::ProjectedStateConflict {
                id: id.clone(),
                conflicting_id: by,
                path: path.to_path_buf(),
                message: "was scheduled for deletion".to_string(),
            }),
            PathState::ScheduledReplace { create_by, .. } => Err(Error::ProjectedStateConflict {
                id: id.clone(),
                conflicting_id: create_by,
                path: path.to_path_buf(),
                message: "already scheduled for creation".to_string(),
            }),
        }
    }

    /// Record that `id` deletes `path`. The sole entry point for the
    /// `ExistsAny -> ScheduledDelete` transition (and its rejections).
    pub fn delete(&mut self, fs: &dyn Filesystem, path: &Path, id: &OperationId) -> Result<()> {
        let current = self.ensure(fs, path)?.clone();
        match current {
            PathState::ExistsFile | PathState::ExistsDir | PathState::ExistsSymlink => {
                self.states
                    .insert(path.to_path_buf(), PathState::ScheduledDelete { by: id.clone() });
                Ok(())
            }
            PathState::ScheduledCreate { by, .. } => Err(Error::ProjectedStateConflict {
                id: id.clone(),
                conflicting_id: by.clone(),
                path: path.to_path_buf(),
                message: format!("cannot delete: created in same batch by {by}"),
            }),
            PathState::ScheduledDelete { by } => Err(Error::ProjectedStateConflict {
                id: id.clone(),
                conflicting_id: by.clone(),
                path: path.to_path_buf(),
                message: format!("already scheduled for deletion by {by}"),
            }),
            PathState::Absent => Err(Error::ProjectedStateConflict {
                id: id.clone(),
                conflicting_id: id.clone(),
                path: path.to_path_buf(),
                message: "not projected to exist".to_string(),
            }),
            PathState::ScheduledReplace { delete_by, .. } => Err(Error::ProjectedStateConflict {
                id: id.clone(),
                conflicting_id: delete_by,
                path: path.to_path_buf(),
                message: "already scheduled for deletion".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFilesystem;

    #[test]
    fn create_on_absent_path_succeeds() {
        let fs = MemFilesystem::new();
        let mut tracker = ProjectedStateTracker::new();
        let id = OperationId::new("create-1");
        tracker
            .create(&fs, Path::new("a.txt"), FileKind::File, &id)
            .unwrap();
        assert!(tracker.will_exist(&fs, Path::new("a.txt")).unwrap());
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let fs = MemFilesystem::new();
        let mut tracker = ProjectedStateTracker::new();
        let first = OperationId::new("create-1");
        let second = OperationId::new("create-2");
        tracker
            .create(&fs, Path::new("a.txt"), FileKind::File, &first)
            .unwrap();
        let err = tracker
            .create(&fs, Path::new("a.txt"), FileKind::File, &second)
            .unwrap_err();
        match err {
            Error::ProjectedStateConflict { conflicting_id, .. } => {
                assert_eq!(conflicting_id, first)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn create_on_existing_live_path_is_rejected() {
        let fs = MemFilesystem::new();
        fs.write_file(Path::new("a.txt"), b"x", 0o644).unwrap();
        let mut tracker = ProjectedStateTracker::new();
        let id = OperationId::new("create-1");
        assert!(tracker
            .create(&fs, Path::new("a.txt"), FileKind::File, &id)
            .is_err());
    }

    #[test]
    fn delete_of_created_path_is_rejected() {
        let fs = MemFilesystem::new();
        let mut tracker = ProjectedStateTracker::new();
        let creator = OperationId::new("create-1");
        let deleter = OperationId::new("delete-1");
        tracker
            .create(&fs, Path::new("a.txt"), FileKind::File, &creator)
            .unwrap();
        let err = tracker.delete(&fs, Path::new("a.txt"), &deleter).unwrap_err();
        match err {
            Error::ProjectedStateConflict { conflicting_id, .. } => {
                assert_eq!(conflicting_id, creator)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn delete_of_absent_path_is_rejected() {
        let fs = MemFilesystem::new();
        let mut tracker = ProjectedStateTracker::new();
        let id = OperationId::new("delete-1");
        assert!(tracker.delete(&fs, Path::new("nope.txt"), &id).is_err());
    }

    #[test]
    fn create_after_scheduled_delete_is_rejected() {
        let fs = MemFilesystem::new();
        fs.write_file(Path::new("a.txt"), b"x", 0o644).unwrap();
        let mut tracker = ProjectedStateTracker::new();
        let deleter = OperationId::new("delete-1");
        let creator = OperationId::new("create-1");
        tracker.delete(&fs, Path::new("a.txt"), &deleter).unwrap();
        let err = tracker
            .create(&fs, Path::new("a.txt"), FileKind::File, &creator)
            .unwrap_err();
        match err {
            Error::ProjectedStateConflict { conflicting_id, .. } => {
                assert_eq!(conflicting_id, deleter)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn kind_of_reflects_scheduled_creation() {
        let fs = MemFilesystem::new();
        let mut tracker = ProjectedStateTracker::new();
        let id = OperationId::new("create-1");
        tracker
            .create(&fs, Path::new("d"), FileKind::Directory, &id)
            .unwrap();
        assert_eq!(
            tracker.kind_of(&fs, Path::new("d")).unwrap(),
            Some(FileKind::Directory)
        );
    }
}
