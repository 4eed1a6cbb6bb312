// src/op.rs

//! Operation model: a tagged-variant `OperationKind` plus the shared
//! `Operation` wrapper, in place of the inheritance-style "operation
//! adapter" layering an object-oriented port of this design would use (see
//! the design notes on polymorphism over operation kinds). Prerequisite
//! lists and reverse-op synthesis become pure pattern matches on the tag.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use crate::id::OperationId;
use crate::fs::Filesystem;
use crate::Result;

/// A declarative execute-time precondition, evaluated against the live
/// filesystem just before an operation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prerequisite {
    /// The parent directory of `path` exists (live or projected).
    ParentDir(PathBuf),
    /// No item exists at `path`.
    NoConflict(PathBuf),
    /// `path` exists.
    SourceExists(PathBuf),
}

/// Archive wire format for `create_archive`/`unarchive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveFormat {
    TarGz,
    Zip,
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveFormat::TarGz => write!(f, "tar+gzip"),
            ArchiveFormat::Zip => write!(f, "zip"),
        }
    }
}

/// Default mode bits used when a caller doesn't specify one.
pub const DEFAULT_FILE_MODE: u32 = 0o644;
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// Callables carried by a `custom` operation. Executed by the pipeline
/// exactly like any built-in operation kind; `rollback` is optional (its
/// absence makes the reverse a no-op), `validate` is optional
/// (add-time/execute-time extra validation), and `output` lets a custom
/// operation stash a result value retrievable from `RunResult`.
pub type CustomExecuteFn =
    Arc<dyn Fn(&dyn Filesystem) -> Result<serde_json::Value> + Send + Sync>;
pub type CustomRollbackFn = Arc<dyn Fn(&dyn Filesystem) -> Result<()> + Send + Sync>;
pub type CustomValidateFn = Arc<dyn Fn(&dyn Filesystem) -> Result<()> + Send + Sync>;

#[derive(Clone)]
pub struct CustomSpec {
    pub execute: CustomExecuteFn,
    pub rollback: Option<CustomRollbackFn>,
    pub validate: Option<CustomValidateFn>,
}

impl fmt::Debug for CustomSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomSpec")
            .field("rollback", &self.rollback.is_some())
            .field("validate", &self.validate.is_some())
            .finish()
    }
}

/// The tagged union of every operation type the engine supports. One
/// variant per row of the batch builder's public contract.
#[derive(Debug, Clone)]
pub enum OperationKind {
    CreateFile {
        path: PathBuf,
        content: Vec<u8>,
        mode: u32,
    },
    CreateDirectory {
        path: PathBuf,
        mode: u32,
    },
    CreateSymlink {
        link: PathBuf,
        target: PathBuf,
    },
    CreateArchive {
        path: PathBuf,
        format: ArchiveFormat,
        sources: Vec<PathBuf>,
    },
    Unarchive {
        path: PathBuf,
        extract_path: PathBuf,
        format: ArchiveFormat,
        patterns: Vec<String>,
    },
    Copy {
        src: PathBuf,
        dst: PathBuf,
    },
    Move {
        src: PathBuf,
        dst: PathBuf,
    },
    Delete {
        path: PathBuf,
    },
    Custom {
        custom_id: String,
        spec: CustomSpec,
    },
}

impl OperationKind {
    /// Canonical action verb, used in user-visible error messages (§7).
    pub fn verb(&self) -> &'static str {
        match self {
            OperationKind::CreateFile { .. } => "create file",
            OperationKind::CreateDirectory { .. } => "create directory",
            OperationKind::CreateSymlink { .. } => "create symlink",
            OperationKind::CreateArchive { .. } => "create archive",
            OperationKind::Unarchive { .. } => "unarchive",
            OperationKind::Copy { .. } => "copy",
            OperationKind::Move { .. } => "move",
            OperationKind::Delete { .. } => "delete",
            OperationKind::Custom { .. } => "custom",
        }
    }

    /// The short type tag used in generated ids and event payloads.
    pub fn type_tag(&self) -> &'static str {
        match self {
            OperationKind::CreateFile { .. } => "create_file",
            OperationKind::CreateDirectory { .. } => "create_directory",
            OperationKind::CreateSymlink { .. } => "create_symlink",
            OperationKind::CreateArchive { .. } => "create_archive",
            OperationKind::Unarchive { .. } => "unarchive",
            OperationKind::Copy { .. } => "copy",
            OperationKind::Move { .. } => "move",
            OperationKind::Delete { .. } => "delete",
            OperationKind::Custom { .. } => "custom",
        }
    }

    /// The operation's primary path (the path the tracker keys
    /// create/delete conflicts on).
    pub fn primary_path(&self) -> &Path {
        match self {
            OperationKind::CreateFile { path, .. }
            | OperationKind::CreateDirectory { path, .. }
            | OperationKind::CreateArchive { path, .. }
            | OperationKind::Unarchive { path, .. }
            | OperationKind::Delete { path } => path,
            OperationKind::CreateSymlink { link, .. } => link,
            OperationKind::Copy { dst, .. } | OperationKind::Move { dst, .. } => dst,
            OperationKind::Custom { .. } => Path::new(""),
        }
    }

    /// The operation's secondary path, if it has one (copy/move source,
    /// symlink target, unarchive extraction root).
    pub fn secondary_path(&self) -> Option<&Path> {
        match self {
            OperationKind::Copy { src, .. } | OperationKind::Move { src, .. } => Some(src),
            OperationKind::CreateSymlink { target, .. } => Some(target),
            OperationKind::Unarchive { extract_path, .. } => Some(extract_path),
            _ => None,
        }
    }

    /// Every source path this operation reads from (for R1: reader-before-
    /// deleter ordering). For archives, every listed source.
    pub fn read_paths(&self) -> Vec<PathBuf> {
        match self {
            OperationKind::Copy { src, .. } | OperationKind::Move { src, .. } => vec![src.clone()],
            OperationKind::CreateArchive { sources, .. } => sources.clone(),
            OperationKind::Unarchive { path, .. } => vec![path.clone()],
            _ => Vec::new(),
        }
    }

    /// Every path this operation creates (for R2: creator-before-symlink).
    pub fn created_paths(&self) -> Vec<PathBuf> {
        match self {
            OperationKind::CreateFile { path, .. }
            | OperationKind::CreateDirectory { path, .. }
            | OperationKind::CreateArchive { path, .. } => vec![path.clone()],
            OperationKind::CreateSymlink { link, .. } => vec![link.clone()],
            OperationKind::Copy { dst, .. } | OperationKind::Move { dst, .. } => vec![dst.clone()],
            _ => Vec::new(),
        }
    }
}

/// A single operation in a batch: a kind plus the id/ordering metadata
/// shared by every operation type, per the data model's invariant that
/// identity and dependency wiring live outside the per-kind payload.
#[derive(Debug, Clone)]
pub struct Operation {
    pub id: OperationId,
    pub kind: OperationKind,
    pub dependencies: Vec<OperationId>,
    pub prerequisites: Vec<Prerequisite>,
}

impl Operation {
    pub fn new(id: OperationId, kind: OperationKind) -> Self {
        Self {
            id,
            kind,
            dependencies: Vec::new(),
            prerequisites: Vec::new(),
        }
    }

    pub fn with_dependency(mut self, dep: OperationId) -> Self {
        if !self.dependencies.contains(&dep) {
            self.dependencies.push(dep);
        }
        self
    }

    pub fn with_prerequisite(mut self, prereq: Prerequisite) -> Self {
        self.prerequisites.push(prereq);
        self
    }

    pub fn path(&self) -> &Path {
        self.kind.primary_path()
    }

    pub fn type_tag(&self) -> &'static str {
        self.kind.type_tag()
    }

    pub fn verb(&self) -> &'static str {
        self.kind.verb()
    }

    /// Structural self-validation: the checks that don't need a filesystem
    /// at all (non-empty paths, sane mode bits, non-empty archive sources).
    /// Run once at add-time by the batch builder, and again by
    /// `Pipeline::validate` for callers that build operations directly
    /// against the lower-level pipeline API.
    pub fn validate_self(&self) -> crate::Result<()> {
        let bad_mode = |mode: u32| mode > 0o7777;
        match &self.kind {
            OperationKind::CreateFile { path, mode, .. } => {
                if path.as_os_str().is_empty() {
                    return Err(invalid(&self.id, "empty path"));
                }
                if bad_mode(*mode) {
                    return Err(invalid(&self.id, "mode exceeds 0o7777"));
                }
            }
            OperationKind::CreateDirectory { path, mode } => {
                if path.as_os_str().is_empty() {
                    return Err(invalid(&self.id, "empty path"));
                }
                if bad_mode(*mode) {
                    return Err(invalid(&self.id, "mode exceeds 0o7777"));
                }
            }
            OperationKind::CreateSymlink { link, target } => {
                if link.as_os_str().is_empty() || target.as_os_str().is_empty() {
                    return Err(invalid(&self.id, "symlink requires a link and a target path"));
                }
            }
            OperationKind::CreateArchive { path, sources, .. } => {
                if path.as_os_str().is_empty() {
                    return Err(invalid(&self.id, "empty path"));
                }
                if sources.is_empty() {
                    return Err(invalid(&self.id, "archive requires at least one source"));
                }
            }
            OperationKind::Unarchive { path, extract_path, .. } => {
                if path.as_os_str().is_empty() || extract_path.as_os_str().is_empty() {
                    return Err(invalid(&self.id, "unarchive requires an archive path and an extract path"));
                }
            }
            OperationKind::Copy { src, dst } | OperationKind::Move { src, dst } => {
                if src.as_os_str().is_empty() || dst.as_os_str().is_empty() {
                    return Err(invalid(&self.id, "src and dst must both be non-empty"));
                }
            }
            OperationKind::Delete { path } => {
                if path.as_os_str().is_empty() {
                    return Err(invalid(&self.id, "empty path"));
                }
            }
            OperationKind::Custom { custom_id, .. } => {
                if custom_id.is_empty() {
                    return Err(invalid(&self.id, "custom operation requires a non-empty id"));
                }
            }
        }
        Ok(())
    }
}

fn invalid(id: &OperationId, message: &str) -> crate::Error {
    crate::Error::ValidationError {
        id: id.clone(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_move_expose_both_paths() {
        let op = Operation::new(
            OperationId::new("copy-1"),
            OperationKind::Copy {
                src: PathBuf::from("a"),
                dst: PathBuf::from("b"),
            },
        );
        assert_eq!(op.path(), Path::new("b"));
        assert_eq!(op.kind.secondary_path(), Some(Path::new("a")));
        assert_eq!(op.kind.read_paths(), vec![PathBuf::from("a")]);
    }

    #[test]
    fn symlink_requires_target_readiness() {
        let op = Operation::new(
            OperationId::new("sym-1"),
            OperationKind::CreateSymlink {
                link: PathBuf::from("link"),
                target: PathBuf::from("target"),
            },
        );
        assert_eq!(op.kind.created_paths(), vec![PathBuf::from("link")]);
        assert_eq!(op.kind.secondary_path(), Some(Path::new("target")));
    }

    #[test]
    fn dependencies_are_deduplicated() {
        let op = Operation::new(
            OperationId::new("x"),
            OperationKind::Delete {
                path: PathBuf::from("p"),
            },
        )
        .with_dependency(OperationId::new("a"))
        .with_dependency(OperationId::new("a"));
        assert_eq!(op.dependencies.len(), 1);
    }

    #[test]
    fn validate_self_rejects_empty_archive_sources() {
        let op = Operation::new(
            OperationId::new("arc-1"),
            OperationKind::CreateArchive {
                path: PathBuf::from("a.tar.gz"),
                format: ArchiveFormat::TarGz,
                sources: vec![],
            },
        );
        assert!(op.validate_self().is_err());
    }

    #[test]
    fn validate_self_rejects_oversized_mode() {
        let op = Operation::new(
            OperationId::new("f-1"),
            OperationKind::CreateFile {
                path: PathBuf::from("a.txt"),
                content: vec![],
                mode: 0o10000,
            },
        );
        assert!(op.validate_self().is_err());
    }

    #[test]
    fn validate_self_accepts_well_formed_move() {
        let op = Operation::new(
            OperationId::new("m-1"),
            OperationKind::Move {
                src: PathBuf::from("a"),
                dst: PathBuf::from("b"),
            },
        );
        assert!(op.validate_self().is_ok());
    }
}
