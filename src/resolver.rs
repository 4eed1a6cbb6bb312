// src/resolver.rs

//! Prerequisite & dependency resolver (C5): auto-parent-directory
//! insertion, inferred ordering edges, and topological sort with cycle
//! detection. The deepest single component in the engine (§2 gives it the
//! largest budget share of any module), grounded on the teacher's
//! `TransactionPlanner::ensure_directory_path` (parent-first directory walk)
//! generalized from "paths a package installs" to "paths any operation in
//! this batch touches."

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::fs::Filesystem;
use crate::id::IdGenerator;
use crate::op::{Operation, OperationId, OperationKind};
use crate::{Error, Result};

/// Walk from `path` up to (but not including) the root, returning missing
/// ancestor directories in parent-first order. A directory counts as
/// "missing" if it's neither live on `fs` nor already present in
/// `known_dirs` (directories this batch has already scheduled).
pub fn missing_parent_dirs(
    fs: &dyn Filesystem,
    path: &Path,
    known_dirs: &HashSet<PathBuf>,
) -> Result<Vec<PathBuf>> {
    let mut to_create = Vec::new();
    let mut current = path.parent();

    while let Some(dir) = current {
        if dir.as_os_str().is_empty() {
            break;
        }
        let live = fs.stat(dir)?.map(|m| m.is_dir()).unwrap_or(false);
        if !live && !known_dirs.contains(dir) {
            to_create.push(dir.to_path_buf());
        }
        current = dir.parent();
    }

    to_create.reverse();
    Ok(to_create)
}

/// Build an implicit `create_directory` operation for an auto-inserted
/// parent directory.
pub fn auto_mkdir(ids: &IdGenerator, path: &Path) -> Operation {
    let id = ids.next("create_directory", path);
    Operation::new(
        id,
        OperationKind::CreateDirectory {
            path: path.to_path_buf(),
            mode: crate::op::DEFAULT_DIR_MODE,
        },
    )
}

/// Inferred-edge indices built by scanning a finished operation list (§4.3
/// rules R1/R2).
struct PathIndex {
    readers: HashMap<PathBuf, Vec<OperationId>>,
    creators: HashMap<PathBuf, Vec<OperationId>>,
    deleters: HashMap<PathBuf, Vec<OperationId>>,
    symlink_targets: HashMap<PathBuf, Vec<OperationId>>,
}

impl PathIndex {
    fn build(operations: &[Operation]) -> Self {
        let mut readers: HashMap<PathBuf, Vec<OperationId>> = HashMap::new();
        let mut creators: HashMap<PathBuf, Vec<OperationId>> = HashMap::new();
        let mut deleters: HashMap<PathBuf, Vec<OperationId>> = HashMap::new();
        let mut symlink_targets: HashMap<PathBuf, Vec<OperationId>> = HashMap::new();

        for op in operations {
            for path in op.kind.read_paths() {
                readers.entry(path).or_default().push(op.id.clone());
            }
            for path in op.kind.created_paths() {
                creators.entry(path).or_default().push(op.id.clone());
            }
            if let OperationKind::Delete { path } = &op.kind {
                deleters.entry(path.clone()).or_default().push(op.id.clone());
            }
            if let OperationKind::Move { src, .. } = &op.kind {
                deleters.entry(src.clone()).or_default().push(op.id.clone());
            }
            if let OperationKind::CreateSymlink { target, .. } = &op.kind {
                symlink_targets
                    .entry(target.clone())
                    .or_default()
                    .push(op.id.clone());
            }
        }

        Self {
            readers,
            creators,
            deleters,
            symlink_targets,
        }
    }
}

/// Add inferred dependency edges (R1: reader-before-deleter, R2:
/// creator-before-symlink-target) to a finished operation list, in place.
/// Duplicate edges are skipped (`Operation::with_dependency` dedupes).
pub fn add_inferred_edges(operations: &mut [Operation]) {
    let index = PathIndex::build(operations);
    let mut extra: HashMap<OperationId, Vec<OperationId>> = HashMap::new();

    // R1: every reader of P precedes every mover/deleter of P.
    for (path, readers) in &index.readers {
        if let Some(deleters) = index.deleters.get(path) {
            for deleter in deleters {
                for reader in readers {
                    if reader != deleter {
                        extra.entry(deleter.clone()).or_default().push(reader.clone());
                    }
                }
            }
        }
    }

    // R2: every creator of P precedes every symlink targeting P.
    for (path, symlinks) in &index.symlink_targets {
        if let Some(creators) = index.creators.get(path) {
            for symlink in symlinks {
                for creator in creators {
                    if creator != symlink {
                        extra.entry(symlink.clone()).or_default().push(creator.clone());
                    }
                }
            }
        }
    }

    for op in operations.iter_mut() {
        if let Some(deps) = extra.remove(&op.id) {
            for dep in deps {
                if !op.dependencies.contains(&dep) {
                    op.dependencies.push(dep);
                }
            }
        }
    }
}

/// Resolve a finished operation list into execution order: optionally add
/// inferred edges (R1/R2), then topologically sort. The single entry point
/// both `Pipeline::resolve` and the executor use, so "resolve" means the
/// same thing everywhere in the crate.
pub fn resolve(mut operations: Vec<Operation>, resolve_prerequisites: bool) -> Result<Vec<Operation>> {
    if resolve_prerequisites {
        add_inferred_edges(&mut operations);
    }
    topological_sort(operations)
}

/// Topologically sort `operations` by their `dependencies` edges. Ties
/// (operations with no incident edges relative to each other) preserve
/// insertion order — a stable Kahn's-algorithm sort, not an arbitrary DFS
/// order, so reruns of the same batch always produce the same plan.
pub fn topological_sort(operations: Vec<Operation>) -> Result<Vec<Operation>> {
    let index_of: HashMap<OperationId, usize> = operations
        .iter()
        .enumerate()
        .map(|(i, op)| (op.id.clone(), i))
        .collect();

    for op in &operations {
        for dep in &op.dependencies {
            if !index_of.contains_key(dep) {
                return Err(Error::DependencyError {
                    id: op.id.clone(),
                    depends_on: dep.clone(),
                });
            }
        }
    }

    let n = operations.len();
    let mut in_degree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, op) in operations.iter().enumerate() {
        for dep in &op.dependencies {
            let dep_idx = index_of[dep];
            dependents[dep_idx].push(i);
            in_degree[i] += 1;
        }
    }

    let mut ready: std::collections::VecDeque<usize> =
        (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    let mut visited = vec![false; n];

    while let Some(i) = ready.pop_front() {
        order.push(i);
        visited[i] = true;
        for &dependent in &dependents[i] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push_back(dependent);
            }
        }
    }

    if order.len() != n {
        let cycle: Vec<OperationId> = (0..n)
            .filter(|&i| !visited[i])
            .map(|i| operations[i].id.clone())
            .collect();
        return Err(Error::CycleError { cycle });
    }

    let mut by_index: Vec<Option<Operation>> = operations.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .map(|i| by_index[i].take().expect("each index visited once"))
        .collect())
}
