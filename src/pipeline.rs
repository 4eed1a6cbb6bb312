// src/pipeline.rs

//! Pipeline (C7, ordered form): the resolved, run-ready shape of a batch's
//! operation list. Mirrors the teacher's split between a `TransactionPlan`
//! (the batch's raw intent) and the ordered work the engine actually walks
//! — here collapsed to one step since this engine has no on-disk plan to
//! persist between planning and execution.
//!
//! Two ways to build one: `Batch` populates a `Pipeline` with checksum
//! records already attached (`from_parts`), or a caller working against the
//! lower-level `Pipeline`/`Executor` API builds one operation at a time with
//! `new`/`add` and gets no checksum protection, since there was no add-time
//! read of any source to snapshot.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::checksum::ChecksumRecord;
use crate::op::{Operation, OperationId};
use crate::resolver;
use crate::Result;

/// An unresolved list of operations, ready to be validated, ordered, and
/// executed.
#[derive(Debug, Default)]
pub struct Pipeline {
    operations: Vec<Operation>,
    checksums: HashMap<OperationId, Vec<(PathBuf, ChecksumRecord)>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_operations(operations: Vec<Operation>) -> Self {
        Self {
            operations,
            checksums: HashMap::new(),
        }
    }

    /// Used by `Batch`, which already computed checksum snapshots at
    /// add-time and needs them carried through to the executor.
    pub fn from_parts(
        operations: Vec<Operation>,
        checksums: HashMap<OperationId, Vec<(PathBuf, ChecksumRecord)>>,
    ) -> Self {
        Self {
            operations,
            checksums,
        }
    }

    /// Append an operation built directly against the lower-level API.
    pub fn add(&mut self, op: Operation) -> &mut Self {
        self.operations.push(op);
        self
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Structural validation of every operation (§4.6 step 2). Does not
    /// touch the filesystem; live prerequisite checks happen per-operation,
    /// right before that operation's own turn to execute (step 5a), since
    /// earlier operations in the same run can make an as-yet-unsatisfied
    /// prerequisite true.
    pub fn validate(&self) -> Result<()> {
        for op in &self.operations {
            op.validate_self()?;
        }
        Ok(())
    }

    /// Resolve this pipeline into an execution-ordered operation list.
    /// When `resolve_prerequisites` is true, inferred edges (R1/R2) are
    /// computed before the topological sort; when false, only the
    /// operations' already-explicit `dependencies` are honored.
    pub fn resolve(self, resolve_prerequisites: bool) -> Result<Vec<Operation>> {
        resolver::resolve(self.operations, resolve_prerequisites)
    }

    /// Split into the raw operation list and the checksum records attached
    /// to them, consuming the pipeline. Used by `Executor::run`, which
    /// needs to resolve ordering itself (the checksum map is keyed by
    /// `OperationId`, so it survives reordering untouched).
    pub fn into_parts(self) -> (Vec<Operation>, HashMap<OperationId, Vec<(PathBuf, ChecksumRecord)>>) {
        (self.operations, self.checksums)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::OperationKind;
    use std::path::PathBuf;

    #[test]
    fn validate_rejects_structurally_bad_operation() {
        let mut pipeline = Pipeline::new();
        pipeline.add(Operation::new(
            OperationId::new("f-1"),
            OperationKind::CreateFile {
                path: PathBuf::new(),
                content: vec![],
                mode: 0o644,
            },
        ));
        assert!(pipeline.validate().is_err());
    }

    #[test]
    fn into_parts_preserves_checksums_keyed_by_id() {
        let op = Operation::new(
            OperationId::new("c-1"),
            OperationKind::Delete {
                path: PathBuf::from("a"),
            },
        );
        let mut checksums = HashMap::new();
        checksums.insert(
            OperationId::new("c-1"),
            vec![(
                PathBuf::from("a"),
                ChecksumRecord {
                    algorithm: crate::checksum::ChecksumAlgorithm::Sha256,
                    digest: "deadbeef".to_string(),
                    size: 0,
                    mtime: std::time::SystemTime::UNIX_EPOCH,
                },
            )],
        );
        let pipeline = Pipeline::from_parts(vec![op], checksums);
        let (ops, checksums) = pipeline.into_parts();
        assert_eq!(ops.len(), 1);
        assert!(checksums.contains_key(&OperationId::new("c-1")));
    }
}
