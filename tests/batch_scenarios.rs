// tests/batch_scenarios.rs

//! End-to-end batch scenarios run against both the in-memory and real-disk
//! filesystem implementations, covering the seed scenarios a correct
//! implementation of this engine must get right: auto-parented nested
//! creates, add-time conflict rejection, reader-before-deleter ordering,
//! tamper detection, restorable rollback, and cycle detection.

use std::path::Path;
use std::sync::Arc;

use fsbatch::{Batch, Error, Filesystem, IdStrategy, MemFilesystem, OsFilesystem, Operation, OperationId, OperationKind, Pipeline};
use tempfile::TempDir;

fn mem_batch() -> Batch {
    Batch::with_id_strategy(Arc::new(MemFilesystem::new()), IdStrategy::Sequence)
}

#[test]
fn nested_create_auto_inserts_missing_parent_directories() {
    let fs: Arc<dyn Filesystem> = Arc::new(MemFilesystem::new());
    let mut batch = Batch::with_id_strategy(fs.clone(), IdStrategy::Sequence);
    batch.create_file("a/b/c.txt", b"hello".to_vec(), None).unwrap();

    let result = batch.run().unwrap();
    assert!(result.success);
    assert!(fs.stat(Path::new("a")).unwrap().unwrap().is_dir());
    assert!(fs.stat(Path::new("a/b")).unwrap().unwrap().is_dir());
    assert_eq!(fs.read(Path::new("a/b/c.txt")).unwrap(), b"hello");
}

#[test]
fn duplicate_path_is_rejected_at_add_time_not_run_time() {
    let mut batch = mem_batch();
    batch.create_file("same.txt", b"1".to_vec(), None).unwrap();
    let err = batch.create_file("same.txt", b"2".to_vec(), None).unwrap_err();
    assert!(matches!(err, Error::ProjectedStateConflict { .. }));
}

#[test]
fn copy_of_a_source_orders_before_its_own_delete() {
    let fs: Arc<dyn Filesystem> = Arc::new(MemFilesystem::new());
    fs.write_file(Path::new("src.txt"), b"keep me", 0o644).unwrap();

    let mut batch = Batch::with_id_strategy(fs.clone(), IdStrategy::Sequence);
    batch.delete("src.txt").unwrap();
    batch.copy("src.txt", "dst.txt").unwrap();

    let result = batch.run().unwrap();
    assert!(result.success);
    assert_eq!(fs.read(Path::new("dst.txt")).unwrap(), b"keep me");
    assert!(fs.stat(Path::new("src.txt")).unwrap().is_none());
}

#[test]
fn tampered_source_fails_the_copy_with_a_checksum_mismatch() {
    let fs: Arc<dyn Filesystem> = Arc::new(MemFilesystem::new());
    fs.write_file(Path::new("src.txt"), b"original", 0o644).unwrap();

    let mut batch = Batch::with_id_strategy(fs.clone(), IdStrategy::Sequence);
    batch.copy("src.txt", "dst.txt").unwrap();

    fs.write_file(Path::new("src.txt"), b"tampered after add", 0o644).unwrap();

    let result = batch.run().unwrap();
    assert!(!result.success);
    assert!(fs.stat(Path::new("dst.txt")).unwrap().is_none());
    assert!(result
        .errors
        .iter()
        .any(|e| format!("{e}").contains("checksum mismatch")));
}

#[test]
fn restorable_run_can_be_manually_unwound_afterward() {
    let fs: Arc<dyn Filesystem> = Arc::new(MemFilesystem::new());
    fs.write_file(Path::new("untouched.txt"), b"original owner data", 0o644).unwrap();

    let mut batch = Batch::with_id_strategy(fs.clone(), IdStrategy::Sequence);
    batch.create_file("new_one.txt", b"fresh".to_vec(), None).unwrap();
    batch.create_directory("new_dir", None).unwrap();

    let result = batch.run_restorable().unwrap();
    assert!(result.success);
    assert!(fs.stat(Path::new("new_one.txt")).unwrap().is_some());

    result.rollback(fs.as_ref()).unwrap();
    assert!(fs.stat(Path::new("new_one.txt")).unwrap().is_none());
    assert!(fs.stat(Path::new("new_dir")).unwrap().is_none());
    assert_eq!(fs.read(Path::new("untouched.txt")).unwrap(), b"original owner data");
}

#[test]
fn manually_constructed_cycle_is_rejected_by_the_resolver() {
    let a = Operation::new(
        OperationId::new("a"),
        OperationKind::Delete { path: "a".into() },
    )
    .with_dependency(OperationId::new("b"));
    let b = Operation::new(
        OperationId::new("b"),
        OperationKind::Delete { path: "b".into() },
    )
    .with_dependency(OperationId::new("a"));

    let mut pipeline = Pipeline::new();
    pipeline.add(a);
    pipeline.add(b);

    let err = pipeline.resolve(true).unwrap_err();
    assert!(matches!(err, Error::CycleError { .. }));
}

#[test]
fn os_filesystem_batch_writes_to_real_disk() {
    let dir = TempDir::new().unwrap();
    let fs: Arc<dyn Filesystem> = Arc::new(OsFilesystem::new(dir.path()));
    let mut batch = Batch::with_id_strategy(fs.clone(), IdStrategy::Sequence);
    batch.create_file("nested/out.txt", b"disk content".to_vec(), None).unwrap();

    let result = batch.run().unwrap();
    assert!(result.success);
    assert_eq!(
        std::fs::read(dir.path().join("nested/out.txt")).unwrap(),
        b"disk content"
    );
}
