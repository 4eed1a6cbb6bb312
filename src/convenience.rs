// src/convenience.rs

//! One-shot helpers (§6 "Simple one-shots"): a single mutation wrapped in a
//! throwaway `Batch` and run immediately, for callers who don't need
//! multi-operation ordering or rollback. Grounded on the teacher's
//! `Transaction::single_file_update`-style shortcuts, which build a
//! one-operation transaction rather than exposing a separate direct-write
//! code path.

use std::path::Path;
use std::sync::Arc;

use crate::batch::Batch;
use crate::executor::RunResult;
use crate::fs::Filesystem;
use crate::Result;

/// Turn a finished `RunResult` into a `Result<()>`, surfacing the first
/// recorded error when the run didn't fully succeed.
fn into_result(result: RunResult) -> Result<()> {
    if result.success {
        Ok(())
    } else {
        Err(result.errors.into_iter().next().expect("failed run records at least one error"))
    }
}

/// Write `content` to `path` in a single operation, auto-inserting any
/// missing parent directories.
pub fn write_file(fs: Arc<dyn Filesystem>, path: impl AsRef<Path>, content: impl Into<Vec<u8>>, mode: Option<u32>) -> Result<()> {
    let mut batch = Batch::new(fs);
    batch.create_file(path.as_ref().to_path_buf(), content.into(), mode)?;
    into_result(batch.run()?)
}

/// Create `path` and any missing ancestor directories in a single operation.
pub fn mkdir_all(fs: Arc<dyn Filesystem>, path: impl AsRef<Path>, mode: Option<u32>) -> Result<()> {
    let mut batch = Batch::new(fs);
    batch.create_directory(path.as_ref().to_path_buf(), mode)?;
    into_result(batch.run()?)
}

/// Delete `path` (file, directory, or symlink) in a single operation.
pub fn remove(fs: Arc<dyn Filesystem>, path: impl AsRef<Path>) -> Result<()> {
    let mut batch = Batch::new(fs);
    batch.delete(path.as_ref().to_path_buf())?;
    into_result(batch.run()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFilesystem;

    #[test]
    fn write_file_creates_parents_and_content() {
        let fs: Arc<dyn Filesystem> = Arc::new(MemFilesystem::new());
        write_file(fs.clone(), "a/b/c.txt", b"hi".to_vec(), None).unwrap();
        assert_eq!(fs.read(Path::new("a/b/c.txt")).unwrap(), b"hi");
    }

    #[test]
    fn mkdir_all_creates_nested_directories() {
        let fs: Arc<dyn Filesystem> = Arc::new(MemFilesystem::new());
        mkdir_all(fs.clone(), "x/y/z", None).unwrap();
        assert!(fs.stat(Path::new("x/y/z")).unwrap().unwrap().is_dir());
    }

    #[test]
    fn remove_deletes_an_existing_file() {
        let fs: Arc<dyn Filesystem> = Arc::new(MemFilesystem::new());
        fs.write_file(Path::new("f"), b"data", 0o644).unwrap();
        remove(fs.clone(), "f").unwrap();
        assert!(fs.stat(Path::new("f")).unwrap().is_none());
    }
}
