// src/fs/os.rs

//! Real-disk `Filesystem` implementation, rooted at a directory.
//!
//! Every path is passed through `safe_join` before it touches `std::fs`, so
//! a caller-supplied `..` or absolute path can never escape the configured
//! root. `rename` falls back to copy+fsync+delete on `EXDEV`, the same
//! cross-filesystem case the teacher's transaction engine handles when a
//! backup or stage directory lives on a different mount than the target.

use std::fs::{self, File};
use std::io;
use std::os::unix::fs::{symlink as unix_symlink, PermissionsExt};
use std::path::{Path, PathBuf};

use crate::{Error, Result};

use super::path::safe_join;
use super::{FileKind, Filesystem, Metadata};

/// Filesystem operations rooted at `root`. `root` itself is never created
/// or removed by this type; callers are expected to have it exist already.
#[derive(Debug, Clone)]
pub struct OsFilesystem {
    root: PathBuf,
}

impl OsFilesystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> Result<PathBuf> {
        safe_join(&self.root, path)
    }
}

fn io_err(id_context: &str, err: io::Error) -> Error {
    Error::Io(io::Error::new(
        err.kind(),
        format!("{id_context}: {err}"),
    ))
}

/// Move `src` to `dst`, falling back to copy+fsync+delete when they live on
/// different filesystems (`rename(2)` returns `EXDEV`).
fn move_file_atomic(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
            fs::copy(src, dst)?;

            let file = File::open(dst)?;
            file.sync_all()?;
            drop(file);

            if let Some(parent) = dst.parent() {
                if let Ok(dir) = File::open(parent) {
                    let _ = dir.sync_all();
                }
            }

            fs::remove_file(src)?;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

impl Filesystem for OsFilesystem {
    fn stat(&self, path: &Path) -> Result<Option<Metadata>> {
        let full = self.resolve(path)?;
        let meta = match fs::symlink_metadata(&full) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err("stat", e)),
        };
        let kind = if meta.file_type().is_symlink() {
            FileKind::Symlink
        } else if meta.is_dir() {
            FileKind::Directory
        } else {
            FileKind::File
        };
        Ok(Some(Metadata {
            kind,
            mode: meta.permissions().mode() & 0o7777,
            size: meta.len(),
            mtime: meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH),
        }))
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;
        fs::read(&full).map_err(|e| io_err(&format!("read {}", path.display()), e))
    }

    fn write_file(&self, path: &Path, content: &[u8], mode: u32) -> Result<()> {
        let full = self.resolve(path)?;
        fs::write(&full, content).map_err(|e| io_err(&format!("write {}", path.display()), e))?;
        fs::set_permissions(&full, fs::Permissions::from_mode(mode))
            .map_err(|e| io_err(&format!("chmod {}", path.display()), e))
    }

    fn mkdir_all(&self, path: &Path, mode: u32) -> Result<()> {
        let full = self.resolve(path)?;
        fs::create_dir_all(&full).map_err(|e| io_err(&format!("mkdir {}", path.display()), e))?;
        fs::set_permissions(&full, fs::Permissions::from_mode(mode))
            .map_err(|e| io_err(&format!("chmod {}", path.display()), e))
    }

    fn remove(&self, path: &Path) -> Result<()> {
        let full = self.resolve(path)?;
        let meta = fs::symlink_metadata(&full).map_err(|e| io_err(&format!("remove {}", path.display()), e))?;
        if meta.file_type().is_symlink() || meta.is_file() {
            fs::remove_file(&full).map_err(|e| io_err(&format!("remove {}", path.display()), e))
        } else {
            fs::remove_dir(&full).map_err(|e| io_err(&format!("remove {}", path.display()), e))
        }
    }

    fn remove_all(&self, path: &Path) -> Result<()> {
        let full = self.resolve(path)?;
        match fs::symlink_metadata(&full) {
            Ok(meta) if meta.is_dir() && !meta.file_type().is_symlink() => fs::remove_dir_all(&full)
                .map_err(|e| io_err(&format!("remove_all {}", path.display()), e)),
            Ok(_) => fs::remove_file(&full).map_err(|e| io_err(&format!("remove_all {}", path.display()), e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&format!("remove_all {}", path.display()), e)),
        }
    }

    fn rename(&self, src: &Path, dst: &Path) -> Result<()> {
        let full_src = self.resolve(src)?;
        let full_dst = self.resolve(dst)?;
        move_file_atomic(&full_src, &full_dst)
            .map_err(|e| io_err(&format!("move {} -> {}", src.display(), dst.display()), e))
    }

    fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        let full_link = self.resolve(link)?;
        unix_symlink(target, &full_link)
            .map_err(|e| io_err(&format!("symlink {}", link.display()), e))
    }

    fn readlink(&self, path: &Path) -> Result<PathBuf> {
        let full = self.resolve(path)?;
        fs::read_link(&full).map_err(|e| io_err(&format!("readlink {}", path.display()), e))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<String>> {
        let full = self.resolve(path)?;
        let mut names = Vec::new();
        for entry in fs::read_dir(&full).map_err(|e| io_err(&format!("read_dir {}", path.display()), e))? {
            let entry = entry.map_err(|e| io_err(&format!("read_dir {}", path.display()), e))?;
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn rooted() -> (TempDir, OsFilesystem) {
        let dir = TempDir::new().unwrap();
        let fs = OsFilesystem::new(dir.path());
        (dir, fs)
    }

    #[test]
    fn write_read_roundtrip() {
        let (_dir, fs) = rooted();
        fs.write_file(Path::new("a.txt"), b"hello", 0o644).unwrap();
        assert_eq!(fs.read(Path::new("a.txt")).unwrap(), b"hello");
        let meta = fs.stat(Path::new("a.txt")).unwrap().unwrap();
        assert!(meta.is_file());
        assert_eq!(meta.mode, 0o644);
    }

    #[test]
    fn mkdir_all_then_remove_all() {
        let (_dir, fs) = rooted();
        fs.mkdir_all(Path::new("a/b/c"), 0o755).unwrap();
        fs.write_file(Path::new("a/b/c/f"), b"x", 0o644).unwrap();
        fs.remove_all(Path::new("a")).unwrap();
        assert!(fs.stat(Path::new("a")).unwrap().is_none());
    }

    #[test]
    fn escape_attempt_is_rejected() {
        let (_dir, fs) = rooted();
        assert!(fs.write_file(Path::new("../escape.txt"), b"x", 0o644).is_err());
    }

    #[test]
    fn symlink_roundtrip() {
        let (_dir, fs) = rooted();
        fs.write_file(Path::new("target.txt"), b"x", 0o644).unwrap();
        fs.symlink(Path::new("target.txt"), Path::new("link.txt")).unwrap();
        assert_eq!(fs.readlink(Path::new("link.txt")).unwrap(), PathBuf::from("target.txt"));
        let meta = fs.stat(Path::new("link.txt")).unwrap().unwrap();
        assert!(meta.is_symlink());
    }

    #[test]
    fn rename_within_same_filesystem() {
        let (_dir, fs) = rooted();
        fs.write_file(Path::new("a.txt"), b"x", 0o644).unwrap();
        fs.rename(Path::new("a.txt"), Path::new("b.txt")).unwrap();
        assert!(fs.stat(Path::new("a.txt")).unwrap().is_none());
        assert_eq!(fs.read(Path::new("b.txt")).unwrap(), b"x");
    }
}
