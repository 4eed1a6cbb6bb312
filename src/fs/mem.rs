// src/fs/mem.rs

//! In-memory filesystem for tests.
//!
//! A simplified, non-arena reimagining of the teacher's `VfsTree`: a plain
//! `HashMap<PathBuf, Node>` behind a mutex is enough at batch-test scale,
//! and it sidesteps `VfsTree`'s arena/`NodeId` indirection, which exists
//! there to support O(1) bulk lookups across a whole installed package
//! database — a concern this crate's own test suite doesn't have.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use crate::{Error, Result};

use super::path::sanitize_path;
use super::{FileKind, Filesystem, Metadata};

#[derive(Debug, Clone)]
enum Node {
    File {
        content: Vec<u8>,
        mode: u32,
        mtime: SystemTime,
    },
    Directory {
        mode: u32,
    },
    Symlink {
        target: PathBuf,
        mtime: SystemTime,
    },
}

/// An in-memory filesystem rooted at an implicit empty path. Every method
/// sanitizes its input the same way `OsFilesystem` does, so traversal
/// rejections and root-relative semantics match between the two
/// implementations.
#[derive(Debug, Default)]
pub struct MemFilesystem {
    nodes: Mutex<HashMap<PathBuf, Node>>,
}

impl MemFilesystem {
    pub fn new() -> Self {
        Self {
            nodes: Mutex::new(HashMap::new()),
        }
    }

    fn is_root(path: &Path) -> bool {
        path.as_os_str().is_empty()
    }

    fn parent_exists_as_dir(&self, path: &Path) -> bool {
        match path.parent() {
            None => true,
            Some(parent) if Self::is_root(parent) => true,
            Some(parent) => matches!(
                self.nodes.lock().unwrap().get(parent),
                Some(Node::Directory { .. })
            ),
        }
    }
}

impl Filesystem for MemFilesystem {
    fn stat(&self, path: &Path) -> Result<Option<Metadata>> {
        let path = sanitize_path(path)?;
        if Self::is_root(&path) {
            return Ok(Some(Metadata {
                kind: FileKind::Directory,
                mode: 0o755,
                size: 0,
                mtime: SystemTime::UNIX_EPOCH,
            }));
        }
        let nodes = self.nodes.lock().unwrap();
        Ok(nodes.get(&path).map(|node| match node {
            Node::File {
                content,
                mode,
                mtime,
            } => Metadata {
                kind: FileKind::File,
                mode: *mode,
                size: content.len() as u64,
                mtime: *mtime,
            },
            Node::Directory { mode } => Metadata {
                kind: FileKind::Directory,
                mode: *mode,
                size: 0,
                mtime: SystemTime::UNIX_EPOCH,
            },
            Node::Symlink { target, mtime } => Metadata {
                kind: FileKind::Symlink,
                mode: 0o777,
                size: target.as_os_str().len() as u64,
                mtime: *mtime,
            },
        }))
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = sanitize_path(path)?;
        let nodes = self.nodes.lock().unwrap();
        match nodes.get(&path) {
            Some(Node::File { content, .. }) => Ok(content.clone()),
            Some(Node::Directory { .. }) => Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("{} is a directory", path.display()),
            ))),
            _ => Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                path.display().to_string(),
            ))),
        }
    }

    fn write_file(&self, path: &Path, content: &[u8], mode: u32) -> Result<()> {
        let path = sanitize_path(path)?;
        if !self.parent_exists_as_dir(&path) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("parent directory of {} does not exist", path.display()),
            )));
        }
        let mut nodes = self.nodes.lock().unwrap();
        if matches!(nodes.get(&path), Some(Node::Directory { .. })) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("{} is a directory", path.display()),
            )));
        }
        nodes.insert(
            path,
            Node::File {
                content: content.to_vec(),
                mode,
                mtime: SystemTime::now(),
            },
        );
        Ok(())
    }

    fn mkdir_all(&self, path: &Path, mode: u32) -> Result<()> {
        let path = sanitize_path(path)?;
        if Self::is_root(&path) {
            return Ok(());
        }
        let mut nodes = self.nodes.lock().unwrap();
        let mut current = PathBuf::new();
        for component in path.components() {
            current.push(component);
            match nodes.get(&current) {
                Some(Node::Directory { .. }) => continue,
                Some(_) => {
                    return Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        format!("{} exists and is not a directory", current.display()),
                    )));
                }
                None => {
                    nodes.insert(current.clone(), Node::Directory { mode });
                }
            }
        }
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<()> {
        let path = sanitize_path(path)?;
        let mut nodes = self.nodes.lock().unwrap();
        match nodes.get(&path) {
            None => Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                path.display().to_string(),
            ))),
            Some(Node::Directory { .. }) => {
                let has_children = nodes.keys().any(|p| p.parent() == Some(path.as_path()));
                if has_children {
                    return Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        format!("{} is not empty", path.display()),
                    )));
                }
                nodes.remove(&path);
                Ok(())
            }
            Some(_) => {
                nodes.remove(&path);
                Ok(())
            }
        }
    }

    fn remove_all(&self, path: &Path) -> Result<()> {
        let path = sanitize_path(path)?;
        let mut nodes = self.nodes.lock().unwrap();
        nodes.retain(|p, _| p != &path && !p.starts_with(&path));
        Ok(())
    }

    fn rename(&self, src: &Path, dst: &Path) -> Result<()> {
        let src = sanitize_path(src)?;
        let dst = sanitize_path(dst)?;
        if !self.parent_exists_as_dir(&dst) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("parent directory of {} does not exist", dst.display()),
            )));
        }
        let mut nodes = self.nodes.lock().unwrap();
        let moved: Vec<(PathBuf, Node)> = nodes
            .iter()
            .filter(|(p, _)| *p == &src || p.starts_with(&src))
            .map(|(p, n)| (p.clone(), n.clone()))
            .collect();
        if moved.is_empty() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                src.display().to_string(),
            )));
        }
        for (p, _) in &moved {
            nodes.remove(p);
        }
        for (p, node) in moved {
            let rebased = if p == src {
                dst.clone()
            } else {
                dst.join(p.strip_prefix(&src).unwrap())
            };
            nodes.insert(rebased, node);
        }
        Ok(())
    }

    fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        let link = sanitize_path(link)?;
        if !self.parent_exists_as_dir(&link) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("parent directory of {} does not exist", link.display()),
            )));
        }
        let mut nodes = self.nodes.lock().unwrap();
        if nodes.contains_key(&link) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                link.display().to_string(),
            )));
        }
        nodes.insert(
            link,
            Node::Symlink {
                target: target.to_path_buf(),
                mtime: SystemTime::now(),
            },
        );
        Ok(())
    }

    fn readlink(&self, path: &Path) -> Result<PathBuf> {
        let path = sanitize_path(path)?;
        let nodes = self.nodes.lock().unwrap();
        match nodes.get(&path) {
            Some(Node::Symlink { target, .. }) => Ok(target.clone()),
            _ => Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a symlink", path.display()),
            ))),
        }
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<String>> {
        let path = sanitize_path(path)?;
        let nodes = self.nodes.lock().unwrap();
        let mut names: Vec<String> = nodes
            .keys()
            .filter(|p| p.parent() == Some(path.as_path()))
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .collect();
        names.sort();
        Ok(names)
    }
}
