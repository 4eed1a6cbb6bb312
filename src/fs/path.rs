// src/fs/path.rs

//! Path sanitization utilities for the filesystem port.
//!
//! Every path the engine accepts from a caller is untrusted in the same
//! sense a package's file list is untrusted in a package manager: it must
//! not be able to escape the filesystem's configured root via `..`
//! components or an absolute path pointing elsewhere.

use std::path::{Component, Path, PathBuf};

use crate::{Error, Result};

/// Sanitize a path from a caller.
///
/// - Rejects paths containing `..` (parent directory) components.
/// - Skips `.` (current directory) components.
/// - Strips leading slashes, making the path relative to a filesystem root.
/// - Rejects empty paths.
pub fn sanitize_path(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let path_str = path.to_string_lossy();
    let relative = path_str.trim_start_matches('/');

    let mut normalized = PathBuf::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(Error::PathTraversal(path_str.to_string()));
            }
            Component::Prefix(_) | Component::RootDir => {}
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(Error::InvalidPath(
            "empty path after sanitization".to_string(),
        ));
    }

    Ok(normalized)
}

/// Safely join a root path with a caller-supplied path, rejecting any
/// attempt to escape the root.
pub fn safe_join(root: impl AsRef<Path>, path: impl AsRef<Path>) -> Result<PathBuf> {
    let root = root.as_ref();
    let sanitized = sanitize_path(path.as_ref())?;
    Ok(root.join(sanitized))
}

/// Resolve a symlink target relative to the directory containing the link,
/// rejecting targets that would escape the filesystem root. Absolute
/// targets are interpreted as root-relative (consistent with `sanitize_path`
/// stripping a leading `/`), never as real OS-absolute paths, so a
/// `MemFilesystem` and an `OsFilesystem` agree on symlink semantics.
pub fn resolve_symlink_target(link: &Path, target: &Path) -> Result<PathBuf> {
    let target_str = target.to_string_lossy();
    if target_str.starts_with('/') {
        return sanitize_path(target);
    }

    let link_dir = link.parent().unwrap_or_else(|| Path::new(""));
    let joined = link_dir.join(target);
    normalize_relative(&joined)
}

/// Normalize a relative path, collapsing `.`/`..` components without
/// touching the filesystem, rejecting any path that would climb above the
/// root it is relative to.
fn normalize_relative(path: &Path) -> Result<PathBuf> {
    let mut stack: Vec<&std::ffi::OsStr> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(c) => stack.push(c),
            Component::CurDir => {}
            Component::ParentDir => {
                if stack.pop().is_none() {
                    return Err(Error::PathTraversal(format!(
                        "symlink target escapes root: {}",
                        path.display()
                    )));
                }
            }
            Component::Prefix(_) | Component::RootDir => {}
        }
    }
    Ok(stack.into_iter().collect())
}

/// Sanitize a single path component (e.g. for custom operation names),
/// rejecting path separators and traversal markers.
pub fn sanitize_filename(name: &str) -> Result<String> {
    if name.contains('/') || name.contains('\\') {
        return Err(Error::PathTraversal(format!(
            "filename contains path separator: {name}"
        )));
    }
    if name == ".." || name == "." {
        return Err(Error::PathTraversal(format!("invalid filename: {name}")));
    }
    if name.is_empty() {
        return Err(Error::InvalidPath("empty filename".to_string()));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_path_strips_leading_slashes() {
        assert_eq!(
            sanitize_path("/usr/bin/foo").unwrap(),
            PathBuf::from("usr/bin/foo")
        );
    }

    #[test]
    fn sanitize_path_rejects_traversal() {
        assert!(sanitize_path("../etc/passwd").is_err());
        assert!(sanitize_path("usr/../../../etc/passwd").is_err());
    }

    #[test]
    fn sanitize_path_rejects_empty() {
        assert!(sanitize_path("").is_err());
        assert!(sanitize_path("///").is_err());
    }

    #[test]
    fn safe_join_rejects_escape() {
        let root = PathBuf::from("/tmp/test");
        assert!(safe_join(&root, "../etc/passwd").is_err());
        assert_eq!(
            safe_join(&root, "a/b").unwrap(),
            PathBuf::from("/tmp/test/a/b")
        );
    }

    #[test]
    fn resolve_symlink_target_relative_to_link_dir() {
        let link = Path::new("usr/bin/cc");
        let target = Path::new("gcc");
        assert_eq!(
            resolve_symlink_target(link, target).unwrap(),
            PathBuf::from("usr/bin/gcc")
        );
    }

    #[test]
    fn resolve_symlink_target_rejects_root_escape() {
        let link = Path::new("a/b");
        let target = Path::new("../../etc/passwd");
        assert!(resolve_symlink_target(link, target).is_err());
    }

    #[test]
    fn resolve_symlink_target_allows_in_root_traversal() {
        let link = Path::new("a/b/c");
        let target = Path::new("../d");
        assert_eq!(
            resolve_symlink_target(link, target).unwrap(),
            PathBuf::from("a/d")
        );
    }
}
