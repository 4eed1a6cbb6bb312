// src/checksum.rs

//! Checksum service (C3): snapshot-and-compare integrity checks for sources
//! read at add-time and re-read at execute-time.
//!
//! The algorithm is a plug-in boundary, same as the teacher's `HashAlgorithm`
//! (there: SHA-256 for security-critical verification, XXH128 for speed).
//! This crate only needs a cryptographic option and a fast option, so those
//! become SHA-256 and MD5 rather than SHA-256 and XXH128 — MD5 is "fast but
//! not secure," which is the same tradeoff slot XXH128 filled there, and
//! reaching for `md-5` keeps this off a niche, less-audited crate.

use std::fmt;
use std::path::Path;

use md5::{Digest as Md5Digest, Md5};
use serde::{Deserialize, Serialize};
use sha2::{Digest as Sha256Digest, Sha256};

use crate::fs::Filesystem;
use crate::Result;

/// Checksum algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChecksumAlgorithm {
    #[default]
    Sha256,
    Md5,
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumAlgorithm::Sha256 => write!(f, "sha256"),
            ChecksumAlgorithm::Md5 => write!(f, "md5"),
        }
    }
}

/// A checksum snapshot taken of a source path at add-time, compared again
/// at execute-time to detect tampering between the two.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumRecord {
    pub algorithm: ChecksumAlgorithm,
    pub digest: String,
    pub size: u64,
    pub mtime: std::time::SystemTime,
}

/// Compute a digest of `data` with the given algorithm.
pub fn digest_bytes(algorithm: ChecksumAlgorithm, data: &[u8]) -> String {
    match algorithm {
        ChecksumAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(data);
            format!("{:x}", hasher.finalize())
        }
        ChecksumAlgorithm::Md5 => {
            let mut hasher = Md5::new();
            hasher.update(data);
            format!("{:x}", hasher.finalize())
        }
    }
}

/// Snapshot a path's checksum, size, and mtime through the filesystem port.
/// Used at add-time to record what a source looked like, and again at
/// execute-time to detect whether it changed in between.
pub fn snapshot(fs: &dyn Filesystem, path: &Path, algorithm: ChecksumAlgorithm) -> Result<ChecksumRecord> {
    let content = fs.read(path)?;
    let meta = fs.stat(path)?;
    let digest = digest_bytes(algorithm, &content);
    Ok(ChecksumRecord {
        algorithm,
        digest,
        size: content.len() as u64,
        mtime: meta.map(|m| m.mtime).unwrap_or(std::time::SystemTime::UNIX_EPOCH),
    })
}

/// Compare a previously taken snapshot against the path's current state.
/// Returns `true` when they match (no tampering detected).
pub fn matches(fs: &dyn Filesystem, path: &Path, recorded: &ChecksumRecord) -> Result<bool> {
    let current = snapshot(fs, path, recorded.algorithm)?;
    Ok(current.digest == recorded.digest && current.size == recorded.size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFilesystem;
    use std::path::Path;

    #[test]
    fn snapshot_detects_no_change() {
        let fs = MemFilesystem::new();
        fs.write_file(Path::new("src.txt"), b"hello", 0o644).unwrap();
        let snap = snapshot(&fs, Path::new("src.txt"), ChecksumAlgorithm::Sha256).unwrap();
        assert!(matches(&fs, Path::new("src.txt"), &snap).unwrap());
    }

    #[test]
    fn snapshot_detects_tampering() {
        let fs = MemFilesystem::new();
        fs.write_file(Path::new("src.txt"), b"hello", 0o644).unwrap();
        let snap = snapshot(&fs, Path::new("src.txt"), ChecksumAlgorithm::Sha256).unwrap();
        fs.write_file(Path::new("src.txt"), b"tampered", 0o644).unwrap();
        assert!(!matches(&fs, Path::new("src.txt"), &snap).unwrap());
    }

    #[test]
    fn md5_and_sha256_digests_differ() {
        let sha = digest_bytes(ChecksumAlgorithm::Sha256, b"data");
        let md5 = digest_bytes(ChecksumAlgorithm::Md5, b"data");
        assert_ne!(sha, md5);
    }
}
