// src/id.rs

//! Operation identity and the generator strategies that mint it.
//!
//! Every operation carries a stable, opaque `OperationId`. Ops never hold
//! references to other ops directly — only id pairs — so the tracker and
//! resolver can work on plain string-keyed tables without an ownership-cycle
//! problem to manage (see the design notes on cyclic object graphs).

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use uuid::Uuid;

/// Opaque, unique-within-a-batch operation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(String);

impl OperationId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for OperationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Strategy used to mint `OperationId`s for a batch.
///
/// Kept as an explicit constructor parameter rather than a process-wide
/// singleton, per the design notes on global mutable state — this lets
/// tests inject a deterministic sequence generator instead of real UUIDs
/// or wall-clock timestamps.
#[derive(Debug, Clone, Copy, Default)]
pub enum IdStrategy {
    /// `{type}-{path-derived-tag}-{unix-nanos}`. Default strategy; human
    /// readable and collision-resistant across a single process run.
    #[default]
    HashTypePathTime,
    /// A monotonic, zero-padded sequence number. Fully deterministic —
    /// useful for golden-output tests.
    Sequence,
    /// `{type}-{unix-nanos}`, no path component.
    Timestamp,
}

/// Mints `OperationId`s according to an `IdStrategy`.
///
/// Owned by a `Batch`/`Pipeline`, not shared process-wide state.
#[derive(Debug)]
pub struct IdGenerator {
    strategy: IdStrategy,
    sequence: AtomicU64,
}

impl IdGenerator {
    pub fn new(strategy: IdStrategy) -> Self {
        Self {
            strategy,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn next(&self, op_type: &str, path: &Path) -> OperationId {
        match self.strategy {
            IdStrategy::HashTypePathTime => {
                let tag = path
                    .to_string_lossy()
                    .chars()
                    .filter(|c| c.is_alphanumeric())
                    .take(24)
                    .collect::<String>();
                let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
                let disambiguator = Uuid::new_v4().simple().to_string();
                OperationId::new(format!(
                    "{op_type}-{tag}-{nanos}-{}",
                    &disambiguator[..8]
                ))
            }
            IdStrategy::Sequence => {
                let n = self.sequence.fetch_add(1, Ordering::Relaxed);
                OperationId::new(format!("{op_type}-{n:08}"))
            }
            IdStrategy::Timestamp => {
                let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
                OperationId::new(format!("{op_type}-{nanos}"))
            }
        }
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new(IdStrategy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_strategy_is_deterministic_and_unique() {
        let gen = IdGenerator::new(IdStrategy::Sequence);
        let a = gen.next("create_file", Path::new("a"));
        let b = gen.next("create_file", Path::new("b"));
        assert_eq!(a.as_str(), "create_file-00000000");
        assert_eq!(b.as_str(), "create_file-00000001");
        assert_ne!(a, b);
    }

    #[test]
    fn hash_type_path_time_ids_are_unique_within_a_batch() {
        let gen = IdGenerator::default();
        let a = gen.next("delete", Path::new("/usr/bin/foo"));
        let b = gen.next("delete", Path::new("/usr/bin/foo"));
        assert_ne!(a, b);
    }
}
