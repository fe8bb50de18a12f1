use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Direction of a single file access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Read,
    Write,
}

/// One raw observation, before workspace filtering.
///
/// Events are ephemeral: they exist only while a single trace blob is
/// being normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    pub pid: Option<u32>,
    pub operation: Operation,
    /// Absolute, lexically normalized path.
    pub path: String,
}

/// Deduplicated, workspace-relative reads and writes observed in one run.
///
/// The two sets are independent: a file both created and read appears in
/// both. `BTreeSet` keeps iteration (and therefore reports) ordered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessSet {
    pub reads: BTreeSet<String>,
    pub writes: BTreeSet<String>,
}

impl AccessSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: re-recording a path is a no-op.
    pub fn record(&mut self, operation: Operation, rel_path: impl Into<String>) {
        let rel_path = rel_path.into();
        match operation {
            Operation::Read => self.reads.insert(rel_path),
            Operation::Write => self.writes.insert(rel_path),
        };
    }

    pub fn is_empty(&self) -> bool {
        self.reads.is_empty() && self.writes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.reads.len() + self.writes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_is_idempotent() {
        let mut set = AccessSet::new();
        set.record(Operation::Read, "a.txt");
        set.record(Operation::Read, "a.txt");
        assert_eq!(set.reads.len(), 1);
        assert!(set.writes.is_empty());
    }

    #[test]
    fn reads_and_writes_are_independent() {
        let mut set = AccessSet::new();
        set.record(Operation::Write, "out.txt");
        set.record(Operation::Read, "out.txt");
        assert!(set.reads.contains("out.txt"));
        assert!(set.writes.contains("out.txt"));
        assert_eq!(set.len(), 2);
    }
}
