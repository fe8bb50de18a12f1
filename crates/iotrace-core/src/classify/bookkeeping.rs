use std::collections::BTreeSet;

use tracing::warn;

use crate::config::AuditConfig;
use crate::patterns::glob::{Pattern, has_wildcard};

/// Recognizes files the build system reads for its own bookkeeping
/// (manifests, lockfiles, workspace configuration).
///
/// Matching is on the file name only, wherever the file lives.
#[derive(Debug, Clone, Default)]
pub struct BookkeepingFilter {
    names: BTreeSet<String>,
    globs: Vec<Pattern>,
}

impl BookkeepingFilter {
    pub fn new(config: &AuditConfig) -> Self {
        let mut filter = Self::default();
        for entry in &config.bookkeeping_files {
            if !has_wildcard(entry) {
                filter.names.insert(entry.clone());
                continue;
            }
            match Pattern::compile(entry) {
                Ok(pattern) => filter.globs.push(pattern),
                Err(err) => warn!(error = %err, "ignoring bookkeeping pattern"),
            }
        }
        filter
    }

    pub fn is_bookkeeping(&self, rel_path: &str) -> bool {
        let name = rel_path.rsplit('/').next().unwrap_or(rel_path);
        self.names.contains(name) || self.globs.iter().any(|g| g.matches(name))
    }
}
