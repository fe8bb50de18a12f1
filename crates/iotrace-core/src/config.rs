use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::trace::lineage::ProcessTree;

/// Directory names whose contents are never attributed to a task.
pub const DEFAULT_IGNORE_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    ".nx",
    ".yarn",
    ".pnpm-store",
];

/// Kernel pseudo-filesystems. Matched as absolute prefixes, not segments.
pub const DEFAULT_PSEUDO_FS_ROOTS: &[&str] = &["/proc", "/sys", "/dev"];

/// Build-system bookkeeping files, matched against the file name.
///
/// Entries containing a wildcard are compiled as globs over the name.
pub const DEFAULT_BOOKKEEPING_FILES: &[&str] = &[
    "package.json",
    "project.json",
    "nx.json",
    "tsconfig.json",
    "tsconfig.base.json",
    "tsconfig.*.json",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "pnpm-workspace.yaml",
    ".gitignore",
    ".nxignore",
    ".npmrc",
    ".env",
    ".env.*",
];

/// Delays bracketing the traced task when the tracer attaches out-of-band.
///
/// The tracer has no readiness handshake: it must be running before the task
/// starts and still running when the task's last accesses are flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimingContract {
    pub startup_grace_ms: u64,
    pub drain_grace_ms: u64,
}

impl Default for TimingContract {
    fn default() -> Self {
        Self {
            startup_grace_ms: 500,
            drain_grace_ms: 1000,
        }
    }
}

/// Immutable settings shared by every pipeline stage of one audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuditConfig {
    /// Absolute workspace root. Every canonical path is relative to it.
    pub workspace_root: PathBuf,

    /// Path segments that exclude an access (e.g. `.git`, `node_modules`).
    pub ignore_dirs: Vec<String>,

    /// Absolute prefixes for kernel pseudo-filesystems.
    pub pseudo_fs_roots: Vec<String>,

    /// File names (or name globs) read by the build system itself.
    pub bookkeeping_files: Vec<String>,

    pub timing: TimingContract,

    /// When set, only events from these pids are kept.
    pub pid_filter: Option<BTreeSet<u32>>,

    /// Pid of the traced task. Its descendants, as far as the trace or a
    /// process-table sample reveals them, are admitted alongside it.
    pub task_pid: Option<u32>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::new(),
            ignore_dirs: DEFAULT_IGNORE_DIRS.iter().map(|s| s.to_string()).collect(),
            pseudo_fs_roots: DEFAULT_PSEUDO_FS_ROOTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            bookkeeping_files: DEFAULT_BOOKKEEPING_FILES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            timing: TimingContract::default(),
            pid_filter: None,
            task_pid: None,
        }
    }
}

impl AuditConfig {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            ..Default::default()
        }
    }

    /// Workspace root as a `/`-separated string without a trailing slash.
    pub fn root_str(&self) -> String {
        crate::util::paths::normalize_lexically(&self.workspace_root.to_string_lossy())
    }

    pub fn root(&self) -> &Path {
        &self.workspace_root
    }

    /// Keep only events from the task at `pid` and the descendants
    /// recorded in `lineage`. Lineage found in the trace itself (fork
    /// records) is added later by the normalizer.
    pub fn scope_to_task(&mut self, pid: u32, lineage: &ProcessTree) {
        self.task_pid = Some(pid);
        if !lineage.is_empty() {
            self.pid_filter
                .get_or_insert_with(BTreeSet::new)
                .extend(lineage.descendants(pid));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_vcs_and_dependency_caches() {
        let config = AuditConfig::new("/ws");
        assert!(config.ignore_dirs.iter().any(|d| d == ".git"));
        assert!(config.ignore_dirs.iter().any(|d| d == "node_modules"));
        assert!(config.pseudo_fs_roots.iter().any(|d| d == "/proc"));
        assert_eq!(config.timing.startup_grace_ms, 500);
        assert!(config.pid_filter.is_none());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: AuditConfig = serde_json::from_str(
            r#"{ "workspaceRoot": "/repo", "timing": { "drainGraceMs": 2500 } }"#,
        )
        .unwrap();

        assert_eq!(config.workspace_root, PathBuf::from("/repo"));
        assert_eq!(config.timing.drain_grace_ms, 2500);
        assert_eq!(config.timing.startup_grace_ms, 500);
        assert!(!config.bookkeeping_files.is_empty());
    }

    #[test]
    fn scoping_to_a_task_admits_its_sampled_children() {
        let mut lineage = ProcessTree::new();
        lineage.record(40, 41);
        lineage.record(1, 99);

        let mut config = AuditConfig::new("/ws");
        config.scope_to_task(40, &lineage);

        assert_eq!(config.task_pid, Some(40));
        assert_eq!(config.pid_filter, Some(BTreeSet::from([40, 41])));
    }

    #[test]
    fn root_str_strips_trailing_separator() {
        assert_eq!(AuditConfig::new("/repo/").root_str(), "/repo");
        assert_eq!(AuditConfig::new("/repo/./a/..").root_str(), "/repo");
    }
}
