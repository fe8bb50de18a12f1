use std::collections::BTreeSet;

use tracing::trace;

use crate::config::AuditConfig;
use crate::trace::access::{AccessSet, TraceEvent};
use crate::trace::lineage::ProcessTree;
use crate::util::paths;

/// Post-processing shared by every backend.
///
/// Drops events outside the workspace, inside ignored segments, on kernel
/// pseudo-filesystems, or from unwanted pids, then relativizes the rest.
#[derive(Debug, Clone)]
pub struct PathFilter {
    root: String,
    ignore_dirs: BTreeSet<String>,
    pseudo_fs_roots: Vec<String>,
    pid_filter: Option<BTreeSet<u32>>,
    task_pid: Option<u32>,
}

impl PathFilter {
    pub fn new(config: &AuditConfig) -> Self {
        Self {
            root: config.root_str(),
            ignore_dirs: config.ignore_dirs.iter().cloned().collect(),
            pseudo_fs_roots: config
                .pseudo_fs_roots
                .iter()
                .map(|p| paths::normalize_lexically(p))
                .collect(),
            pid_filter: admitted_pids(config.pid_filter.as_ref(), config.task_pid, None),
            task_pid: config.task_pid,
        }
    }

    /// Widen the pid filter to every process the task spawned according to
    /// `tree`. Without a task pid the filter is returned unchanged.
    pub fn with_lineage(&self, tree: &ProcessTree) -> Self {
        let mut scoped = self.clone();
        if self.task_pid.is_some() {
            scoped.pid_filter = admitted_pids(self.pid_filter.as_ref(), self.task_pid, Some(tree));
        }
        scoped
    }

    /// Whether events from `pid` are kept. Events without a pid always are.
    pub fn accepts_pid(&self, pid: Option<u32>) -> bool {
        match (&self.pid_filter, pid) {
            (Some(allowed), Some(pid)) => allowed.contains(&pid),
            _ => true,
        }
    }

    /// Workspace-relative form of `event.path`, or `None` if discarded.
    pub fn admit(&self, event: &TraceEvent) -> Option<String> {
        if !self.accepts_pid(event.pid) {
            return None;
        }

        let abs = paths::absolutize(&event.path, &self.root);
        if self
            .pseudo_fs_roots
            .iter()
            .any(|pseudo| paths::is_within(&abs, pseudo))
        {
            return None;
        }

        let rel = paths::to_relative(&abs, &self.root)?;
        if rel
            .split('/')
            .any(|segment| self.ignore_dirs.contains(segment))
        {
            trace!(path = %rel, "ignored directory segment");
            return None;
        }

        Some(rel)
    }

    /// Fold events into a canonical access set.
    pub fn collect<I>(&self, events: I) -> AccessSet
    where
        I: IntoIterator<Item = TraceEvent>,
    {
        let mut set = AccessSet::new();
        for event in events {
            if let Some(rel) = self.admit(&event) {
                set.record(event.operation, rel);
            }
        }
        set
    }
}

fn admitted_pids(
    configured: Option<&BTreeSet<u32>>,
    task_pid: Option<u32>,
    tree: Option<&ProcessTree>,
) -> Option<BTreeSet<u32>> {
    let Some(root) = task_pid else {
        return configured.cloned();
    };
    let mut pids = configured.cloned().unwrap_or_default();
    match tree {
        Some(tree) => pids.extend(tree.descendants(root)),
        None => {
            pids.insert(root);
        }
    }
    Some(pids)
}
