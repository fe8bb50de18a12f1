use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AuditError;
use crate::patterns::token::RawToken;
use crate::util::paths;

/// `project:target` address of one task.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskRef {
    pub project: String,
    pub target: String,
}

impl TaskRef {
    pub fn new(project: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            target: target.into(),
        }
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.project, self.target)
    }
}

impl FromStr for TaskRef {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((project, target)) if !project.is_empty() && !target.is_empty() => {
                Ok(TaskRef::new(project, target))
            }
            _ => Err(AuditError::InvalidTaskRef(s.to_string())),
        }
    }
}

/// Declared I/O contract of one task, as supplied by the build system.
///
/// Read-only for the remainder of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSpec {
    pub task: TaskRef,
    /// Workspace-relative project root (`.` for a root-level project).
    pub project_root: String,
    pub inputs: Vec<RawToken>,
    pub outputs: Vec<RawToken>,
    /// Same-project task edges.
    pub depends_on: Vec<TaskRef>,
    /// Projects whose roots `^group` tokens expand against.
    pub project_dependencies: Vec<String>,
}

impl TaskSpec {
    pub fn project(&self) -> &str {
        &self.task.project
    }
}

/// Project id → workspace-relative root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectGraph(BTreeMap<String, String>);

impl ProjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, project: impl Into<String>, root: &str) {
        self.0.insert(project.into(), normalize_root(root));
    }

    pub fn root_of(&self, project: &str) -> Option<&str> {
        self.0.get(project).map(String::as_str)
    }

    /// Project whose root most specifically contains `rel_path`.
    ///
    /// Projects rooted at the workspace root never own files; otherwise
    /// every path would belong to them.
    pub fn owner_of(&self, rel_path: &str) -> Option<&str> {
        self.0
            .iter()
            .filter(|(_, root)| !is_workspace_root(root))
            .filter(|(_, root)| paths::is_within(rel_path, root))
            .max_by_key(|(_, root)| root.len())
            .map(|(project, _)| project.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub fn normalize_root(root: &str) -> String {
    let root = paths::normalize_lexically(root);
    if root.is_empty() { ".".to_string() } else { root }
}

pub fn is_workspace_root(root: &str) -> bool {
    root.is_empty() || root == "."
}
