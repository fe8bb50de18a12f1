use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AuditError;
use crate::graph::model::{ProjectGraph, TaskRef, TaskSpec};
use crate::graph::TaskGraphSource;
use crate::patterns::token::{DEPENDENCY_PREFIX, NamedGroupTable, RawToken};

/// Project graph exported by the host build system as JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSnapshot {
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,
    #[serde(default)]
    pub named_inputs: NamedGroupTable,
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectEntry {
    pub root: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub implicit_dependencies: Vec<String>,
    #[serde(default)]
    pub targets: BTreeMap<String, TargetEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetEntry {
    #[serde(default)]
    pub inputs: Vec<RawToken>,
    #[serde(default)]
    pub outputs: Vec<RawToken>,
    #[serde(default)]
    pub depends_on: Vec<DependsOn>,
}

/// One `dependsOn` entry in either of its declared shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependsOn {
    Target(String),
    Detailed {
        target: String,
        #[serde(default)]
        projects: Option<ProjectSelector>,
        #[serde(default)]
        dependencies: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProjectSelector {
    One(String),
    Many(Vec<String>),
}

impl DependsOn {
    /// The same-project task this entry names, if any.
    ///
    /// Edges to other projects carry no pattern inheritance and are skipped.
    pub fn same_project_task(&self, project: &str) -> Option<TaskRef> {
        match self {
            DependsOn::Target(text) => {
                if text.starts_with(DEPENDENCY_PREFIX) {
                    return None;
                }
                match text.split_once(':') {
                    Some((owner, target)) if owner == project => Some(TaskRef::new(project, target)),
                    Some(_) => None,
                    None => Some(TaskRef::new(project, text.as_str())),
                }
            }
            DependsOn::Detailed {
                dependencies: true,
                ..
            } => None,
            DependsOn::Detailed {
                target, projects, ..
            } => {
                let selected = match projects {
                    None => true,
                    Some(ProjectSelector::One(one)) => one == "self" || one == project,
                    Some(ProjectSelector::Many(many)) => many.iter().any(|p| p == project),
                };
                selected.then(|| TaskRef::new(project, target.as_str()))
            }
        }
    }
}

impl WorkspaceSnapshot {
    pub fn from_json(text: &str) -> Result<Self, AuditError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read workspace snapshot: {}", path.display()))?;
        Self::from_json(&text)
            .with_context(|| format!("failed to parse workspace snapshot: {}", path.display()))
    }
}

impl TaskGraphSource for WorkspaceSnapshot {
    fn task_spec(&self, task: &TaskRef) -> Result<TaskSpec, AuditError> {
        let failure = |reason: &str| AuditError::SpecQueryFailure {
            task: task.to_string(),
            reason: reason.to_string(),
        };

        let project = self
            .projects
            .get(&task.project)
            .ok_or_else(|| failure("unknown project"))?;
        let target = project
            .targets
            .get(&task.target)
            .ok_or_else(|| failure("project has no such target"))?;

        let depends_on = target
            .depends_on
            .iter()
            .filter_map(|entry| {
                let dep = entry.same_project_task(&task.project);
                if dep.is_none() {
                    debug!(%task, ?entry, "skipping cross-project dependsOn entry");
                }
                dep
            })
            .collect();

        let mut project_dependencies: Vec<String> = Vec::new();
        for dep in project
            .dependencies
            .iter()
            .chain(project.implicit_dependencies.iter())
        {
            // `!name` removes an inferred implicit dependency.
            if dep.starts_with('!') || project_dependencies.contains(dep) {
                continue;
            }
            project_dependencies.push(dep.clone());
        }

        Ok(TaskSpec {
            task: task.clone(),
            project_root: project.root.clone(),
            inputs: target.inputs.clone(),
            outputs: target.outputs.clone(),
            depends_on,
            project_dependencies,
        })
    }

    fn named_groups(&self) -> &NamedGroupTable {
        &self.named_inputs
    }

    fn project_graph(&self) -> ProjectGraph {
        let mut graph = ProjectGraph::new();
        for (id, project) in &self.projects {
            graph.insert(id.clone(), &project.root);
        }
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"{
        "workspaceRoot": "/ws",
        "namedInputs": { "default": ["{projectRoot}/**/*"] },
        "projects": {
            "app": {
                "root": "apps/app",
                "dependencies": ["ui"],
                "implicitDependencies": ["tools", "!e2e", "ui"],
                "targets": {
                    "build": {
                        "inputs": ["default", "^default"],
                        "outputs": ["{projectRoot}/dist"],
                        "dependsOn": [
                            "codegen",
                            "^build",
                            "ui:build",
                            "app:lint",
                            { "target": "prep" },
                            { "target": "build", "dependencies": true },
                            { "target": "check", "projects": "self" },
                            { "target": "other", "projects": ["ui"] }
                        ]
                    },
                    "codegen": {}
                }
            },
            "ui": { "root": "libs/ui", "targets": { "build": {} } }
        }
    }"#;

    #[test]
    fn task_spec_keeps_only_same_project_edges() {
        let snapshot = WorkspaceSnapshot::from_json(SNAPSHOT).unwrap();
        let spec = snapshot.task_spec(&TaskRef::new("app", "build")).unwrap();

        let deps: Vec<String> = spec.depends_on.iter().map(ToString::to_string).collect();
        assert_eq!(deps, vec!["app:codegen", "app:lint", "app:prep", "app:check"]);
        assert_eq!(spec.project_dependencies, vec!["ui", "tools"]);
        assert_eq!(spec.project_root, "apps/app");
        assert_eq!(spec.inputs.len(), 2);
    }

    #[test]
    fn missing_project_or_target_is_spec_query_failure() {
        let snapshot = WorkspaceSnapshot::from_json(SNAPSHOT).unwrap();

        let err = snapshot.task_spec(&TaskRef::new("nope", "build")).unwrap_err();
        assert!(matches!(err, AuditError::SpecQueryFailure { .. }));
        assert!(err.to_string().contains("unknown project"));

        let err = snapshot.task_spec(&TaskRef::new("ui", "test")).unwrap_err();
        assert!(err.to_string().contains("no such target"));
    }

    #[test]
    fn project_graph_lists_every_root() {
        let snapshot = WorkspaceSnapshot::from_json(SNAPSHOT).unwrap();
        let graph = snapshot.project_graph();

        assert_eq!(graph.root_of("app"), Some("apps/app"));
        assert_eq!(graph.owner_of("libs/ui/src/x.ts"), Some("ui"));
        assert!(snapshot.named_groups().contains("default"));
    }

    #[test]
    fn malformed_snapshot_is_an_error() {
        assert!(matches!(
            WorkspaceSnapshot::from_json("{ not json"),
            Err(AuditError::Snapshot(_))
        ));
    }
}
