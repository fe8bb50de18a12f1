//! Named-Pattern Resolver.
//!
//! Resolution runs in two stages:
//!
//! 1. [`expand`] flattens group references into glob leaves with an
//!    explicit worklist. A group reference already on the current
//!    expansion path (same name, same scope) is skipped, so cyclic tables
//!    terminate without recursion. `^name` inside `name` is a different
//!    reference and is expanded against the dependency roots.
//! 2. [`PatternResolver::resolve`] substitutes root placeholders into each
//!    leaf (once per dependency root for dependency-scoped leaves) and
//!    compiles the result.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::{debug, warn};

use crate::config::AuditConfig;
use crate::graph::model::{ProjectGraph, TaskSpec, is_workspace_root};
use crate::patterns::glob::Pattern;
use crate::patterns::token::{NamedGroupTable, RawToken, Token};
use crate::util::paths;

pub const PROJECT_ROOT: &str = "{projectRoot}";
pub const WORKSPACE_ROOT: &str = "{workspaceRoot}";
pub const PROJECT_NAME: &str = "{projectName}";

/// Group used when a task declares no inputs at all.
pub const DEFAULT_GROUP: &str = "default";

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{[A-Za-z_][A-Za-z0-9_.]*\}").expect("valid placeholder regex")
    })
}

/// Which roots a leaf glob is substituted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Own,
    Dependencies,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Leaf {
    pub glob: String,
    pub negated: bool,
    pub scope: Scope,
}

/// Flat result of group expansion, before substitution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expansion {
    pub leaves: Vec<Leaf>,
    /// Group names skipped because they were already being expanded.
    pub truncated_cycles: Vec<String>,
    /// Tokens with no file-matching meaning (directives, unknown groups).
    pub dropped: Vec<String>,
}

enum Frame<'a> {
    Visit { token: &'a RawToken, scope: Scope },
    Leave(&'a str, Scope),
}

/// Depth-first, order-preserving expansion of `tokens` through `groups`.
pub fn expand<'a>(tokens: &'a [RawToken], groups: &'a NamedGroupTable) -> Expansion {
    let mut expansion = Expansion::default();
    let mut seen: HashSet<Leaf> = HashSet::new();
    let mut on_path: HashSet<(&'a str, Scope)> = HashSet::new();

    let mut stack: Vec<Frame<'a>> = tokens
        .iter()
        .rev()
        .map(|token| Frame::Visit {
            token,
            scope: Scope::Own,
        })
        .collect();

    while let Some(frame) = stack.pop() {
        let (token, scope) = match frame {
            Frame::Leave(name, scope) => {
                on_path.remove(&(name, scope));
                continue;
            }
            Frame::Visit { token, scope } => (token, scope),
        };

        let (name, scope) = match Token::classify(token, groups) {
            Token::Glob { glob, negated } => {
                let leaf = Leaf {
                    glob,
                    negated,
                    scope,
                };
                if seen.insert(leaf.clone()) {
                    expansion.leaves.push(leaf);
                }
                continue;
            }
            Token::Directive => {
                debug!(?token, "dropping non-file token");
                expansion.dropped.push(describe(token));
                continue;
            }
            Token::Group(name) => (name, scope),
            Token::DependencyGroup(name) => (name, Scope::Dependencies),
        };

        let Some((key, members)) = groups.entry(&name) else {
            debug!(group = %name, "dropping reference to undefined group");
            expansion.dropped.push(name);
            continue;
        };

        if !on_path.insert((key, scope)) {
            debug!(group = %name, ?scope, "group cycle truncated");
            expansion.truncated_cycles.push(name);
            continue;
        }
        stack.push(Frame::Leave(key, scope));
        stack.extend(
            members
                .iter()
                .rev()
                .map(|token| Frame::Visit { token, scope }),
        );
    }

    expansion
}

fn describe(token: &RawToken) -> String {
    serde_json::to_string(token).unwrap_or_else(|_| format!("{token:?}"))
}

/// Positive and negative matchers for one side (inputs or outputs) of a task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedPatternSet {
    pub positive: Vec<Pattern>,
    pub negative: Vec<Pattern>,
    pub truncated_cycles: Vec<String>,
    pub dropped: Vec<String>,
}

impl ResolvedPatternSet {
    /// Negations only subtract: a path matching no positive pattern is
    /// never declared, whatever the negations say.
    pub fn matches(&self, abs_path: &str) -> bool {
        self.positive.iter().any(|p| p.matches(abs_path))
            && !self.negative.iter().any(|p| p.matches(abs_path))
    }

    pub fn is_empty(&self) -> bool {
        self.positive.is_empty()
    }
}

/// Resolved input and output patterns of one task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatterns {
    pub inputs: ResolvedPatternSet,
    pub outputs: ResolvedPatternSet,
}

/// Root a glob is substituted against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootBinding {
    pub project: String,
    /// Absolute project root.
    pub root: String,
}

pub struct PatternResolver<'a> {
    groups: &'a NamedGroupTable,
    workspace_root: String,
}

impl<'a> PatternResolver<'a> {
    pub fn new(config: &AuditConfig, groups: &'a NamedGroupTable) -> Self {
        Self {
            groups,
            workspace_root: config.root_str(),
        }
    }

    /// Absolute root for a workspace-relative project root.
    pub fn bind(&self, project: &str, rel_root: &str) -> RootBinding {
        let root = if is_workspace_root(rel_root) {
            self.workspace_root.clone()
        } else {
            paths::absolutize(rel_root, &self.workspace_root)
        };
        RootBinding {
            project: project.to_string(),
            root,
        }
    }

    pub fn resolve(
        &self,
        tokens: &[RawToken],
        own: &RootBinding,
        dependencies: &[RootBinding],
    ) -> ResolvedPatternSet {
        let expansion = expand(tokens, self.groups);
        let mut set = ResolvedPatternSet {
            truncated_cycles: expansion.truncated_cycles,
            dropped: expansion.dropped,
            ..Default::default()
        };

        let mut compiled: HashSet<(String, bool)> = HashSet::new();
        for leaf in expansion.leaves {
            let bindings = match leaf.scope {
                Scope::Own => std::slice::from_ref(own),
                Scope::Dependencies => dependencies,
            };

            for binding in bindings {
                let Some(glob) = self.substitute(&leaf.glob, binding) else {
                    debug!(glob = %leaf.glob, "dropping glob with unresolvable placeholder");
                    set.dropped.push(leaf.glob.clone());
                    continue;
                };
                if !compiled.insert((glob.clone(), leaf.negated)) {
                    continue;
                }
                match Pattern::compile(&glob) {
                    Ok(pattern) if leaf.negated => set.negative.push(pattern),
                    Ok(pattern) => set.positive.push(pattern),
                    Err(err) => {
                        warn!(error = %err, "dropping uncompilable glob");
                        set.dropped.push(glob);
                    }
                }
            }
        }

        set
    }

    /// Replace known placeholders and anchor relative globs at the
    /// workspace root. `None` if an unknown placeholder remains.
    fn substitute(&self, glob: &str, binding: &RootBinding) -> Option<String> {
        let replaced = glob
            .replace(WORKSPACE_ROOT, &self.workspace_root)
            .replace(PROJECT_ROOT, &binding.root)
            .replace(PROJECT_NAME, &binding.project);

        if placeholder_regex().is_match(&replaced) {
            return None;
        }

        Some(paths::absolutize(&replaced, &self.workspace_root))
    }

    /// Input and output patterns for `spec`.
    ///
    /// Dependency-scoped leaves bind to the roots of the task's project
    /// dependencies and of its dependency tasks.
    pub fn resolve_task(&self, spec: &TaskSpec, projects: &ProjectGraph) -> TaskPatterns {
        let own = self.bind(spec.project(), &spec.project_root);

        let mut dependency_projects: BTreeSet<&str> = spec
            .project_dependencies
            .iter()
            .map(String::as_str)
            .collect();
        dependency_projects.extend(spec.depends_on.iter().map(|t| t.project.as_str()));

        let dependencies: Vec<RootBinding> = dependency_projects
            .into_iter()
            .filter_map(|project| match projects.root_of(project) {
                Some(root) => Some(self.bind(project, root)),
                None => {
                    warn!(task = %spec.task, project, "unknown dependency project");
                    None
                }
            })
            .collect();

        let default_inputs;
        let inputs = if spec.inputs.is_empty() && self.groups.contains(DEFAULT_GROUP) {
            default_inputs = [
                RawToken::from(DEFAULT_GROUP),
                RawToken::Text(format!("^{DEFAULT_GROUP}")),
            ];
            &default_inputs[..]
        } else {
            &spec.inputs[..]
        };

        TaskPatterns {
            inputs: self.resolve(inputs, &own, &dependencies),
            outputs: self.resolve(&spec.outputs, &own, &dependencies),
        }
    }
}

/// Memoizes task resolution for the duration of one run.
#[derive(Debug, Default)]
pub struct PatternCache {
    resolved: HashMap<String, Arc<TaskPatterns>>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_resolve(
        &mut self,
        resolver: &PatternResolver<'_>,
        spec: &TaskSpec,
        projects: &ProjectGraph,
    ) -> Arc<TaskPatterns> {
        self.resolved
            .entry(spec.task.to_string())
            .or_insert_with(|| Arc::new(resolver.resolve_task(spec, projects)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}
