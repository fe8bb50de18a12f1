use thiserror::Error;

/// Fatal audit failures. Each aborts before classification.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("no supported trace backend for platform `{os}`")]
    PlatformUnsupported { os: String },

    #[error("failed to launch tracer `{tracer}`: {reason}")]
    TracerLaunchFailure { tracer: String, reason: String },

    #[error("cannot resolve task `{task}`: {reason}")]
    SpecQueryFailure { task: String, reason: String },

    #[error("invalid task reference `{0}` (expected `project:target`)")]
    InvalidTaskRef(String),

    #[error("failed to load workspace snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// A glob that could not be compiled into a matcher.
#[derive(Debug, Error)]
#[error("invalid glob `{glob}`: {source}")]
pub struct PatternError {
    pub glob: String,
    #[source]
    pub source: regex::Error,
}

/// Captured trace text could not be read back.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("trace output unreadable at {path}: {source}")]
    TraceOutputUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
