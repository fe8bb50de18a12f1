use std::{fs, path::Path};

use tracing::warn;

use crate::error::TraceError;
use crate::trace::access::AccessSet;
use crate::trace::normalize::TraceNormalizer;

/// Normalized result of reading back a captured trace.
#[derive(Debug, Clone, Default)]
pub struct TraceCapture {
    pub accesses: AccessSet,

    /// Set when the trace could not be read and `accesses` is necessarily
    /// incomplete.
    pub warning: Option<String>,
}

/// Read the raw text a tracer wrote to `path`.
///
/// Invalid UTF-8 is replaced rather than rejected; tracers echo whatever
/// bytes the traced program passed as a path.
pub fn read_trace(path: &Path) -> Result<String, TraceError> {
    let bytes = fs::read(path).map_err(|source| TraceError::TraceOutputUnreadable {
        path: path.display().to_string(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Read and normalize a captured trace, degrading to an empty access set
/// when the file cannot be read.
pub fn capture_from_file(path: &Path, normalizer: &dyn TraceNormalizer) -> TraceCapture {
    match read_trace(path) {
        Ok(raw) => TraceCapture {
            accesses: normalizer.normalize(&raw),
            warning: None,
        },
        Err(err) => {
            warn!(error = %err, "continuing with an empty access set");
            TraceCapture {
                accesses: AccessSet::new(),
                warning: Some(err.to_string()),
            }
        }
    }
}
