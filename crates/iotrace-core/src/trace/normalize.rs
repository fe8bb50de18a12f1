use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::AuditConfig;
use crate::error::AuditError;
use crate::trace::access::AccessSet;
use crate::trace::filter::PathFilter;
use crate::trace::fs_usage::FsUsageNormalizer;
use crate::trace::strace::StraceNormalizer;
use crate::trace::tracepoint::TracepointNormalizer;

/// Reduces one raw tracer output blob to a canonical access set.
///
/// Implementations are pure: normalizing the same text twice yields the
/// same set, and unrecognized lines are skipped rather than reported.
pub trait TraceNormalizer {
    fn name(&self) -> &'static str;

    fn normalize(&self, raw: &str) -> AccessSet;
}

/// Supported tracer output grammars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// `strace` syscall trace (Linux).
    Strace,
    /// `fs_usage` filesystem monitor (macOS).
    FsUsage,
    /// Pre-reduced kernel tracepoint records (`bpftrace` program).
    Tracepoint,
}

impl Backend {
    /// Pick the default backend for the host platform.
    pub fn detect() -> Result<Self, AuditError> {
        Self::for_os(std::env::consts::OS)
    }

    pub fn for_os(os: &str) -> Result<Self, AuditError> {
        match os {
            "linux" => Ok(Backend::Strace),
            "macos" => Ok(Backend::FsUsage),
            other => Err(AuditError::PlatformUnsupported {
                os: other.to_string(),
            }),
        }
    }

    pub fn normalizer(self, config: &AuditConfig) -> Box<dyn TraceNormalizer> {
        let filter = PathFilter::new(config);
        match self {
            Backend::Strace => Box::new(StraceNormalizer::new(filter)),
            Backend::FsUsage => Box::new(FsUsageNormalizer::new(filter)),
            Backend::Tracepoint => Box::new(TracepointNormalizer::new(filter)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Strace => "strace",
            Backend::FsUsage => "fs-usage",
            Backend::Tracepoint => "tracepoint",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strace" => Ok(Backend::Strace),
            "fs-usage" | "fs_usage" => Ok(Backend::FsUsage),
            "tracepoint" | "ebpf" | "bpftrace" => Ok(Backend::Tracepoint),
            other => Err(format!("unknown trace backend `{other}`")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_maps_known_platforms() {
        assert_eq!(Backend::for_os("linux").unwrap(), Backend::Strace);
        assert_eq!(Backend::for_os("macos").unwrap(), Backend::FsUsage);
        assert!(matches!(
            Backend::for_os("windows"),
            Err(AuditError::PlatformUnsupported { .. })
        ));
    }

    #[test]
    fn backends_parse_from_cli_names() {
        assert_eq!("fs_usage".parse::<Backend>().unwrap(), Backend::FsUsage);
        assert_eq!("ebpf".parse::<Backend>().unwrap(), Backend::Tracepoint);
        assert!("dtrace".parse::<Backend>().is_err());
    }

    #[test]
    fn normalization_is_idempotent_for_every_backend() {
        let config = AuditConfig::new("/ws");
        let samples = [
            (
                Backend::Strace,
                "1 openat(AT_FDCWD, \"/ws/a\", O_RDONLY) = 3\n1 openat(AT_FDCWD, \"/ws/b\", O_RDWR) = 4\n",
            ),
            (
                Backend::FsUsage,
                "t  open  F=3  (R___________)  /ws/a  0.1   sh.1\n",
            ),
            (Backend::Tracepoint, "R 1 /ws/a\nW 1 /ws/b\n"),
        ];

        for (backend, raw) in samples {
            let normalizer = backend.normalizer(&config);
            let first = normalizer.normalize(raw);
            let second = normalizer.normalize(raw);
            assert_eq!(first, second, "{backend} is not idempotent");
            assert!(!first.is_empty());
        }
    }
}
