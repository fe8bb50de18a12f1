use std::sync::OnceLock;

use regex::Regex;
use tracing::trace;

use crate::trace::access::{AccessSet, Operation, TraceEvent};
use crate::trace::filter::PathFilter;
use crate::trace::normalize::TraceNormalizer;

/// Flag tokens that make an open a write.
const WRITE_FLAGS: &[&str] = &["WRONLY", "RDWR", "CREAT", "TRUNC"];

fn call_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"\b(?P<call>openat|open|creat)\((?:AT_FDCWD,\s*)?"(?P<path>(?:[^"\\]|\\.)*)"(?:,\s*(?P<args>[^)]*))?\)\s*=\s*(?P<fd>\d+)"#,
        )
        .expect("valid strace call regex")
    })
}

fn pid_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:\[pid\s+(?P<bracketed>\d+)\]|(?P<bare>\d+))\s")
            .expect("valid strace pid regex")
    })
}

/// Syscall-trace backend (`strace -f -e trace=open,openat,creat`).
///
/// Only successful opens relative to the current directory are recorded;
/// `<unfinished ...>` / `resumed` pairs lose the path and are skipped.
#[derive(Debug, Clone)]
pub struct StraceNormalizer {
    filter: PathFilter,
}

impl StraceNormalizer {
    pub fn new(filter: PathFilter) -> Self {
        Self { filter }
    }
}

impl TraceNormalizer for StraceNormalizer {
    fn name(&self) -> &'static str {
        "strace"
    }

    fn normalize(&self, raw: &str) -> AccessSet {
        self.filter.collect(raw.lines().flat_map(parse_line))
    }
}

/// Parse one strace line into zero, one or two events.
pub fn parse_line(line: &str) -> Vec<TraceEvent> {
    let Some(caps) = call_regex().captures(line) else {
        trace!(line, "unrecognized strace line");
        return Vec::new();
    };

    let pid = pid_regex().captures(line).and_then(|c| {
        c.name("bracketed")
            .or_else(|| c.name("bare"))
            .and_then(|m| m.as_str().parse().ok())
    });
    let path = unescape(&caps["path"]);

    let (read, write) = if &caps["call"] == "creat" {
        (false, true)
    } else {
        let flags = caps
            .name("args")
            .map(|m| m.as_str().split(',').next().unwrap_or_default())
            .unwrap_or_default();
        classify_flags(flags)
    };

    let mut events = Vec::with_capacity(2);
    if read {
        events.push(TraceEvent {
            pid,
            operation: Operation::Read,
            path: path.clone(),
        });
    }
    if write {
        events.push(TraceEvent {
            pid,
            operation: Operation::Write,
            path,
        });
    }
    events
}

/// `(is_read, is_write)` for a pipe-delimited flag list such as
/// `O_WRONLY|O_CREAT|O_TRUNC`.
pub fn classify_flags(flags: &str) -> (bool, bool) {
    let tokens: Vec<&str> = flags
        .split('|')
        .map(|t| t.trim())
        .map(|t| t.strip_prefix("O_").unwrap_or(t))
        .collect();
    let has = |flag: &str| tokens.contains(&flag);

    let write = WRITE_FLAGS.iter().any(|f| has(*f));
    let read = has("RDONLY") || has("RDWR") || !has("WRONLY");
    (read, write)
}

/// Decode strace's C-style quoting: `\ooo` octal and `\xHH` hex byte
/// escapes plus the usual single-character escapes. Non-ASCII bytes are
/// always printed as octal, so decoding goes through a byte buffer.
fn unescape(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' || i + 1 == bytes.len() {
            out.push(bytes[i]);
            i += 1;
            continue;
        }

        let next = bytes[i + 1];
        i += 2;
        match next {
            b'0'..=b'7' => {
                let mut value = u32::from(next - b'0');
                for _ in 0..2 {
                    match bytes.get(i).copied() {
                        Some(d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            i += 1;
                        }
                        _ => break,
                    }
                }
                out.push((value & 0xff) as u8);
            }
            b'x' => {
                let digits = bytes[i..]
                    .iter()
                    .take(2)
                    .take_while(|b| b.is_ascii_hexdigit())
                    .count();
                let hex = std::str::from_utf8(&bytes[i..i + digits]).unwrap_or_default();
                match u8::from_str_radix(hex, 16) {
                    Ok(byte) => out.push(byte),
                    Err(_) => out.push(b'x'),
                }
                i += digits;
            }
            b'n' => out.push(b'\n'),
            b't' => out.push(b'\t'),
            b'r' => out.push(b'\r'),
            b'v' => out.push(0x0b),
            b'f' => out.push(0x0c),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            other => out.push(other),
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
