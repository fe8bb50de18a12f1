//! Glob Compiler.
//!
//! Wildcards are translated in a fixed precedence so that longer forms are
//! never re-expanded by shorter ones:
//!
//!   - `**/*` → the anchor directory itself or anything beneath it
//!   - `**`   → any run of characters, separators included
//!   - `*`    → any run of characters within one path segment
//!   - `?`    → exactly one character
//!
//! Every other character is matched literally. A glob with no wildcard
//! matches the exact path or anything beneath it as a directory.

use std::fmt;

use regex::Regex;

use crate::error::PatternError;

const ANCHORED_TREE: &str = "/**/*";

/// A compiled path matcher over absolute paths. Immutable once built.
#[derive(Clone)]
pub enum Pattern {
    Exact { source: String, path: String },
    Glob { source: String, regex: Regex },
}

impl Pattern {
    pub fn compile(glob: &str) -> Result<Self, PatternError> {
        if !has_wildcard(glob) {
            let path = glob.trim_end_matches('/');
            let path = if path.is_empty() { "/" } else { path };
            return Ok(Pattern::Exact {
                source: glob.to_string(),
                path: path.to_string(),
            });
        }

        let regex = Regex::new(&translate(glob)).map_err(|source| PatternError {
            glob: glob.to_string(),
            source,
        })?;
        Ok(Pattern::Glob {
            source: glob.to_string(),
            regex,
        })
    }

    pub fn matches(&self, abs_path: &str) -> bool {
        match self {
            Pattern::Exact { path, .. } => {
                if path == "/" {
                    return abs_path.starts_with('/');
                }
                match abs_path.strip_prefix(path.as_str()) {
                    Some(rest) => rest.is_empty() || rest.starts_with('/'),
                    None => false,
                }
            }
            Pattern::Glob { regex, .. } => regex.is_match(abs_path),
        }
    }

    pub fn source(&self) -> &str {
        match self {
            Pattern::Exact { source, .. } | Pattern::Glob { source, .. } => source,
        }
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.source()).finish()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source() == other.source()
    }
}

pub fn has_wildcard(glob: &str) -> bool {
    glob.contains(['*', '?'])
}

/// Anchored regex source for a wildcard glob.
fn translate(glob: &str) -> String {
    let (body, tail) = match glob.strip_suffix(ANCHORED_TREE) {
        Some(base) => (base, "(?:/.*)?"),
        None => (glob, ""),
    };

    let mut out = String::with_capacity(glob.len() * 2 + 8);
    out.push('^');

    let mut rest = body;
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("**/*") {
            out.push_str("(?:.*/)?[^/]*");
            rest = after;
        } else if let Some(after) = rest.strip_prefix("**") {
            out.push_str(".*");
            rest = after;
        } else if let Some(after) = rest.strip_prefix('*') {
            out.push_str("[^/]*");
            rest = after;
        } else if let Some(after) = rest.strip_prefix('?') {
            out.push('.');
            rest = after;
        } else {
            let mut chars = rest.chars();
            if let Some(c) = chars.next() {
                let mut buf = [0u8; 4];
                out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
            }
            rest = chars.as_str();
        }
    }

    out.push_str(tail);
    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(glob: &str, path: &str) -> bool {
        Pattern::compile(glob).unwrap().matches(path)
    }

    #[test]
    fn double_star_slash_star_covers_every_depth() {
        assert!(m("/ws/libs/a/**/*.ts", "/ws/libs/a/src/a.ts"));
        assert!(m("/ws/libs/a/**/*.ts", "/ws/libs/a/a.ts"));
        assert!(m("/ws/libs/a/**/*.ts", "/ws/libs/a/src/deep/x/a.ts"));
        assert!(!m("/ws/libs/a/**/*.ts", "/ws/libs/b/a.ts"));
        assert!(!m("/ws/libs/a/**/*.ts", "/ws/libs/a/src/a.tsx"));
    }

    #[test]
    fn trailing_tree_matches_anchor_itself() {
        assert!(m("/ws/libs/a/**/*", "/ws/libs/a"));
        assert!(m("/ws/libs/a/**/*", "/ws/libs/a/x/y.json"));
        assert!(!m("/ws/libs/a/**/*", "/ws/libs/ab/y.json"));
    }

    #[test]
    fn double_star_crosses_separators() {
        assert!(m("/ws/src/**", "/ws/src/generated/x.ts"));
        assert!(!m("/ws/src/**", "/ws/lib/x.ts"));
    }

    #[test]
    fn single_star_stays_in_segment() {
        assert!(m("/ws/src/*.ts", "/ws/src/a.ts"));
        assert!(!m("/ws/src/*.ts", "/ws/src/nested/a.ts"));
    }

    #[test]
    fn question_mark_matches_one_character() {
        assert!(m("/ws/a?.txt", "/ws/ab.txt"));
        assert!(!m("/ws/a?.txt", "/ws/a.txt"));
        assert!(!m("/ws/a?.txt", "/ws/abc.txt"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        assert!(m("/ws/a+b/(x)/*.[ch]", "/ws/a+b/(x)/f.[ch]"));
        assert!(!m("/ws/a+b/*.txt", "/ws/aab/f.txt"));
        assert!(!m("/ws/file.*", "/ws/fileXtxt/"));
        assert!(m("/ws/file.*", "/ws/file.txt"));
        assert!(!m("/ws/v1.0/*", "/ws/v1x0/a"));
    }

    #[test]
    fn literal_pattern_is_exact_or_directory_prefix() {
        assert!(m("/ws/data/input.txt", "/ws/data/input.txt"));
        assert!(!m("/ws/data/input.txt", "/ws/data/input.txt.bak"));
        assert!(m("/ws/dist", "/ws/dist/main.js"));
        assert!(m("/ws/dist/", "/ws/dist/main.js"));
        assert!(!m("/ws/dist", "/ws/distribution/main.js"));
    }

    #[test]
    fn equality_and_debug_use_source() {
        let a = Pattern::compile("/ws/**/*.ts").unwrap();
        let b = Pattern::compile("/ws/**/*.ts").unwrap();
        assert_eq!(a, b);
        assert_eq!(format!("{a:?}"), "Pattern(\"/ws/**/*.ts\")");
    }
}
