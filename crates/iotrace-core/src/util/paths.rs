//! Path helpers for canonical, `/`-separated workspace paths.
//!
//! Trace output and pattern strings are plain text; these helpers never
//! touch the filesystem so normalization stays deterministic.

/// Resolve `.` and `..` segments and collapse repeated separators.
///
/// `..` never climbs above the root of an absolute path. For relative
/// paths, leading `..` segments are kept.
pub fn normalize_lexically(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&"..") | None if !absolute => parts.push(".."),
                Some(_) => {
                    parts.pop();
                }
                None => {}
            },
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Resolve a possibly-relative trace path against the workspace root.
pub fn absolutize(path: &str, root: &str) -> String {
    if path.starts_with('/') {
        normalize_lexically(path)
    } else {
        normalize_lexically(&format!("{root}/{path}"))
    }
}

/// Strict workspace-relative form of `abs`, or `None` if `abs` is the root
/// itself or lies outside it.
pub fn to_relative(abs: &str, root: &str) -> Option<String> {
    let rest = if root == "/" {
        abs.strip_prefix('/')?
    } else {
        abs.strip_prefix(root)?.strip_prefix('/')?
    };
    if rest.is_empty() {
        return None;
    }
    Some(rest.to_string())
}

/// Join a canonical relative path back onto the workspace root.
pub fn to_absolute(rel: &str, root: &str) -> String {
    if root == "/" {
        format!("/{rel}")
    } else {
        format!("{root}/{rel}")
    }
}

/// Whether `path` equals `dir` or lies beneath it.
pub fn is_within(path: &str, dir: &str) -> bool {
    if dir.is_empty() || dir == "." {
        return true;
    }
    match path.strip_prefix(dir) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
