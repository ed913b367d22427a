//! Virtual path resolution.
//!
//! Virtual paths are plain slash-separated strings (`/docs/report.pdf`). There
//! is no stored tree: the directory of an entry is derived from its path
//! string, and a folder is just a record whose path other entries extend.

/// The root directory.
pub const ROOT: &str = "/";

/// Characters stripped from user-supplied file and folder names.
const INVALID_NAME_CHARS: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Logical directory of a virtual path: everything before the last component.
///
/// Entries at the conceptual root (and malformed paths without a slash)
/// resolve to `"/"`.
pub fn directory_of(path: &str) -> &str {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    match trimmed.rfind('/') {
        Some(0) | None => ROOT,
        Some(idx) => &trimmed[..idx],
    }
}

/// Last component of a virtual path.
pub fn file_name(path: &str) -> &str {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Join a normalized directory and a sanitized name.
pub fn join(dir: &str, name: &str) -> String {
    if dir == ROOT {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Normalize a caller-supplied directory into canonical form.
///
/// The result starts with `/`, has no trailing slash (except the root itself)
/// and contains no empty, `.` or `..` components.
pub fn normalize_dir(input: &str) -> crate::Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed == ROOT {
        return Ok(ROOT.to_string());
    }

    let mut parts = Vec::new();
    for part in trimmed.split('/') {
        match part {
            "" => continue,
            "." | ".." => {
                return Err(crate::Error::InvalidPath(format!(
                    "relative component in '{input}'"
                )));
            }
            p if p.chars().any(|c| c.is_control() || INVALID_NAME_CHARS.contains(&c)) => {
                return Err(crate::Error::InvalidPath(format!(
                    "illegal character in '{input}'"
                )));
            }
            p => parts.push(p),
        }
    }

    if parts.is_empty() {
        return Ok(ROOT.to_string());
    }
    Ok(format!("/{}", parts.join("/")))
}

/// Sanitize a user-supplied file or folder name.
///
/// Strips path separators and other reserved characters, removes `..`
/// sequences and surrounding whitespace. Fails if nothing usable remains.
pub fn sanitize_name(raw: &str) -> crate::Result<String> {
    let stripped: String = raw
        .chars()
        .filter(|c| !INVALID_NAME_CHARS.contains(c) && !c.is_control())
        .collect();
    let mut name = stripped.replace("..", "");
    name = name.trim().to_string();

    if name.is_empty() || name == "." {
        return Err(crate::Error::InvalidName(format!(
            "'{raw}' is empty after sanitizing"
        )));
    }
    Ok(name)
}

/// Extension of a name (text after the last dot), if it has one.
///
/// Dot-files such as `.bashrc` have no extension.
pub fn extension(name: &str) -> Option<&str> {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => Some(&name[idx + 1..]),
        _ => None,
    }
}

/// Replace the trailing component of `path` with `new_name`.
pub fn with_file_name(path: &str, new_name: &str) -> String {
    join(directory_of(path), new_name)
}
