//! Path string helpers: normalization, splitting, and joining.

use crate::error::FsError;
use crate::types::ROOT_PATH;

/// Normalize a slash-delimited path.
///
/// Produces a leading `/`, no trailing `/`, and drops empty and `.`
/// components. `..` is rejected since the hierarchy has no working directory.
pub fn normalize(path: &str) -> Result<String, FsError> {
    let mut parts = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => return Err(FsError::InvalidPath(path.to_string())),
            name => parts.push(name),
        }
    }
    if parts.is_empty() {
        return Ok(ROOT_PATH.to_string());
    }
    Ok(format!("/{}", parts.join("/")))
}

/// Split a normalized path into its components
pub fn components(path: &str) -> Vec<&str> {
    path.split('/').filter(|c| !c.is_empty()).collect()
}

/// Split a normalized path into (parent, name). Root has no parent.
pub fn split_parent(path: &str) -> Option<(String, String)> {
    if path == ROOT_PATH {
        return None;
    }
    let idx = path.rfind('/')?;
    let parent = if idx == 0 { ROOT_PATH.to_string() } else { path[..idx].to_string() };
    Some((parent, path[idx + 1..].to_string()))
}

/// Join a parent path with a child name
pub fn join(parent: &str, name: &str) -> String {
    if parent == ROOT_PATH {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Number of components in a normalized path (root is 0)
pub fn depth(path: &str) -> usize {
    components(path).len()
}

/// Resolve a symlink target literal against the directory holding the link.
///
/// Absolute targets are normalized as-is; relative targets are joined onto
/// `link_dir`, with `..` stepping up one level (never past root).
pub fn resolve_target(link_dir: &str, target: &str) -> String {
    let mut parts: Vec<&str> = if target.starts_with('/') {
        Vec::new()
    } else {
        components(link_dir)
    };
    for component in target.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            name => parts.push(name),
        }
    }
    if parts.is_empty() {
        ROOT_PATH.to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// Whether the last component names a file, judged by its extension.
///
/// A name whose only dot is the leading one (`.config`) is a hidden
/// directory; any other dot marks a file.
pub fn looks_like_file(path: &str) -> bool {
    let name = match path.rsplit('/').next() {
        Some(name) => name,
        None => return false,
    };
    match name.strip_prefix('.') {
        Some(rest) => rest.contains('.'),
        None => name.contains('.'),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("").unwrap(), "/");
        assert_eq!(normalize("/").unwrap(), "/");
        assert_eq!(normalize("a//b/").unwrap(), "/a/b");
        assert_eq!(normalize("/a/./b").unwrap(), "/a/b");
        assert!(normalize("/a/../b").is_err());
    }

    #[test]
    fn test_split_parent_and_join() {
        assert_eq!(split_parent("/a"), Some(("/".to_string(), "a".to_string())));
        assert_eq!(
            split_parent("/a/b.txt"),
            Some(("/a".to_string(), "b.txt".to_string()))
        );
        assert_eq!(split_parent("/"), None);
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("/a", "b"), "/a/b");
    }

    #[test]
    fn test_resolve_target() {
        assert_eq!(resolve_target("/a", "report.txt"), "/a/report.txt");
        assert_eq!(resolve_target("/a/b", "../c.txt"), "/a/c.txt");
        assert_eq!(resolve_target("/a", "/x/y"), "/x/y");
        assert_eq!(resolve_target("/", "../../z"), "/z");
    }

    #[test]
    fn test_looks_like_file() {
        assert!(looks_like_file("/a/report.txt"));
        assert!(!looks_like_file("/a/docs"));
        assert!(!looks_like_file("/a/.report_txt"));
        assert!(looks_like_file("/a/.env.local"));
    }
}
