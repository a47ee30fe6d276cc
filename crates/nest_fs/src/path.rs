//! Slash-delimited virtual paths and mount segmentation

use crate::format::is_supported_archive;

/// Normalize a requested path relative to a store root.
///
/// Separators become `/`, `.` and empty components are dropped and `..` pops a
/// component without ever climbing above the root. The root itself is `""`.
pub fn clean(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for component in path.split(['/', '\\']) {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }

    parts.join("/")
}

/// Last component of a cleaned path (`""` for the root)
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Parent of a cleaned path (`""` for top-level entries and the root)
pub fn parent(path: &str) -> &str {
    path.rfind('/').map(|i| &path[..i]).unwrap_or("")
}

pub fn join(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else if name.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, name)
    }
}

/// If `component` is `<archive-name><suffix>`, return the archive name
pub fn strip_mount_suffix<'a>(component: &'a str, suffix: &str) -> Option<&'a str> {
    let name = component.strip_suffix(suffix)?;
    (!name.is_empty() && is_supported_archive(name)).then_some(name)
}

/// Split a path at every mount boundary.
///
/// Each segment but the last ends with a synthetic component, e.g.
/// `a/outer.zip-dir/inner.tar.gz-dir/x.txt` becomes
/// `["a/outer.zip-dir", "inner.tar.gz-dir", "x.txt"]`. A path ending on a mount
/// boundary yields a trailing empty segment (the mounted root).
pub fn split_mounts(path: &str, suffix: &str) -> Vec<String> {
    let cleaned = clean(path);
    let mut segments = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for component in cleaned.split('/').filter(|c| !c.is_empty()) {
        current.push(component);
        if strip_mount_suffix(component, suffix).is_some() {
            segments.push(current.join("/"));
            current.clear();
        }
    }
    segments.push(current.join("/"));

    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean() {
        assert_eq!(clean("/a/./b/../c/"), "a/c");
        assert_eq!(clean("a\\b"), "a/b");
        assert_eq!(clean("../../etc/passwd"), "etc/passwd");
        assert_eq!(clean("/"), "");
        assert_eq!(clean(""), "");
    }

    #[test]
    fn test_file_name_and_parent() {
        assert_eq!(file_name("a/b/c.txt"), "c.txt");
        assert_eq!(file_name("c.txt"), "c.txt");
        assert_eq!(parent("a/b/c.txt"), "a/b");
        assert_eq!(parent("c.txt"), "");
        assert_eq!(join("", "x"), "x");
        assert_eq!(join("a", "x"), "a/x");
    }

    #[test]
    fn test_split_without_mounts() {
        assert_eq!(split_mounts("a/b.txt", "-dir"), vec!["a/b.txt"]);
        assert_eq!(split_mounts("", "-dir"), vec![""]);
        // Only archive names followed by the suffix are boundaries
        assert_eq!(split_mounts("notes-dir/x", "-dir"), vec!["notes-dir/x"]);
    }

    #[test]
    fn test_split_nested_mounts() {
        assert_eq!(
            split_mounts("outer.zip-dir/inner.tar.gz-dir/x.txt", "-dir"),
            vec!["outer.zip-dir", "inner.tar.gz-dir", "x.txt"]
        );
        assert_eq!(
            split_mounts("/pub/data.ZIP-dir/sub/f", "-dir"),
            vec!["pub/data.ZIP-dir", "sub/f"]
        );
        assert_eq!(split_mounts("outer.zip-dir", "-dir"), vec!["outer.zip-dir", ""]);
        assert_eq!(
            split_mounts("outer.zip-dir/inner.tar.gz", "-dir"),
            vec!["outer.zip-dir", "inner.tar.gz"]
        );
    }

    #[test]
    fn test_strip_mount_suffix() {
        assert_eq!(strip_mount_suffix("a.7z-dir", "-dir"), Some("a.7z"));
        assert_eq!(strip_mount_suffix("-dir", "-dir"), None);
        assert_eq!(strip_mount_suffix("a.txt-dir", "-dir"), None);
        assert_eq!(strip_mount_suffix("a.7z", "-dir"), None);
    }
}
