/*!
Path normalization, containment checks and directory assurance.

All comparisons in the engine go through [`normalize`] so that prefix checks
behave identically regardless of separator style or trailing slashes.
*/

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::{Result, VaultError};

/// Lexically normalize a path: resolve `.` and `..` components without
/// touching the filesystem and drop any trailing separator.
///
/// `..` at the root is dropped rather than preserved; the engine never
/// operates on paths above the ones it is handed.
pub fn normalize<P: AsRef<Path>>(path: P) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.as_ref().components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if !matches!(
                    out.components().next_back(),
                    None | Some(Component::RootDir) | Some(Component::Prefix(_))
                ) {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Ensure a directory exists, creating it and any missing parents.
pub fn ensure_dir<P: AsRef<Path>>(dir: P) -> Result<()> {
    let dir = normalize(dir);
    if !dir.is_dir() {
        fs::create_dir_all(&dir).map_err(|e| {
            VaultError::validation(format!("failed to create directory {}: {e}", dir.display()))
        })?;
    }
    Ok(())
}

/// Whether `child` is equal to or contained within `parent`, compared on
/// normalized components.
pub fn is_subpath<A: AsRef<Path>, B: AsRef<Path>>(child: A, parent: B) -> bool {
    normalize(child).starts_with(normalize(parent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_resolves_dots() {
        assert_eq!(normalize("/a/b/../c/./d"), PathBuf::from("/a/c/d"));
        assert_eq!(normalize("/a/b/"), PathBuf::from("/a/b"));
        assert_eq!(normalize("a/../../b"), PathBuf::from("b"));
    }

    #[test]
    fn test_normalize_parent_at_root() {
        assert_eq!(normalize("/../etc"), PathBuf::from("/etc"));
    }

    #[test]
    fn test_is_subpath() {
        assert!(is_subpath("/a/b/c", "/a/b"));
        assert!(is_subpath("/a/b", "/a/b/"));
        assert!(!is_subpath("/a/bc", "/a/b"));
        assert!(!is_subpath("/a", "/a/b"));
    }

    #[test]
    fn test_ensure_dir_creates_nested() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("x/y/z");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
        // Second call is a no-op
        ensure_dir(&nested).unwrap();
    }
}
