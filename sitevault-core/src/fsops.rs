/*!
Filesystem tree operations shared by the archive, backup and restore paths.

One exclusion filter type drives the three destructive/duplicative walks
(copy, clear, archive-add) so traversal rules cannot drift apart.
*/

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use crate::{paths, Result};

/// Exclusion rules applied during tree walks: absolute path prefixes and
/// bare entry names, both matched against normalized paths.
#[derive(Debug, Clone, Default)]
pub struct WalkFilter {
    prefixes: Vec<PathBuf>,
    names: Vec<String>,
}

impl WalkFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclude everything at or below the given path.
    pub fn with_prefix<P: AsRef<Path>>(mut self, prefix: P) -> Self {
        let p = paths::normalize(prefix);
        if !p.as_os_str().is_empty() {
            self.prefixes.push(p);
        }
        self
    }

    /// Exclude any entry with the given file name, at any depth.
    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.names.push(name.into());
        self
    }

    /// Whether the filter excludes this path.
    pub fn excludes<P: AsRef<Path>>(&self, path: P) -> bool {
        let path = paths::normalize(path);
        if self
            .prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix))
        {
            return true;
        }
        match path.file_name() {
            Some(name) => self.names.iter().any(|n| name == n.as_str()),
            None => false,
        }
    }
}

/// Recursively copy `source` into `destination`, skipping symbolic links and
/// anything the filter excludes. Individual file copy failures are logged and
/// skipped rather than aborting the whole tree, matching the best-effort
/// contract of content restoration.
pub fn copy_tree(source: &Path, destination: &Path, filter: &WalkFilter) -> Result<()> {
    paths::ensure_dir(destination)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let src = entry.path();
        if filter.excludes(&src) {
            continue;
        }
        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            continue;
        }
        let dst = destination.join(entry.file_name());
        if file_type.is_dir() {
            copy_tree(&src, &dst, filter)?;
        } else if let Err(e) = fs::copy(&src, &dst) {
            warn!(src = %src.display(), dst = %dst.display(), error = %e, "file copy skipped");
        }
    }
    Ok(())
}

/// Delete every direct child of `root` not excluded by the filter;
/// directories are removed recursively. Failures on individual entries are
/// logged and skipped.
pub fn clear_children(root: &Path, filter: &WalkFilter) -> Result<()> {
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if filter.excludes(&path) {
            continue;
        }
        let outcome = if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        if let Err(e) = outcome {
            warn!(path = %path.display(), error = %e, "removal skipped");
        }
    }
    Ok(())
}

/// Recursively remove a directory tree; a missing tree is not an error.
pub fn remove_tree(path: &Path) {
    if path.is_dir() {
        if let Err(e) = fs::remove_dir_all(path) {
            warn!(path = %path.display(), error = %e, "tree removal failed");
        }
    }
}

/// Breadth-first search for a directory with the exact given name, bounded by
/// `max_depth` levels below `root`. Returns the first match.
pub fn find_dir_named(root: &Path, name: &str, max_depth: usize) -> Option<PathBuf> {
    let mut queue: VecDeque<(PathBuf, usize)> = VecDeque::new();
    queue.push_back((root.to_path_buf(), 0));
    while let Some((dir, depth)) = queue.pop_front() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if path.file_name().is_some_and(|n| n == name) {
                return Some(paths::normalize(path));
            }
            if depth < max_depth {
                queue.push_back((path, depth + 1));
            }
        }
    }
    None
}

/// Find the first file under `root` carrying the given extension.
pub fn find_file_with_extension(root: &Path, extension: &str) -> Option<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| {
            e.file_type().is_file()
                && e.path()
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        })
        .map(|e| e.into_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_copy_tree_with_exclusions() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write(&src.join("keep/a.txt"), "a");
        write(&src.join("skip/b.txt"), "b");
        write(&src.join("named/c.txt"), "c");

        let filter = WalkFilter::new()
            .with_prefix(src.join("skip"))
            .with_name("named");
        copy_tree(&src, &dst, &filter).unwrap();

        assert_eq!(fs::read_to_string(dst.join("keep/a.txt")).unwrap(), "a");
        assert!(!dst.join("skip").exists());
        assert!(!dst.join("named").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_tree_skips_symlinks() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write(&src.join("real.txt"), "x");
        std::os::unix::fs::symlink(src.join("real.txt"), src.join("link.txt")).unwrap();

        copy_tree(&src, &dst, &WalkFilter::new()).unwrap();
        assert!(dst.join("real.txt").exists());
        assert!(!dst.join("link.txt").exists());
    }

    #[test]
    fn test_clear_children_preserves_excluded() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(&root.join("gone/a.txt"), "a");
        write(&root.join("kept/b.txt"), "b");
        write(&root.join("loose.txt"), "c");

        let filter = WalkFilter::new().with_prefix(root.join("kept"));
        clear_children(root, &filter).unwrap();

        assert!(!root.join("gone").exists());
        assert!(!root.join("loose.txt").exists());
        assert!(root.join("kept/b.txt").exists());
    }

    #[test]
    fn test_find_dir_named_bounded() {
        let tmp = TempDir::new().unwrap();
        let deep = tmp.path().join("a/b/wp-content");
        fs::create_dir_all(&deep).unwrap();

        let found = find_dir_named(tmp.path(), "wp-content", 3).unwrap();
        assert_eq!(found, paths::normalize(&deep));
        assert!(find_dir_named(tmp.path(), "wp-content", 0).is_none());
    }

    #[test]
    fn test_find_file_with_extension() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("nested/dump.SQL"), "SELECT 1;");
        let found = find_file_with_extension(tmp.path(), "sql").unwrap();
        assert!(found.ends_with("nested/dump.SQL"));
        assert!(find_file_with_extension(tmp.path(), "zip").is_none());
    }
}
