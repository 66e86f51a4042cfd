//! Path normalization utilities.
//!
//! Dependency lookups compare paths from two different worlds: paths the
//! render pipeline resolved while reading files, and paths the filesystem
//! watcher reported. Both sides are funneled through [`normalize_path`] so
//! that symlinked or relative spellings of the same file always collide.

use std::path::{Path, PathBuf};

/// Normalize a file system path to absolute form.
///
/// Tries `canonicalize()` first (resolves symlinks, `.`, `..`).
/// Falls back to:
/// - Return as-is if already absolute
/// - Join with current directory if relative
#[inline]
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_absolute() {
        let path = Path::new("/absolute/path/file.txt");
        let normalized = normalize_path(path);
        assert!(normalized.is_absolute());
    }

    #[test]
    fn test_normalize_path_relative() {
        let path = Path::new("relative/path/file.txt");
        let normalized = normalize_path(path);
        assert!(normalized.is_absolute());
    }

    #[test]
    fn test_normalize_path_resolves_symlinks() {
        #[cfg(unix)]
        {
            let temp = tempfile::TempDir::new().unwrap();
            let target = temp.path().join("target.css");
            std::fs::write(&target, "body{}").unwrap();
            let link = temp.path().join("link.css");
            std::os::unix::fs::symlink(&target, &link).unwrap();

            assert_eq!(normalize_path(&link), normalize_path(&target));
        }
    }
}
