//! Input file discovery and completion marking

use regex::Regex;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default file name pattern: a dot-free base name with `.tsv.gz`
pub const DEFAULT_PATTERN: &str = r"^[^.]+\.tsv\.gz$";

/// Prefix that marks a file as already loaded
pub const PROCESSED_MARKER: char = '.';

/// Regular files directly under `dir` whose name matches `pattern`, sorted
pub fn discover(dir: &Path, pattern: &Regex) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }

        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            debug!(path = %entry.path().display(), "Skipping non UTF-8 file name");
            continue;
        };

        if pattern.is_match(name) {
            files.push(entry.path());
        }
    }

    files.sort();
    Ok(files)
}

pub fn is_processed(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(PROCESSED_MARKER))
}

/// Rename `path` to its dot-prefixed sibling and return the new path
///
/// Already marked files are returned unchanged.
pub fn mark_processed(path: &Path) -> io::Result<PathBuf> {
    if is_processed(path) {
        return Ok(path.to_path_buf());
    }

    let name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no file name", path.display()),
        )
    })?;

    let mut marked_name = std::ffi::OsString::from(PROCESSED_MARKER.to_string());
    marked_name.push(name);
    let marked = path.with_file_name(marked_name);

    std::fs::rename(path, &marked)?;
    Ok(marked)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn test_discover_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        for name in [
            "20170929000200.tsv.gz",
            "20170929000000.tsv.gz",
            ".20170929000100.tsv.gz",
            "notes.txt",
            "a.b.tsv.gz",
        ] {
            touch(dir.path(), name);
        }
        std::fs::create_dir(dir.path().join("nested.tsv.gz")).unwrap();

        let pattern = Regex::new(DEFAULT_PATTERN).unwrap();
        let names: Vec<_> = discover(dir.path(), &pattern)
            .unwrap()
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["20170929000000.tsv.gz", "20170929000200.tsv.gz"]);
    }

    #[test]
    fn test_discover_missing_dir() {
        let dir = TempDir::new().unwrap();
        let pattern = Regex::new(DEFAULT_PATTERN).unwrap();
        assert!(discover(&dir.path().join("absent"), &pattern).is_err());
    }

    #[test]
    fn test_mark_processed_renames_once() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.tsv.gz");

        let marked = mark_processed(&dir.path().join("a.tsv.gz")).unwrap();
        assert_eq!(marked, dir.path().join(".a.tsv.gz"));
        assert!(marked.exists());
        assert!(!dir.path().join("a.tsv.gz").exists());

        // marking again is a no-op
        assert_eq!(mark_processed(&marked).unwrap(), marked);
        assert!(marked.exists());
    }

    #[test]
    fn test_mark_processed_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(mark_processed(&dir.path().join("gone.tsv.gz")).is_err());
    }
}
