//! Directory listing and recursive directory creation, matching
//! `IO::listDirectory`/`IO::createDirectory` in the original tool. See spec
//! §4.5.4/§4.5.5.

use std::fs;
use std::path::Path;

pub fn is_directory(path: &Path) -> bool {
    path.is_dir()
}

/// Lists the direct (non-recursive) contents of `path`, filtering out
/// hidden entries (leading `.`, matching the original's Linux-only check).
pub fn list_directory(path: &Path) -> Vec<String> {
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!("could not list directory {}: {err}", path.display());
            return Vec::new();
        }
    };

    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| !name.starts_with('.'))
        .collect()
}

pub fn file_size(path: &Path) -> std::io::Result<u64> {
    Ok(fs::metadata(path)?.len())
}

/// Creates every intermediate directory of `path`, matching the original's
/// `mkdir 0755` loop (Rust's `create_dir_all` does the same job in one
/// call).
pub fn create_directory_all(path: &str) {
    if path.is_empty() {
        return;
    }
    if let Err(err) = fs::create_dir_all(path) {
        tracing::warn!("could not create directory {path}: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_directory_filters_hidden_entries() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), b"").unwrap();
        fs::write(dir.path().join(".hidden"), b"").unwrap();

        let mut names = list_directory(dir.path());
        names.sort();
        assert_eq!(names, vec!["a".to_string()]);
    }

    #[test]
    fn create_directory_all_builds_nested_path() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        create_directory_all(nested.to_str().unwrap());
        assert!(nested.is_dir());
    }
}
