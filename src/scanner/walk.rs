//! Image file discovery.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use crate::config::is_image_extension;

/// Lazily yield the image files under `root`.
///
/// Extensions are matched case-insensitively against the configured image
/// set. Symlinks to regular files are followed (walkdir skips symlink
/// cycles); files reachable through several names are deduplicated by
/// canonical path. Unreadable directories are logged and skipped.
pub fn find_image_files(root: &Path, recursive: bool) -> impl Iterator<Item = PathBuf> {
    let mut walker = WalkDir::new(root).follow_links(true);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut seen: HashSet<PathBuf> = HashSet::new();
    walker
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("Skipping unreadable entry: {}", err);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && has_image_extension(entry.path()))
        .filter_map(move |entry| {
            let resolved = match fs::canonicalize(entry.path()) {
                Ok(path) => path,
                Err(err) => {
                    warn!("Cannot resolve {}: {}", entry.path().display(), err);
                    return None;
                }
            };
            seen.insert(resolved.clone()).then_some(resolved)
        })
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(is_image_extension)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        File::create(path).unwrap();
    }

    #[test]
    fn test_filters_by_extension() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("photo.jpg"));
        touch(&dir.path().join("photo.PNG"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join("no_extension"));

        let mut found: Vec<_> = find_image_files(dir.path(), true)
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        found.sort();
        assert_eq!(found, vec!["photo.PNG", "photo.jpg"]);
    }

    #[test]
    fn test_recursive_descends_subdirectories() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("album");
        fs::create_dir(&sub).unwrap();
        touch(&dir.path().join("top.jpg"));
        touch(&sub.join("nested.jpg"));

        let found: Vec<_> = find_image_files(dir.path(), true).collect();
        assert_eq!(found.len(), 2);

        let shallow: Vec<_> = find_image_files(dir.path(), false).collect();
        assert_eq!(shallow.len(), 1);
        assert!(shallow[0].ends_with("top.jpg"));
    }

    #[test]
    fn test_missing_root_yields_nothing() {
        let dir = tempdir().unwrap();
        let gone = dir.path().join("nope");
        assert_eq!(find_image_files(&gone, true).count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_file_deduplicated() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("orig.jpg");
        touch(&target);
        std::os::unix::fs::symlink(&target, dir.path().join("alias.jpg")).unwrap();

        let found: Vec<_> = find_image_files(dir.path(), true).collect();
        assert_eq!(found.len(), 1);
    }
}
