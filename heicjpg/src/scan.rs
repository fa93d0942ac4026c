//! Enumeration of HEIC inputs below a source directory

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

const HEIC_EXTENSION: &str = "heic";

pub fn is_heic(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(HEIC_EXTENSION))
}

/// Lazily yields HEIC files in `dir`. Anything else is skipped silently.
pub fn heic_files(dir: &Path, recursive: bool) -> impl Iterator<Item = PathBuf> {
    let max_depth = if recursive { usize::MAX } else { 1 };

    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(max_depth)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| {
            entry
                .map_err(|e| log::warn!("Failed to read directory entry: {}", e))
                .ok()
        })
        .filter(|entry| entry.file_type().is_file() && is_heic(entry.path()))
        .map(|entry| entry.into_path())
}
