use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::StoreError;

/// Walks the directory referenced by `dir` recursively up to a depth of 5.
fn walk_dirs_for(p: &Path, dir: &Path) -> Option<PathBuf> {
    let walk = WalkDir::new(dir)
        .follow_links(true)
        .max_depth(5)
        .into_iter()
        .filter_map(|e| {
            if let Ok(d) = e {
                if d.file_type().is_dir() {
                    return Some(d);
                }
            }

            None
        });

    for entry in walk {
        let mut possible_path = entry.into_path();
        possible_path.push(p);

        if possible_path.is_dir() {
            return Some(possible_path);
        }
    }

    None
}

/// A query store root that is either:
///   1. A valid absolute or relative path from the current working directory.
///   2. A valid path postfix somewhere under the crate's manifest directory,
///      its parent (the workspace root), or the current working directory.
///
/// This allows the store to be referenced as `workloads` independent of the
/// directory a binary or test is run from.
pub fn store_path(p: &Path) -> Result<PathBuf, StoreError> {
    if p.is_absolute() || p.exists() {
        return Ok(p.to_owned());
    }

    if let Ok(dir) = std::env::var("CARGO_MANIFEST_DIR") {
        let manifest_dir: &Path = dir.as_ref();
        if let Some(path) = walk_dirs_for(p, manifest_dir) {
            return Ok(path);
        }
        if let Some(parent) = manifest_dir.parent() {
            if let Some(path) = walk_dirs_for(p, parent) {
                return Ok(path);
            }
        }
    }

    if let Ok(dir) = std::env::current_dir() {
        if let Some(path) = walk_dirs_for(p, &dir) {
            return Ok(path);
        }
    }

    Err(StoreError::StoreNotFound(p.to_owned()))
}
