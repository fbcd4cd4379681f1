//! Filesystem actions: clean, copy, create and delete

use crate::core::error::{PipelineError, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Files under `cwd` matching any of the glob patterns, sorted and deduplicated.
///
/// Directories are never returned; a `**` pattern matches the files inside them.
pub fn expand_patterns(cwd: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut matches = BTreeSet::new();

    for pattern in patterns {
        let full = rooted_pattern(cwd, pattern);
        let entries = glob::glob(&full).map_err(|e| {
            PipelineError::InvalidConfig(format!("invalid file pattern '{}': {}", pattern, e))
        })?;

        for entry in entries {
            let path = entry.map_err(|e| {
                PipelineError::io(format!("Failed to read {}", e.path().display()), e.into_error())
            })?;
            if path.is_file() {
                matches.insert(path);
            }
        }
    }

    Ok(matches.into_iter().collect())
}

/// `pattern` under `cwd`, with glob metacharacters in `cwd` taken literally
fn rooted_pattern(cwd: &Path, pattern: &str) -> String {
    let root = cwd.to_string_lossy();
    if Path::new(pattern).is_absolute() || root.is_empty() {
        return pattern.to_string();
    }
    format!("{}/{}", glob::Pattern::escape(root.trim_end_matches('/')), pattern)
}

/// Copy matched files into `dest`, keeping their layout relative to `cwd`.
///
/// Returns the number of files copied.
pub fn copy_matching(cwd: &Path, patterns: &[String], dest: &Path) -> Result<usize> {
    let files = expand_patterns(cwd, patterns)?;

    for file in &files {
        let relative = file.strip_prefix(cwd).unwrap_or(file);
        let target = dest.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PipelineError::io(format!("Failed to create {}", parent.display()), e))?;
        }
        std::fs::copy(file, &target).map_err(|e| {
            PipelineError::io(
                format!("Failed to copy {} to {}", file.display(), target.display()),
                e,
            )
        })?;
        debug!("Copied {} -> {}", file.display(), target.display());
    }

    info!("Copied {} file(s) from {} to {}", files.len(), cwd.display(), dest.display());
    Ok(files.len())
}

/// Remove each path if it exists, whether a file or a directory tree
pub fn clean(paths: &[PathBuf]) -> Result<usize> {
    let mut removed = 0;
    for path in paths {
        if path.is_dir() {
            std::fs::remove_dir_all(path)
                .map_err(|e| PipelineError::io(format!("Failed to remove {}", path.display()), e))?;
        } else if path.exists() {
            std::fs::remove_file(path)
                .map_err(|e| PipelineError::io(format!("Failed to remove {}", path.display()), e))?;
        } else {
            continue;
        }
        debug!("Removed {}", path.display());
        removed += 1;
    }
    Ok(removed)
}

/// Create directories and their parents; existing directories are left alone
pub fn create_dirs(paths: &[PathBuf]) -> Result<()> {
    for path in paths {
        std::fs::create_dir_all(path)
            .map_err(|e| PipelineError::io(format!("Failed to create {}", path.display()), e))?;
    }
    Ok(())
}

/// Delete a directory tree. A missing directory is not an error.
pub fn delete_dir(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    std::fs::remove_dir_all(path)
        .map_err(|e| PipelineError::io(format!("Failed to delete {}", path.display()), e))?;
    info!("Deleted {}", path.display());
    Ok(true)
}
