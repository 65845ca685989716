//! Build an artifact batch from local files and directories.
//!
//! Files contribute their own file name; directories are walked and each
//! file below contributes its slash-separated path relative to the walked
//! directory. Names must be unique across the whole batch.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

use crate::storage::ArtifactInput;

/// Errors collecting a batch
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("duplicate artifact name '{name}' ({first} and {second})")]
    DuplicateName {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("not a file or directory: {0}")]
    Unsupported(PathBuf),
}

/// Collect artifacts for `paths`, sorted by name.
pub fn collect_artifacts(paths: &[PathBuf]) -> Result<Vec<ArtifactInput>, BatchError> {
    let mut by_name: BTreeMap<String, (PathBuf, u64)> = BTreeMap::new();

    for path in paths {
        let metadata = path.metadata().map_err(|source| BatchError::Io {
            path: path.clone(),
            source,
        })?;

        if metadata.is_file() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| BatchError::Unsupported(path.clone()))?;
            add(&mut by_name, name, path.clone(), metadata.len())?;
        } else if metadata.is_dir() {
            for entry in WalkDir::new(path)
                .follow_links(false)
                .sort_by(|a, b| a.file_name().cmp(b.file_name()))
            {
                let entry = entry?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let size = entry.metadata()?.len();
                let name = relative_name(path, entry.path())
                    .ok_or_else(|| BatchError::Unsupported(entry.path().to_path_buf()))?;
                add(&mut by_name, name, entry.path().to_path_buf(), size)?;
            }
        } else {
            return Err(BatchError::Unsupported(path.clone()));
        }
    }

    Ok(by_name
        .into_iter()
        .map(|(name, (path, size))| ArtifactInput::new(name, path.to_string_lossy(), size))
        .collect())
}

fn add(
    by_name: &mut BTreeMap<String, (PathBuf, u64)>,
    name: String,
    path: PathBuf,
    size: u64,
) -> Result<(), BatchError> {
    if let Some((first, _)) = by_name.get(&name) {
        return Err(BatchError::DuplicateName {
            first: first.clone(),
            second: path,
            name,
        });
    }
    by_name.insert(name, (path, size));
    Ok(())
}

fn relative_name(root: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
