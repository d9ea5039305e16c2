use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResultsDirError {
    #[error("{} exists but is not a directory", path.display())]
    NotADirectory { path: PathBuf },

    #[error("cannot create {}: {source}", path.display())]
    Create { path: PathBuf, source: io::Error },

    #[error("cannot read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
}

/// Make `path` an existing, empty directory before any probe starts.
///
/// A missing directory is created. Existing entries are removed; an entry
/// that cannot be removed is logged and left behind.
pub fn prepare_results_dir(path: &Path) -> Result<(), ResultsDirError> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(path).map_err(|source| ResultsDirError::Create {
                path: path.to_path_buf(),
                source,
            })?;
            log::debug!("Created results directory {}", path.display());
            return Ok(());
        }
        Err(source) => {
            return Err(ResultsDirError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    if !metadata.is_dir() {
        return Err(ResultsDirError::NotADirectory {
            path: path.to_path_buf(),
        });
    }

    let entries = fs::read_dir(path).map_err(|source| ResultsDirError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    for entry in entries.flatten() {
        let entry_path = entry.path();
        let removed = match entry.file_type() {
            Ok(kind) if kind.is_dir() => fs::remove_dir_all(&entry_path),
            _ => fs::remove_file(&entry_path),
        };
        if let Err(err) = removed {
            log::warn!("Could not remove {}: {err}", entry_path.display());
        }
    }

    Ok(())
}
