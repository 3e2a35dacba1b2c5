//! Source resolution: check that a user-supplied document path is usable.
//!
//! Failing here, before any job state exists, gives callers a precise
//! `SourceNotFound` / `PermissionDenied` instead of an I/O error from deep
//! inside the rasterization stage. Content checks (is it really a PDF?) are
//! left to the [`crate::backend::DocumentParser`].

use crate::error::{Pdf2VideoError, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validate that `path` names a readable regular file.
pub async fn resolve_source(path: &Path) -> Result<PathBuf> {
    let meta = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            return Err(Pdf2VideoError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(_) => {
            return Err(Pdf2VideoError::SourceNotFound {
                path: path.to_path_buf(),
            })
        }
    };

    if !meta.is_file() {
        return Err(Pdf2VideoError::Validation(format!(
            "source '{}' is not a regular file",
            path.display()
        )));
    }

    // Check read permission by attempting to open
    match tokio::fs::File::open(path).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            return Err(Pdf2VideoError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(Pdf2VideoError::io(path, e)),
    }

    debug!("Resolved source document: {}", path.display());
    Ok(path.to_path_buf())
}

/// Read the whole source into memory for the parser.
pub async fn read_source(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => Pdf2VideoError::SourceNotFound {
            path: path.to_path_buf(),
        },
        ErrorKind::PermissionDenied => Pdf2VideoError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => Pdf2VideoError::io(path, e),
    })
}
