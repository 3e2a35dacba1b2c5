//! Deleting temporary frame files.
//!
//! Two entry points with different triggers:
//!
//! * [`dispose_frames`] runs at the end of every job, success or failure,
//!   over the exact paths that job claimed.
//! * [`sweep_stale_frames`] is a backstop for crashed jobs that never reached
//!   their own disposal. It removes anything in the temp directory older than
//!   a fixed age. Scheduling it periodically is up to the host.
//!
//! Neither ever fails a conversion: a file that cannot be deleted is logged
//! and left behind for the next sweep.

use crate::error::{Pdf2VideoError, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Age after which [`sweep_stale_frames`] considers a temp file orphaned.
pub const DEFAULT_STALE_AGE: Duration = Duration::from_secs(3600);

/// Delete `paths`, ignoring files that do not exist. Returns the number of
/// files actually removed.
pub async fn dispose_frames(paths: &[PathBuf]) -> usize {
    let mut removed = 0;
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Could not delete frame {}: {}", path.display(), e),
        }
    }
    debug!("Disposed {} of {} claimed frames", removed, paths.len());
    removed
}

/// Remove a partially written output file after a failed encode.
pub async fn discard_partial_output(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed partial output {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Could not delete partial output {}: {}", path.display(), e),
    }
}

/// Result of one [`sweep_stale_frames`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
}

/// Delete regular files directly inside `dir` whose modification time is at
/// least `max_age` ago.
///
/// # Errors
/// Only if `dir` itself cannot be listed. Per-file failures are logged.
pub async fn sweep_stale_frames(dir: &Path, max_age: Duration) -> Result<SweepReport> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| Pdf2VideoError::io(dir, e))?;
    let mut report = SweepReport::default();

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Pdf2VideoError::io(dir, e))?
    {
        let path = entry.path();
        let meta = match entry.metadata().await {
            Ok(m) if m.is_file() => m,
            Ok(_) => continue,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };
        report.scanned += 1;

        // Files stamped in the future (clock skew) count as fresh.
        let age = meta
            .modified()
            .ok()
            .and_then(|t| t.elapsed().ok())
            .unwrap_or(Duration::ZERO);
        if age < max_age {
            continue;
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => report.removed += 1,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Could not delete stale file {}: {}", path.display(), e),
        }
    }

    info!(
        "Swept {}: removed {}/{} files older than {}s",
        dir.display(),
        report.removed,
        report.scanned,
        max_age.as_secs()
    );
    Ok(report)
}
