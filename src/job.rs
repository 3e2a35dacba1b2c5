//! Per-job state: identifier, derived parameters and frame-file ownership.
//!
//! A [`PipelineJob`] lives exactly as long as one `convert` call. It owns no
//! resources beyond the frame files it claims; [`PipelineJob::dispose_frames`]
//! deletes all of them and is called by the coordinator on every exit path.

use crate::config::{ConversionRequest, FrameRate};
use crate::output::FrameArtifact;
use crate::pipeline::cleanup;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static SEQUENCE: AtomicU32 = AtomicU32::new(0);

/// Generate a time-based job identifier, e.g. `lx2k9c1q-2n5-0`.
///
/// Base-36 milliseconds since the epoch, then the process id and a
/// per-process sequence number, so two jobs started in the same millisecond
/// (in this process or another) still get distinct names.
pub fn new_job_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!(
        "{}-{}-{}",
        base36(millis),
        base36(u64::from(std::process::id())),
        base36(u64::from(seq))
    )
}

fn base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".into();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Run-time aggregate of one conversion.
#[derive(Debug)]
pub struct PipelineJob {
    pub id: String,
    pub request: ConversionRequest,
    pub frame_rate: FrameRate,
    /// Page-ordered frames, filled in by the rasterization stage.
    pub frames: Vec<FrameArtifact>,
    /// Every frame path this job may have written, produced or not.
    claimed: Vec<PathBuf>,
}

impl PipelineJob {
    pub fn new(request: ConversionRequest, frame_rate: FrameRate) -> Self {
        Self::with_id(new_job_id(), request, frame_rate)
    }

    pub fn with_id(
        id: impl Into<String>,
        request: ConversionRequest,
        frame_rate: FrameRate,
    ) -> Self {
        Self {
            id: id.into(),
            request,
            frame_rate,
            frames: Vec::new(),
            claimed: Vec::new(),
        }
    }

    /// `<temp_dir>/<job_id>_<page>.<ext>`.
    pub fn frame_path(&self, page: usize, ext: &str) -> PathBuf {
        self.request
            .temp_dir
            .join(format!("{}_{}.{}", self.id, page, ext))
    }

    /// Reserve the frame path for `page`; it will be deleted on disposal
    /// whether or not a file ever appears there.
    pub fn claim_frame(&mut self, page: usize, ext: &str) -> PathBuf {
        let path = self.frame_path(page, ext);
        self.claimed.push(path.clone());
        path
    }

    pub fn claimed_frames(&self) -> &[PathBuf] {
        &self.claimed
    }

    /// `<job_id>.<ext>`.
    pub fn video_name(&self, ext: &str) -> String {
        format!("{}.{}", self.id, ext)
    }

    pub fn video_path(&self, ext: &str) -> PathBuf {
        self.request.output_dir.join(self.video_name(ext))
    }

    /// Delete every claimed frame file. Best effort; returns how many files
    /// were actually removed.
    pub async fn dispose_frames(&mut self) -> usize {
        let removed = cleanup::dispose_frames(&self.claimed).await;
        self.claimed.clear();
        self.frames.clear();
        removed
    }
}
