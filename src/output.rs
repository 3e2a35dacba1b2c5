//! Data types produced by the pipeline.

use crate::config::FrameRate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Page count and representative page size of a parsed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    /// Number of pages, always ≥ 1.
    pub page_count: usize,
    /// Width of the sampled page in document units (points for PDF), ≥ 1.
    pub width: u32,
    /// Height of the sampled page in document units, ≥ 1.
    pub height: u32,
}

impl DocumentInfo {
    /// 1-based index of the page whose size stands in for the whole document.
    ///
    /// The middle page rather than page 1: covers of books and brochures often
    /// have a different aspect ratio than the interior pages.
    pub fn sample_page(page_count: usize) -> usize {
        page_count.div_ceil(2).max(1)
    }

    /// Output frame width for `target_height`, keeping the sampled page's
    /// aspect ratio: `round(target_height * width / height)`.
    pub fn scaled_width(&self, target_height: u32) -> u32 {
        let width = (f64::from(target_height) * f64::from(self.width) / f64::from(self.height))
            .round();
        (width as u32).max(1)
    }
}

/// One rasterized page on local storage.
///
/// Owned by the job that produced it until the coordinator deletes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameArtifact {
    /// 1-based page index, unique within a job.
    pub page: usize,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// File size in bytes.
    pub byte_size: u64,
}

/// Wall-clock timings of a finished conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionStats {
    pub raster_secs: f64,
    pub render_secs: f64,
    pub total_secs: f64,
    /// Sum of the frame files' sizes in bytes.
    pub frame_bytes: u64,
}

/// Result of a successful conversion.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutput {
    /// Identifier shared by the job's frame files and the video file stem.
    pub job_id: String,
    /// File name of the produced video, `<job_id>.<ext>`.
    pub video_name: String,
    /// Full path of the produced video.
    pub video_path: PathBuf,
    pub document: DocumentInfo,
    /// Frame size the pages were rasterized to.
    pub frame_width: u32,
    pub frame_height: u32,
    pub frame_rate: FrameRate,
    pub stats: ConversionStats,
}
