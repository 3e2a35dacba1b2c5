//! Pipeline stages for PDF-to-video conversion.
//!
//! Each submodule implements exactly one step; [`crate::convert::Pipeline`]
//! sequences them for a job.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ raster ──────────────▶ encode ──▶ cleanup
//! (path)    (parse + N pages,      (ffmpeg    (delete frames,
//!            executor-bounded)      stdin)     sweep stale)
//! ```
//!
//! 1. [`input`]    — check the source path, read it for the parser
//! 2. [`raster`]   — parse the document, render one frame per page through
//!    the [`executor`] at a bounded concurrency
//! 3. [`encode`]   — stream the frames in page order into one encoder session
//! 4. [`cleanup`]  — dispose of the job's frames; sweep orphans of crashed jobs

pub mod cleanup;
pub mod encode;
pub mod executor;
pub mod input;
pub mod raster;
