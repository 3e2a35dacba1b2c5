//! # pdf2video
//!
//! Turn a PDF into a slideshow video: one frame per page, each shown for a
//! fixed duration.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Validate  frame rate from fps or seconds-per-frame (exactly one)
//!  ├─ 2. Parse     page count + size of the middle page (pdfium)
//!  ├─ 3. Raster    every page → <job>_<page>.png, bounded concurrency,
//!  │               re-sorted into page order
//!  ├─ 4. Encode    frames streamed in order into ffmpeg (image2pipe → mp4)
//!  └─ 5. Cleanup   frame files deleted on success *and* failure
//! ```
//!
//! Progress, benchmark and lifecycle notifications are published on a
//! broadcast channel; see [`PipelineEvent`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2video::{convert, ConcurrencyPolicy, ConversionRequest, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let request = ConversionRequest::builder("slides.pdf")
//!         .seconds_per_frame(4.0)
//!         .concurrency(ConcurrencyPolicy::Bounded(4))
//!         .build()?;
//!     let output = convert(&request, &PipelineConfig::default()).await?;
//!     println!("{} ({} pages)", output.video_path.display(), output.document.page_count);
//!     Ok(())
//! }
//! ```
//!
//! ## Native requirements
//!
//! | Tool | Used by | Located via |
//! |------|---------|-------------|
//! | libpdfium | parsing, rasterization | [`PipelineConfig::pdfium_library`], else system library path |
//! | ffmpeg    | encoding | [`EncoderSettings::ffmpeg_path`], else `PATH` |
//!
//! Both can be replaced through [`Pipeline::with_backends`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2video` binary (clap, anyhow, tracing-subscriber, indicatif, serde_json) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf2video = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod config;
pub mod convert;
pub mod error;
pub mod job;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{DocumentParser, EncoderSession, PageRasterizer, PageRequest, VideoEncoder};
pub use config::{
    ConcurrencyPolicy, ConversionRequest, ConversionRequestBuilder, EncoderSettings, FrameFormat,
    FrameRate, FrameTiming, PipelineConfig, PipelineConfigBuilder, PipelinePaths, Scheduling,
};
pub use convert::{convert, convert_from_bytes, convert_sync, inspect, Pipeline};
pub use error::{Pdf2VideoError, Result};
pub use output::{ConversionOutput, ConversionStats, DocumentInfo, FrameArtifact};
pub use pipeline::cleanup::{sweep_stale_frames, SweepReport, DEFAULT_STALE_AGE};
pub use progress::{
    Benchmark, BenchmarkKind, EventSink, PipelineEvent, ProgressEvent, ProgressTracker, Stage,
};
