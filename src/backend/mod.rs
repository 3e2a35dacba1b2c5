//! External collaborators of the pipeline.
//!
//! The pipeline only sequences work; parsing, rasterizing and encoding are
//! delegated to implementations of the traits below. The crate ships one
//! implementation of each:
//!
//! | Trait | Implementation |
//! |-------|----------------|
//! | [`DocumentParser`] | [`pdfium::PdfiumBackend`] |
//! | [`PageRasterizer`] | [`pdfium::PdfiumBackend`] |
//! | [`VideoEncoder`]   | [`ffmpeg::FfmpegEncoder`] |
//!
//! Swap any of them in via [`crate::Pipeline::with_backends`], e.g. to use a
//! different renderer or to test the pipeline without native libraries.

pub mod ffmpeg;
pub mod pdfium;

use crate::config::{FrameFormat, FrameRate};
use crate::error::Result;
use crate::output::{DocumentInfo, FrameArtifact};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncRead;

/// Reads page count and a representative page size from raw document bytes.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    /// Parse `bytes`. `source_name` is only used in error messages.
    ///
    /// # Errors
    /// [`crate::Pdf2VideoError::Parse`] for unreadable or corrupt input.
    async fn parse(&self, source_name: &str, bytes: &[u8]) -> Result<DocumentInfo>;
}

/// One page to rasterize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based page index.
    pub page: usize,
    pub width: u32,
    pub height: u32,
    /// Where the frame image must be written.
    pub output_path: PathBuf,
    pub format: FrameFormat,
}

/// Renders single pages to image files.
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    /// Render `request.page` of `document` at exactly `width × height` into
    /// `request.output_path`.
    ///
    /// # Errors
    /// [`crate::Pdf2VideoError::Rasterize`] on conversion or write failure.
    async fn rasterize_page(&self, document: &Path, request: PageRequest) -> Result<FrameArtifact>;
}

/// Opens one encoding session per job.
#[async_trait]
pub trait VideoEncoder: Send + Sync {
    /// Start a session writing a video at `frame_rate` to `output_path`.
    async fn open(
        &self,
        frame_rate: FrameRate,
        output_path: &Path,
    ) -> Result<Box<dyn EncoderSession>>;
}

/// A live encoder accepting image frames in presentation order.
#[async_trait]
pub trait EncoderSession: Send {
    /// Stream one complete frame image from `frame`. Returns the bytes written.
    async fn write_frame(&mut self, frame: &mut (dyn AsyncRead + Unpin + Send)) -> Result<u64>;

    /// Signal end of input and wait for the video to be finalised.
    async fn finish(&mut self) -> Result<()>;

    /// Stop encoding without producing a usable video.
    async fn abort(&mut self);
}
