//! Error types for the pdf2video library.
//!
//! Every failure is fatal for the job that raised it: there are no retries
//! and no partial videos. [`Pdf2VideoError`] is returned by the top-level
//! `convert*` functions only after the coordinator has disposed of the job's
//! temporary frame files, so callers never have to clean up after an `Err`.
//!
//! The variants group into the categories the pipeline distinguishes:
//!
//! | Category | Variants |
//! |----------|----------|
//! | validation | [`Validation`](Pdf2VideoError::Validation), [`InvalidConfig`](Pdf2VideoError::InvalidConfig) |
//! | source document | [`SourceNotFound`](Pdf2VideoError::SourceNotFound), [`PermissionDenied`](Pdf2VideoError::PermissionDenied), [`Parse`](Pdf2VideoError::Parse) |
//! | rasterization | [`Rasterize`](Pdf2VideoError::Rasterize), [`PdfiumBindingFailed`](Pdf2VideoError::PdfiumBindingFailed) |
//! | encoding | [`Encode`](Pdf2VideoError::Encode), [`EncoderExited`](Pdf2VideoError::EncoderExited) |
//! | storage | [`Io`](Pdf2VideoError::Io) |

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf2video library.
#[derive(Debug, Error)]
pub enum Pdf2VideoError {
    // ── Request validation ───────────────────────────────────────────────
    /// Missing, conflicting or non-numeric frame-rate input.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Source document ──────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Source document not found: '{path}'\nCheck the path exists and is readable.")]
    SourceNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The document could not be parsed (corrupt, encrypted, not a PDF).
    #[error("Failed to parse '{source_name}': {detail}")]
    Parse { source_name: String, detail: String },

    // ── Rasterization ────────────────────────────────────────────────────
    /// A single page could not be rasterized; the whole job is abandoned.
    #[error("Rasterization failed for page {page}: {detail}")]
    Rasterize { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium system-wide, or point at an existing copy with\n\
  PDF2VIDEO_PDFIUM_LIB=/path/to/libpdfium.so\n"
    )]
    PdfiumBindingFailed(String),

    // ── Encoding ─────────────────────────────────────────────────────────
    /// The encoder session could not be opened or a frame could not be written.
    #[error("Video encoding failed: {0}")]
    Encode(String),

    /// The encoder process finished with a non-zero status.
    #[error("Encoder exited with {status}: {stderr}")]
    EncoderExited { status: String, stderr: String },

    // ── I/O ──────────────────────────────────────────────────────────────
    /// Reading or writing a local file failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ────────────────────────────────────────────────────────
    /// Unexpected internal error (panicked worker, runtime failure).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Pdf2VideoError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Pdf2VideoError::Io {
            path: path.into(),
            source,
        }
    }

    /// `true` for failures caused by the caller's input rather than the
    /// document or the environment.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Pdf2VideoError::Validation(_) | Pdf2VideoError::InvalidConfig(_)
        )
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Pdf2VideoError>;
