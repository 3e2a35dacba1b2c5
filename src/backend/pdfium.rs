//! pdfium-backed document parsing and page rasterization.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! Every call moves onto Tokio's blocking pool so rendering never stalls the
//! async worker threads. Each call binds and loads the document afresh.
//!
//! With the `thread_safe` feature of `pdfium-render`, a bound `Pdfium` holds
//! a process-wide lock until it is dropped. Page renders therefore run one at
//! a time however many are in flight; the concurrency ceiling bounds queued
//! blocking tasks and open documents, not parallel rendering.

use crate::backend::{DocumentParser, PageRasterizer, PageRequest};
use crate::config::FrameFormat;
use crate::error::{Pdf2VideoError, Result};
use crate::output::{DocumentInfo, FrameArtifact};
use async_trait::async_trait;
use image::imageops::FilterType;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Parser and rasterizer on top of pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumBackend {
    library: Option<PathBuf>,
}

impl PdfiumBackend {
    /// Use the libpdfium at `library`, or the system library when `None`.
    pub fn new(library: Option<PathBuf>) -> Self {
        Self { library }
    }
}

fn bind_pdfium(library: Option<&Path>) -> Result<Pdfium> {
    let bindings = match library {
        Some(path) => Pdfium::bind_to_library(path.to_string_lossy().to_string()),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| Pdf2VideoError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

#[async_trait]
impl DocumentParser for PdfiumBackend {
    async fn parse(&self, source_name: &str, bytes: &[u8]) -> Result<DocumentInfo> {
        if !bytes.starts_with(b"%PDF") {
            let magic: Vec<u8> = bytes.iter().take(4).copied().collect();
            return Err(Pdf2VideoError::Parse {
                source_name: source_name.to_string(),
                detail: format!("not a PDF (first bytes: {:?})", magic),
            });
        }

        let library = self.library.clone();
        let name = source_name.to_string();
        let data = bytes.to_vec();

        tokio::task::spawn_blocking(move || parse_blocking(library.as_deref(), &name, &data))
            .await
            .map_err(|e| Pdf2VideoError::Internal(format!("Parse task panicked: {}", e)))?
    }
}

/// Blocking implementation of document parsing.
fn parse_blocking(library: Option<&Path>, source_name: &str, bytes: &[u8]) -> Result<DocumentInfo> {
    let pdfium = bind_pdfium(library)?;
    let parse_error = |detail: String| Pdf2VideoError::Parse {
        source_name: source_name.to_string(),
        detail,
    };

    let document = pdfium.load_pdf_from_byte_slice(bytes, None).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            parse_error("document is encrypted and requires a password".into())
        } else {
            parse_error(err_str)
        }
    })?;

    let pages = document.pages();
    let page_count = pages.len() as usize;
    if page_count == 0 {
        return Err(parse_error("document has no pages".into()));
    }

    let sample = DocumentInfo::sample_page(page_count);
    let page = pages
        .get((sample - 1) as u16)
        .map_err(|e| parse_error(format!("cannot read page {}: {:?}", sample, e)))?;

    let width = page.width().value.floor() as u32;
    let height = page.height().value.floor() as u32;
    if width == 0 || height == 0 {
        return Err(parse_error(format!(
            "page {} has degenerate size {}x{}",
            sample, width, height
        )));
    }

    info!(
        "PDF loaded: {} pages, page {} is {}x{} pt",
        page_count, sample, width, height
    );

    Ok(DocumentInfo {
        page_count,
        width,
        height,
    })
}

#[async_trait]
impl PageRasterizer for PdfiumBackend {
    async fn rasterize_page(&self, document: &Path, request: PageRequest) -> Result<FrameArtifact> {
        let library = self.library.clone();
        let path = document.to_path_buf();
        let page = request.page;

        tokio::task::spawn_blocking(move || rasterize_blocking(library.as_deref(), &path, request))
            .await
            .map_err(|e| {
                Pdf2VideoError::Internal(format!("Render task for page {} panicked: {}", page, e))
            })?
    }
}

/// Blocking implementation of single-page rendering.
fn rasterize_blocking(
    library: Option<&Path>,
    pdf_path: &Path,
    request: PageRequest,
) -> Result<FrameArtifact> {
    let page_num = request.page;
    let fail = |detail: String| Pdf2VideoError::Rasterize {
        page: page_num,
        detail,
    };

    let pdfium = bind_pdfium(library)?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| fail(format!("{:?}", e)))?;

    let pages = document.pages();
    if page_num == 0 || page_num > pages.len() as usize {
        return Err(fail(format!(
            "page out of range (document has {} pages)",
            pages.len()
        )));
    }

    let page = pages
        .get((page_num - 1) as u16)
        .map_err(|e| fail(format!("{:?}", e)))?;

    let render_config = PdfRenderConfig::new()
        .set_target_height(request.height as i32)
        .set_clear_color(PdfColor::WHITE);
    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| fail(format!("{:?}", e)))?;

    // Every frame gets the exact target size so the video has one resolution,
    // even when individual pages differ in aspect ratio.
    let mut image = bitmap.as_image();
    if image.width() != request.width || image.height() != request.height {
        image = image.resize_exact(request.width, request.height, FilterType::Triangle);
    }

    write_frame(image, &request.output_path, request.format)
        .map_err(|e| fail(format!("writing {}: {}", request.output_path.display(), e)))?;

    let byte_size = std::fs::metadata(&request.output_path)
        .map_err(|e| Pdf2VideoError::io(&request.output_path, e))?
        .len();

    debug!(
        "Rendered page {} → {}x{} px, {} bytes",
        page_num, request.width, request.height, byte_size
    );

    Ok(FrameArtifact {
        page: page_num,
        path: request.output_path,
        width: request.width,
        height: request.height,
        byte_size,
    })
}

/// Flatten onto an opaque RGB canvas and encode as `format`.
fn write_frame(image: DynamicImage, path: &Path, format: FrameFormat) -> image::ImageResult<()> {
    DynamicImage::ImageRgb8(image.to_rgb8()).save_with_format(path, format.image_format())
}
