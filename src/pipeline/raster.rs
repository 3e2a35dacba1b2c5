//! Rasterization stage: one image file per page, all at the same size.
//!
//! The frame size is decided once from the document's sampled page
//! ([`DocumentInfo::sample_page`]): height is the configured target, width
//! follows that page's aspect ratio. Every page is then rendered to exactly
//! that size so the encoder sees a constant resolution.
//!
//! Pages run through the [`BoundedExecutor`], one rasterizer call per page.
//! Completion order is arbitrary; the returned frames are always in page order.
//!
//! A rasterizer must write each frame to the path it was asked for; job
//! disposal only covers claimed paths. A frame reported anywhere else is
//! deleted and fails the page.

use crate::backend::{DocumentParser, PageRasterizer, PageRequest};
use crate::config::PipelineConfig;
use crate::error::{Pdf2VideoError, Result};
use crate::job::PipelineJob;
use crate::output::{DocumentInfo, FrameArtifact};
use crate::pipeline::executor::BoundedExecutor;
use crate::pipeline::input;
use crate::progress::{EventSink, ProgressTracker, Stage};
use std::path::Path;
use tracing::{debug, info, warn};

/// Produces the page-ordered frame list of a job.
pub struct RasterizationStage<'a> {
    parser: &'a dyn DocumentParser,
    rasterizer: &'a dyn PageRasterizer,
    config: &'a PipelineConfig,
    events: &'a EventSink,
}

impl<'a> RasterizationStage<'a> {
    pub fn new(
        parser: &'a dyn DocumentParser,
        rasterizer: &'a dyn PageRasterizer,
        config: &'a PipelineConfig,
        events: &'a EventSink,
    ) -> Self {
        Self {
            parser,
            rasterizer,
            config,
            events,
        }
    }

    /// Parse the job's source, rasterize every page and store the frames in
    /// `job.frames`.
    ///
    /// Every frame path is claimed on the job before any rendering starts, so
    /// disposal also covers frames written by a run that later failed.
    pub async fn run(&self, job: &mut PipelineJob) -> Result<DocumentInfo> {
        let source = job.request.source.clone();
        let source_name = job.request.source_name();

        let bytes = input::read_source(&source).await?;
        let document = self.parser.parse(&source_name, &bytes).await?;
        drop(bytes);
        check_document(&source_name, &document)?;

        let height = self.config.target_height;
        let width = document.scaled_width(height);
        let format = self.config.frame_format;
        info!(
            "Job {}: rasterizing {} pages at {}x{} ({})",
            job.id,
            document.page_count,
            width,
            height,
            format.extension()
        );

        let mut tasks = Vec::with_capacity(document.page_count);
        for page in 1..=document.page_count {
            let output_path = job.claim_frame(page, format.extension());
            let request = PageRequest {
                page,
                width,
                height,
                output_path,
                format,
            };
            let rasterizer = self.rasterizer;
            let source_path = source.as_path();
            tasks.push(async move {
                let expected = request.output_path.clone();
                let frame = rasterizer.rasterize_page(source_path, request).await?;
                check_frame_path(&expected, frame).await
            });
        }

        let executor = BoundedExecutor::new(job.request.concurrency, self.config.scheduling);
        debug!(
            "Job {}: concurrency {} (ceiling {})",
            job.id,
            job.request.concurrency,
            executor.ceiling(document.page_count)
        );
        let mut tracker = ProgressTracker::new(
            job.id.as_str(),
            Stage::Raster,
            executor.progress_units(document.page_count),
            self.events.clone(),
        );

        let mut frames = executor
            .run(tasks, || {
                tracker.advance();
            })
            .await?;
        tracker.close();

        frames.sort_by_key(|f| f.page);
        for (expected, frame) in (1..=document.page_count).zip(&frames) {
            if frame.page != expected {
                return Err(Pdf2VideoError::Internal(format!(
                    "rasterizer returned page {} where page {} was expected",
                    frame.page, expected
                )));
            }
        }
        if frames.len() != document.page_count {
            return Err(Pdf2VideoError::Internal(format!(
                "rasterizer returned {} frames for {} pages",
                frames.len(),
                document.page_count
            )));
        }

        job.frames = frames;
        Ok(document)
    }
}

/// Reject a frame that was not written to its requested path, deleting the
/// stray file.
async fn check_frame_path(expected: &Path, frame: FrameArtifact) -> Result<FrameArtifact> {
    if frame.path == expected {
        return Ok(frame);
    }
    if let Err(e) = tokio::fs::remove_file(&frame.path).await {
        warn!("Could not remove stray frame {}: {}", frame.path.display(), e);
    }
    Err(Pdf2VideoError::Rasterize {
        page: frame.page,
        detail: format!(
            "frame written to {} instead of {}",
            frame.path.display(),
            expected.display()
        ),
    })
}

fn check_document(source_name: &str, document: &DocumentInfo) -> Result<()> {
    if document.page_count == 0 || document.width == 0 || document.height == 0 {
        return Err(Pdf2VideoError::Parse {
            source_name: source_name.to_string(),
            detail: format!(
                "unusable document: {} pages, {}x{}",
                document.page_count, document.width, document.height
            ),
        });
    }
    Ok(())
}
