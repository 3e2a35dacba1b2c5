//! Conversion entry points and the job coordinator.
//!
//! [`Pipeline`] owns the deployment configuration, the three collaborators
//! and the event channel. Each [`Pipeline::convert`] call is one independent
//! job; several may run concurrently on the same `Pipeline`.
//!
//! The free functions ([`convert`], [`convert_sync`], [`convert_from_bytes`],
//! [`inspect`]) build a default pdfium + ffmpeg pipeline for one-off use.

use crate::backend::ffmpeg::FfmpegEncoder;
use crate::backend::pdfium::PdfiumBackend;
use crate::backend::{DocumentParser, PageRasterizer, VideoEncoder};
use crate::config::{ConversionRequest, PipelineConfig};
use crate::error::{Pdf2VideoError, Result};
use crate::job::PipelineJob;
use crate::output::{ConversionOutput, ConversionStats, DocumentInfo};
use crate::pipeline::cleanup;
use crate::pipeline::encode::StreamingEncodeStage;
use crate::pipeline::input;
use crate::pipeline::raster::RasterizationStage;
use crate::progress::{Benchmark, BenchmarkKind, EventSink, PipelineEvent};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// PDF-to-video coordinator.
///
/// # Example
/// ```rust,no_run
/// use pdf2video::{ConversionRequest, Pipeline, PipelineConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let pipeline = Pipeline::new(PipelineConfig::default());
/// let mut events = pipeline.subscribe();
/// tokio::spawn(async move {
///     while let Ok(event) = events.recv().await {
///         println!("{}: {}", event.event_name(), event.message());
///     }
/// });
///
/// let request = ConversionRequest::builder("slides.pdf")
///     .seconds_per_frame(5.0)
///     .build()?;
/// let output = pipeline.convert(&request).await?;
/// println!("{}", output.video_path.display());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    parser: Arc<dyn DocumentParser>,
    rasterizer: Arc<dyn PageRasterizer>,
    encoder: Arc<dyn VideoEncoder>,
    events: EventSink,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("subscribers", &self.events.subscriber_count())
            .finish_non_exhaustive()
    }
}

/// What the two stages hand back to [`Pipeline::convert`].
struct StageOutcome {
    document: DocumentInfo,
    frame_width: u32,
    frame_bytes: u64,
    raster_secs: f64,
    render_secs: f64,
}

impl Pipeline {
    /// Pipeline with the pdfium parser/rasterizer and the ffmpeg encoder.
    ///
    /// Nothing native is loaded here; libpdfium is bound and ffmpeg spawned
    /// only when a job needs them.
    pub fn new(config: PipelineConfig) -> Self {
        let pdfium = Arc::new(PdfiumBackend::new(config.pdfium_library.clone()));
        let encoder = Arc::new(FfmpegEncoder::new(config.encoder.clone()));
        Self::with_backends(config, pdfium.clone(), pdfium, encoder)
    }

    /// Pipeline with caller-supplied collaborators.
    pub fn with_backends(
        config: PipelineConfig,
        parser: Arc<dyn DocumentParser>,
        rasterizer: Arc<dyn PageRasterizer>,
        encoder: Arc<dyn VideoEncoder>,
    ) -> Self {
        let events = EventSink::new(config.event_capacity);
        Self {
            config,
            parser,
            rasterizer,
            encoder,
            events,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    /// Receive every event emitted from now on, across all jobs.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Convert one document to a video.
    ///
    /// # Errors
    /// - [`Pdf2VideoError::Validation`] for missing, conflicting or invalid
    ///   frame timing; nothing has run or been written at that point.
    /// - Source, parse, rasterize, encode and I/O errors from the stages.
    ///   Frame files are deleted and a partial video removed before the
    ///   error is returned.
    pub async fn convert(&self, request: &ConversionRequest) -> Result<ConversionOutput> {
        // ── Step 1: Validate timing ─────────────────────────────────────────
        let frame_rate = request.timing.frame_rate()?;
        let total_clock = Benchmark::start(BenchmarkKind::Total);

        // ── Step 2–3: Announce and create the job ───────────────────────────
        let mut job = PipelineJob::new(request.clone(), frame_rate);
        let source_name = request.source_name();
        info!("Job {}: converting {} at {} fps", job.id, source_name, frame_rate);
        self.events.emit(PipelineEvent::Start {
            job_id: job.id.clone(),
            message: format!("Converting {} to video...", source_name),
            source_name,
        });

        let video_name = job.video_name(self.config.encoder.extension());
        let video_path = job.video_path(self.config.encoder.extension());

        // ── Step 4–5: Stages ────────────────────────────────────────────────
        let result = self.run_stages(&mut job, &video_path).await;

        // ── Step 6: Always dispose of frames ────────────────────────────────
        let disposed = job.dispose_frames().await;
        debug!("Job {}: disposed {} frame files", job.id, disposed);

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                cleanup::discard_partial_output(&video_path).await;
                warn!("Job {} failed: {}", job.id, e);
                return Err(e);
            }
        };

        // ── Step 7: Done ────────────────────────────────────────────────────
        self.events.emit(PipelineEvent::End {
            job_id: job.id.clone(),
            message: format!("Video {} is ready.", video_name),
            output_name: video_name.clone(),
            output_path: video_path.clone(),
        });
        let total_secs = total_clock.finish(&job.id, &self.events);
        info!(
            "Job {}: {} pages → {} in {:.2}s",
            job.id,
            outcome.document.page_count,
            video_path.display(),
            total_secs
        );

        Ok(ConversionOutput {
            job_id: job.id,
            video_name,
            video_path,
            document: outcome.document,
            frame_width: outcome.frame_width,
            frame_height: self.config.target_height,
            frame_rate,
            stats: ConversionStats {
                raster_secs: outcome.raster_secs,
                render_secs: outcome.render_secs,
                total_secs,
                frame_bytes: outcome.frame_bytes,
            },
        })
    }

    async fn run_stages(&self, job: &mut PipelineJob, video_path: &Path) -> Result<StageOutcome> {
        input::resolve_source(&job.request.source).await?;
        for dir in [&job.request.temp_dir, &job.request.output_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| Pdf2VideoError::io(dir, e))?;
        }

        let raster_clock = Benchmark::start(BenchmarkKind::Raster);
        let document = RasterizationStage::new(
            self.parser.as_ref(),
            self.rasterizer.as_ref(),
            &self.config,
            &self.events,
        )
        .run(job)
        .await?;
        let raster_secs = raster_clock.finish(&job.id, &self.events);
        let frame_bytes = job.frames.iter().map(|f| f.byte_size).sum();

        let render_clock = Benchmark::start(BenchmarkKind::Render);
        StreamingEncodeStage::new(self.encoder.as_ref(), &self.events)
            .run(&job.id, &job.frames, job.frame_rate, video_path)
            .await?;
        let render_secs = render_clock.finish(&job.id, &self.events);

        Ok(StageOutcome {
            document,
            frame_width: document.scaled_width(self.config.target_height),
            frame_bytes,
            raster_secs,
            render_secs,
        })
    }

    /// Convert document bytes held in memory.
    ///
    /// The bytes are stored in a managed temp file inside `upload_dir`, which
    /// is deleted when the call returns. `request.source` is replaced by that
    /// file and `source_name` is what notifications and errors call the
    /// document; every other request field applies unchanged.
    pub async fn convert_from_bytes(
        &self,
        bytes: &[u8],
        source_name: &str,
        upload_dir: &Path,
        request: &ConversionRequest,
    ) -> Result<ConversionOutput> {
        tokio::fs::create_dir_all(upload_dir)
            .await
            .map_err(|e| Pdf2VideoError::io(upload_dir, e))?;
        let tmp = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(".pdf")
            .tempfile_in(upload_dir)
            .map_err(|e| Pdf2VideoError::io(upload_dir, e))?;
        tokio::fs::write(tmp.path(), bytes)
            .await
            .map_err(|e| Pdf2VideoError::io(tmp.path(), e))?;

        let mut request = request.clone();
        request.source = tmp.path().to_path_buf();
        request.display_name = Some(source_name.to_string());
        // `tmp` is dropped (and the file deleted) when `convert` returns
        self.convert(&request).await
    }

    /// Parse `source` and report its page count and sampled page size
    /// without rasterizing anything.
    pub async fn inspect(&self, source: &Path) -> Result<DocumentInfo> {
        input::resolve_source(source).await?;
        let bytes = input::read_source(source).await?;
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string());
        self.parser.parse(&name, &bytes).await
    }
}

/// Convert one document with the default pdfium + ffmpeg pipeline.
///
/// Events are not observable through this function; use [`Pipeline`] for that.
pub async fn convert(
    request: &ConversionRequest,
    config: &PipelineConfig,
) -> Result<ConversionOutput> {
    Pipeline::new(config.clone()).convert(request).await
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    request: &ConversionRequest,
    config: &PipelineConfig,
) -> Result<ConversionOutput> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2VideoError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(request, config))
}

/// Convert in-memory document bytes; see [`Pipeline::convert_from_bytes`].
pub async fn convert_from_bytes(
    bytes: &[u8],
    source_name: &str,
    upload_dir: &Path,
    request: &ConversionRequest,
    config: &PipelineConfig,
) -> Result<ConversionOutput> {
    Pipeline::new(config.clone())
        .convert_from_bytes(bytes, source_name, upload_dir, request)
        .await
}

/// Read page count and page size without converting.
///
/// Needs libpdfium but not ffmpeg.
pub async fn inspect(source: impl AsRef<Path>, config: &PipelineConfig) -> Result<DocumentInfo> {
    Pipeline::new(config.clone()).inspect(source.as_ref()).await
}
