//! Coordinator tests with in-memory collaborators.
//!
//! The parser, rasterizer and encoder below never touch pdfium or ffmpeg, so
//! these tests run everywhere. The rasterizer finishes pages in reverse order
//! and the encoder records exactly what it was fed, which makes ordering,
//! concurrency and cleanup observable.

use async_trait::async_trait;
use pdf2video::{
    ConcurrencyPolicy, ConversionRequest, DocumentInfo, DocumentParser, EncoderSession,
    FrameArtifact, FrameRate, FrameTiming, PageRasterizer, PageRequest, Pdf2VideoError, Pipeline,
    PipelineConfig, PipelineEvent, PipelinePaths, Scheduling, Stage, VideoEncoder,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::broadcast;
use tokio_test::{assert_err, assert_ok};

// ── Fakes ────────────────────────────────────────────────────────────────────

struct FakeParser {
    info: DocumentInfo,
    fail: bool,
    calls: AtomicUsize,
}

impl FakeParser {
    fn pages(page_count: usize) -> Self {
        Self {
            info: DocumentInfo {
                page_count,
                width: 800,
                height: 1000,
            },
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    fn broken() -> Self {
        Self {
            fail: true,
            ..Self::pages(1)
        }
    }
}

#[async_trait]
impl DocumentParser for FakeParser {
    async fn parse(&self, source_name: &str, _bytes: &[u8]) -> pdf2video::Result<DocumentInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Pdf2VideoError::Parse {
                source_name: source_name.to_string(),
                detail: "corrupt xref table".into(),
            });
        }
        Ok(self.info)
    }
}

/// Writes `page-N` into each frame file. Higher pages sleep less, so they
/// complete first.
struct FakeRasterizer {
    page_count: usize,
    fail_page: Option<usize>,
    /// Write frames next to the requested path instead of at it.
    misplace: bool,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeRasterizer {
    fn new(page_count: usize) -> Self {
        Self {
            page_count,
            fail_page: None,
            misplace: false,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    fn failing_on(page_count: usize, page: usize) -> Self {
        Self {
            fail_page: Some(page),
            ..Self::new(page_count)
        }
    }

    fn misplacing(page_count: usize) -> Self {
        Self {
            misplace: true,
            ..Self::new(page_count)
        }
    }
}

#[async_trait]
impl PageRasterizer for FakeRasterizer {
    async fn rasterize_page(
        &self,
        _document: &Path,
        request: PageRequest,
    ) -> pdf2video::Result<FrameArtifact> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let delay = (self.page_count + 1 - request.page) as u64 * 3;
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if Some(request.page) == self.fail_page {
            return Err(Pdf2VideoError::Rasterize {
                page: request.page,
                detail: "renderer crashed".into(),
            });
        }

        let body = format!("page-{}", request.page);
        let path = if self.misplace {
            request.output_path.with_extension("ppm")
        } else {
            request.output_path
        };
        tokio::fs::write(&path, &body)
            .await
            .map_err(|e| Pdf2VideoError::io(&path, e))?;
        Ok(FrameArtifact {
            page: request.page,
            path,
            width: request.width,
            height: request.height,
            byte_size: body.len() as u64,
        })
    }
}

#[derive(Default)]
struct Recording {
    opened: usize,
    frame_rate: Option<f64>,
    frames: Vec<String>,
    aborted: bool,
}

/// Creates the output file on open and fills it on finish.
#[derive(Default)]
struct RecordingEncoder {
    log: Arc<Mutex<Recording>>,
    fail_finish: bool,
}

struct RecordingSession {
    log: Arc<Mutex<Recording>>,
    output: PathBuf,
    fail_finish: bool,
}

#[async_trait]
impl VideoEncoder for RecordingEncoder {
    async fn open(
        &self,
        frame_rate: FrameRate,
        output_path: &Path,
    ) -> pdf2video::Result<Box<dyn EncoderSession>> {
        {
            let mut log = self.log.lock().unwrap();
            log.opened += 1;
            log.frame_rate = Some(frame_rate.get());
        }
        tokio::fs::write(output_path, b"")
            .await
            .map_err(|e| Pdf2VideoError::io(output_path, e))?;
        Ok(Box::new(RecordingSession {
            log: Arc::clone(&self.log),
            output: output_path.to_path_buf(),
            fail_finish: self.fail_finish,
        }))
    }
}

#[async_trait]
impl EncoderSession for RecordingSession {
    async fn write_frame(
        &mut self,
        frame: &mut (dyn AsyncRead + Unpin + Send),
    ) -> pdf2video::Result<u64> {
        let mut body = String::new();
        frame.read_to_string(&mut body).await.unwrap();
        let n = body.len() as u64;
        self.log.lock().unwrap().frames.push(body);
        Ok(n)
    }

    async fn finish(&mut self) -> pdf2video::Result<()> {
        if self.fail_finish {
            return Err(Pdf2VideoError::EncoderExited {
                status: "exit status: 1".into(),
                stderr: "Invalid data found when processing input".into(),
            });
        }
        let body = self.log.lock().unwrap().frames.concat();
        tokio::fs::write(&self.output, body)
            .await
            .map_err(|e| Pdf2VideoError::io(&self.output, e))
    }

    async fn abort(&mut self) {
        self.log.lock().unwrap().aborted = true;
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

struct Fixture {
    _root: tempfile::TempDir,
    paths: PipelinePaths,
    source: PathBuf,
}

fn fixture() -> Fixture {
    let root = tempfile::tempdir().unwrap();
    let paths = PipelinePaths::under(root.path());
    std::fs::create_dir_all(&paths.upload_dir).unwrap();
    let source = paths.upload_dir.join("deck.pdf");
    std::fs::write(&source, b"%PDF-1.7 fake").unwrap();
    Fixture {
        _root: root,
        paths,
        source,
    }
}

fn build_pipeline(
    config: PipelineConfig,
    parser: Arc<FakeParser>,
    rasterizer: Arc<FakeRasterizer>,
    encoder: Arc<RecordingEncoder>,
) -> Pipeline {
    Pipeline::with_backends(config, parser, rasterizer, encoder)
}

fn files_in(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

fn drain(rx: &mut broadcast::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn percents(events: &[PipelineEvent], stage: Stage) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Progress(p) if p.stage == stage => Some(p.percent),
            _ => None,
        })
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn converts_pages_in_order_and_cleans_up() {
    let fx = fixture();
    let parser = Arc::new(FakeParser::pages(3));
    let rasterizer = Arc::new(FakeRasterizer::new(3));
    let encoder = Arc::new(RecordingEncoder::default());
    let log = Arc::clone(&encoder.log);
    let pipeline = build_pipeline(PipelineConfig::default(), parser, rasterizer, encoder);
    let mut rx = pipeline.subscribe();

    let request = ConversionRequest::builder(&fx.source)
        .frames_per_second(2.0)
        .paths(&fx.paths)
        .build()
        .unwrap();
    let output = assert_ok!(pipeline.convert(&request).await);

    assert_eq!(output.frame_width, 864);
    assert_eq!(output.frame_height, 1080);
    assert_eq!(output.document.page_count, 3);
    assert_eq!(output.video_name, format!("{}.mp4", output.job_id));
    assert_eq!(output.video_path, fx.paths.output_dir.join(&output.video_name));
    assert_eq!(
        std::fs::read_to_string(&output.video_path).unwrap(),
        "page-1page-2page-3"
    );

    let log = log.lock().unwrap();
    assert_eq!(log.frames, vec!["page-1", "page-2", "page-3"]);
    assert_eq!(log.frame_rate, Some(2.0));
    assert!(!log.aborted);

    assert!(files_in(&fx.paths.temp_dir).is_empty());
    assert_eq!(output.stats.frame_bytes, 18);

    let events = drain(&mut rx);
    let names: Vec<&str> = events
        .iter()
        .map(|e| e.event_name())
        .filter(|n| !n.starts_with("progress"))
        .collect();
    assert_eq!(
        names,
        vec!["start", "benchmark_raster", "benchmark_render", "end", "benchmark_total"]
    );
    for stage in [Stage::Raster, Stage::Render] {
        let p = percents(&events, stage);
        assert_eq!(p.last(), Some(&100), "{stage:?}");
        assert!(p.windows(2).all(|w| w[0] <= w[1]), "{stage:?}: {p:?}");
    }
    assert_eq!(percents(&events, Stage::Render), vec![20, 40, 60, 100]);

    match &events[0] {
        PipelineEvent::Start { job_id, source_name, .. } => {
            assert_eq!(job_id, &output.job_id);
            assert_eq!(source_name, "deck.pdf");
        }
        other => panic!("expected start, got {other:?}"),
    }
}

#[tokio::test]
async fn seconds_per_frame_becomes_reciprocal_rate() {
    let fx = fixture();
    let encoder = Arc::new(RecordingEncoder::default());
    let log = Arc::clone(&encoder.log);
    let pipeline = build_pipeline(
        PipelineConfig::default(),
        Arc::new(FakeParser::pages(1)),
        Arc::new(FakeRasterizer::new(1)),
        encoder,
    );

    let request = ConversionRequest::builder(&fx.source)
        .seconds_per_frame(4.0)
        .paths(&fx.paths)
        .build()
        .unwrap();
    let output = pipeline.convert(&request).await.unwrap();

    assert_eq!(output.frame_rate.get(), 0.25);
    assert_eq!(log.lock().unwrap().frame_rate, Some(0.25));
}

#[tokio::test]
async fn invalid_timing_fails_before_any_work() {
    let fx = fixture();
    let cases = [
        FrameTiming::default(),
        FrameTiming {
            frames_per_second: Some(1.0),
            seconds_per_frame: Some(1.0),
        },
        FrameTiming::frames_per_second(f64::NAN),
        FrameTiming::seconds_per_frame(0.0),
    ];

    for timing in cases {
        let parser = Arc::new(FakeParser::pages(2));
        let rasterizer = Arc::new(FakeRasterizer::new(2));
        let encoder = Arc::new(RecordingEncoder::default());
        let log = Arc::clone(&encoder.log);
        let pipeline = build_pipeline(
            PipelineConfig::default(),
            Arc::clone(&parser),
            Arc::clone(&rasterizer),
            encoder,
        );
        let mut rx = pipeline.subscribe();

        let request = ConversionRequest::builder(&fx.source)
            .timing(timing)
            .paths(&fx.paths)
            .build()
            .unwrap();
        let err = assert_err!(pipeline.convert(&request).await);

        assert!(err.is_validation(), "{timing:?}: {err:?}");
        assert_eq!(parser.calls.load(Ordering::SeqCst), 0);
        assert_eq!(rasterizer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(log.lock().unwrap().opened, 0);
        assert!(drain(&mut rx).is_empty(), "no events for {timing:?}");
    }
    assert!(!fx.paths.temp_dir.exists());
}

#[tokio::test]
async fn malicious_timing_text_is_rejected() {
    for text in ["1; rm -rf /", "2 -vf drawtext", "inf", "0x10"] {
        let err = FrameTiming::from_text(Some(text), None).unwrap_err();
        assert!(err.is_validation(), "{text}: {err:?}");
    }
}

#[tokio::test]
async fn rasterize_failure_removes_every_frame() {
    let fx = fixture();
    let rasterizer = Arc::new(FakeRasterizer::failing_on(3, 2));
    let encoder = Arc::new(RecordingEncoder::default());
    let log = Arc::clone(&encoder.log);
    let pipeline = build_pipeline(
        PipelineConfig::default(),
        Arc::new(FakeParser::pages(3)),
        Arc::clone(&rasterizer),
        encoder,
    );

    let request = ConversionRequest::builder(&fx.source)
        .frames_per_second(1.0)
        .paths(&fx.paths)
        .build()
        .unwrap();
    let err = pipeline.convert(&request).await.unwrap_err();

    assert!(matches!(err, Pdf2VideoError::Rasterize { page: 2, .. }), "{err:?}");
    // All three pages ran in one chunk, so pages 1 and 3 did write frames.
    assert_eq!(rasterizer.calls.load(Ordering::SeqCst), 3);
    assert!(files_in(&fx.paths.temp_dir).is_empty());
    assert_eq!(log.lock().unwrap().opened, 0);
    assert!(files_in(&fx.paths.output_dir).is_empty());
}

#[tokio::test]
async fn encoder_failure_removes_frames_and_partial_video() {
    let fx = fixture();
    let encoder = Arc::new(RecordingEncoder {
        fail_finish: true,
        ..RecordingEncoder::default()
    });
    let log = Arc::clone(&encoder.log);
    let pipeline = build_pipeline(
        PipelineConfig::default(),
        Arc::new(FakeParser::pages(4)),
        Arc::new(FakeRasterizer::new(4)),
        encoder,
    );
    let mut rx = pipeline.subscribe();

    let request = ConversionRequest::builder(&fx.source)
        .frames_per_second(1.0)
        .paths(&fx.paths)
        .build()
        .unwrap();
    let err = pipeline.convert(&request).await.unwrap_err();

    assert!(matches!(err, Pdf2VideoError::EncoderExited { .. }), "{err:?}");
    assert!(log.lock().unwrap().aborted);
    assert!(files_in(&fx.paths.temp_dir).is_empty());
    assert!(files_in(&fx.paths.output_dir).is_empty());

    let names: Vec<&str> = drain(&mut rx).iter().map(|e| e.event_name()).collect();
    assert!(!names.contains(&"end"));
    assert!(!names.contains(&"benchmark_render"));
}

#[tokio::test]
async fn parse_failure_skips_rasterization() {
    let fx = fixture();
    let rasterizer = Arc::new(FakeRasterizer::new(1));
    let pipeline = build_pipeline(
        PipelineConfig::default(),
        Arc::new(FakeParser::broken()),
        Arc::clone(&rasterizer),
        Arc::new(RecordingEncoder::default()),
    );

    let request = ConversionRequest::builder(&fx.source)
        .frames_per_second(1.0)
        .paths(&fx.paths)
        .build()
        .unwrap();
    let err = pipeline.convert(&request).await.unwrap_err();

    assert!(matches!(err, Pdf2VideoError::Parse { .. }), "{err:?}");
    assert_eq!(rasterizer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_source_is_reported_before_parsing() {
    let fx = fixture();
    let parser = Arc::new(FakeParser::pages(1));
    let pipeline = build_pipeline(
        PipelineConfig::default(),
        Arc::clone(&parser),
        Arc::new(FakeRasterizer::new(1)),
        Arc::new(RecordingEncoder::default()),
    );

    let request = ConversionRequest::builder(fx.paths.upload_dir.join("missing.pdf"))
        .frames_per_second(1.0)
        .paths(&fx.paths)
        .build()
        .unwrap();
    let err = pipeline.convert(&request).await.unwrap_err();

    assert!(matches!(err, Pdf2VideoError::SourceNotFound { .. }), "{err:?}");
    assert_eq!(parser.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn concurrency_ceiling_is_respected_in_both_modes() {
    for scheduling in [Scheduling::Chunked, Scheduling::Windowed] {
        let fx = fixture();
        let rasterizer = Arc::new(FakeRasterizer::new(7));
        let encoder = Arc::new(RecordingEncoder::default());
        let log = Arc::clone(&encoder.log);
        let config = PipelineConfig::builder()
            .scheduling(scheduling)
            .build()
            .unwrap();
        let pipeline = build_pipeline(
            config,
            Arc::new(FakeParser::pages(7)),
            Arc::clone(&rasterizer),
            encoder,
        );

        let request = ConversionRequest::builder(&fx.source)
            .frames_per_second(1.0)
            .concurrency(ConcurrencyPolicy::Bounded(2))
            .paths(&fx.paths)
            .build()
            .unwrap();
        pipeline.convert(&request).await.unwrap();

        let peak = rasterizer.peak.load(Ordering::SeqCst);
        assert!(peak <= 2, "{scheduling:?}: peak {peak}");
        let expected: Vec<String> = (1..=7).map(|p| format!("page-{p}")).collect();
        assert_eq!(log.lock().unwrap().frames, expected, "{scheduling:?}");
    }
}

#[tokio::test]
async fn sequential_policy_renders_one_page_at_a_time() {
    let fx = fixture();
    let rasterizer = Arc::new(FakeRasterizer::new(4));
    let pipeline = build_pipeline(
        PipelineConfig::default(),
        Arc::new(FakeParser::pages(4)),
        Arc::clone(&rasterizer),
        Arc::new(RecordingEncoder::default()),
    );
    let mut rx = pipeline.subscribe();

    let request = ConversionRequest::builder(&fx.source)
        .frames_per_second(1.0)
        .concurrency(ConcurrencyPolicy::Sequential)
        .paths(&fx.paths)
        .build()
        .unwrap();
    pipeline.convert(&request).await.unwrap();

    assert_eq!(rasterizer.peak.load(Ordering::SeqCst), 1);
    // One chunk per page: 4 / 6 ≈ 17, 33, 50, 67, then 100.
    assert_eq!(percents(&drain(&mut rx), Stage::Raster), vec![17, 33, 50, 67, 100]);
}

#[tokio::test]
async fn concurrent_jobs_do_not_share_files() {
    let fx = fixture();
    let encoder = Arc::new(RecordingEncoder::default());
    let pipeline = build_pipeline(
        PipelineConfig::default(),
        Arc::new(FakeParser::pages(2)),
        Arc::new(FakeRasterizer::new(2)),
        encoder,
    );

    let mut rx = pipeline.subscribe();

    let request = ConversionRequest::builder(&fx.source)
        .frames_per_second(1.0)
        .concurrency(ConcurrencyPolicy::Sequential)
        .paths(&fx.paths)
        .build()
        .unwrap();
    let (a, b) = tokio::join!(pipeline.convert(&request), pipeline.convert(&request));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a.job_id, b.job_id);
    assert!(a.video_path.exists() && b.video_path.exists());
    assert!(files_in(&fx.paths.temp_dir).is_empty());

    // Interleaved on one channel, but each job's events are attributable.
    let events = drain(&mut rx);
    for job_id in [&a.job_id, &b.job_id] {
        let own: Vec<PipelineEvent> = events
            .iter()
            .filter(|e| e.job_id() == job_id.as_str())
            .cloned()
            .collect();
        assert_eq!(percents(&own, Stage::Raster), vec![25, 50, 100]);
        assert_eq!(percents(&own, Stage::Render), vec![25, 50, 100]);
        let benchmarks = own
            .iter()
            .filter(|e| matches!(e, PipelineEvent::Benchmark { .. }))
            .count();
        assert_eq!(benchmarks, 3);
    }
    assert!(events
        .iter()
        .all(|e| e.job_id() == a.job_id || e.job_id() == b.job_id));
}

#[tokio::test]
async fn frames_written_outside_their_path_do_not_survive() {
    let fx = fixture();
    let encoder = Arc::new(RecordingEncoder::default());
    let log = Arc::clone(&encoder.log);
    let pipeline = build_pipeline(
        PipelineConfig::default(),
        Arc::new(FakeParser::pages(3)),
        Arc::new(FakeRasterizer::misplacing(3)),
        encoder,
    );

    let request = ConversionRequest::builder(&fx.source)
        .frames_per_second(1.0)
        .paths(&fx.paths)
        .build()
        .unwrap();
    let err = assert_err!(pipeline.convert(&request).await);

    assert!(matches!(err, Pdf2VideoError::Rasterize { .. }), "{err:?}");
    assert!(files_in(&fx.paths.temp_dir).is_empty());
    assert_eq!(log.lock().unwrap().opened, 0);
}

#[tokio::test]
async fn convert_from_bytes_discards_the_upload() {
    let fx = fixture();
    std::fs::remove_file(&fx.source).unwrap();
    let pipeline = build_pipeline(
        PipelineConfig::default(),
        Arc::new(FakeParser::pages(2)),
        Arc::new(FakeRasterizer::new(2)),
        Arc::new(RecordingEncoder::default()),
    );

    let template = ConversionRequest::builder("ignored.pdf")
        .seconds_per_frame(2.0)
        .paths(&fx.paths)
        .build()
        .unwrap();
    let mut rx = pipeline.subscribe();
    let output = pipeline
        .convert_from_bytes(
            b"%PDF-1.4 in memory",
            "Quarterly review.pdf",
            &fx.paths.upload_dir,
            &template,
        )
        .await
        .unwrap();

    assert!(output.video_path.exists());
    assert!(files_in(&fx.paths.upload_dir).is_empty());
    let started = drain(&mut rx).into_iter().find_map(|e| match e {
        PipelineEvent::Start { source_name, .. } => Some(source_name),
        _ => None,
    });
    assert_eq!(started.as_deref(), Some("Quarterly review.pdf"));
}

#[tokio::test]
async fn inspect_parses_without_rasterizing() {
    let fx = fixture();
    let rasterizer = Arc::new(FakeRasterizer::new(5));
    let pipeline = build_pipeline(
        PipelineConfig::default(),
        Arc::new(FakeParser::pages(5)),
        Arc::clone(&rasterizer),
        Arc::new(RecordingEncoder::default()),
    );

    let info = pipeline.inspect(&fx.source).await.unwrap();
    assert_eq!(info.page_count, 5);
    assert_eq!(info.scaled_width(1080), 864);
    assert_eq!(rasterizer.calls.load(Ordering::SeqCst), 0);
}
