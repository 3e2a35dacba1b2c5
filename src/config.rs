//! Configuration types for PDF-to-video conversion.
//!
//! Two structs split the knobs by lifetime:
//!
//! * [`PipelineConfig`] — deployment-level settings shared by every job
//!   (target height, frame image format, scheduling mode, encoder settings).
//!   Built via [`PipelineConfigBuilder`].
//! * [`ConversionRequest`] — one job: the source document, its frame timing,
//!   the concurrency ceiling and where temporary frames and the final video go.
//!   Built via [`ConversionRequestBuilder`]; immutable once the pipeline starts.
//!
//! Nothing here reads process-wide mutable state. The concurrency ceiling in
//! particular is an explicit [`ConcurrencyPolicy`] value on the request.

use crate::error::{Pdf2VideoError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default output height in pixels; width follows the document's aspect ratio.
pub const DEFAULT_TARGET_HEIGHT: u32 = 1080;

/// Default number of pages rasterized at once.
///
/// Roughly the number of CPU threads to dedicate to rasterization. Higher is
/// faster until the machine saturates and locks up.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Configuration shared by every conversion run through a [`crate::Pipeline`].
///
/// # Example
/// ```rust
/// use pdf2video::{FrameFormat, PipelineConfig, Scheduling};
///
/// let config = PipelineConfig::builder()
///     .target_height(720)
///     .frame_format(FrameFormat::Jpeg)
///     .scheduling(Scheduling::Windowed)
///     .build()
///     .unwrap();
/// assert_eq!(config.target_height, 720);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Output frame height in pixels. Default: 1080.
    pub target_height: u32,

    /// Image format of the temporary frame files. Default: PNG.
    pub frame_format: FrameFormat,

    /// How the rasterization executor schedules pages. Default: chunked.
    pub scheduling: Scheduling,

    /// ffmpeg invocation settings.
    pub encoder: EncoderSettings,

    /// Explicit libpdfium path. When `None` the system library is used.
    pub pdfium_library: Option<PathBuf>,

    /// Buffered events per subscriber before slow subscribers start lagging. Default: 256.
    pub event_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_height: DEFAULT_TARGET_HEIGHT,
            frame_format: FrameFormat::default(),
            scheduling: Scheduling::default(),
            encoder: EncoderSettings::default(),
            pdfium_library: None,
            event_capacity: 256,
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn target_height(mut self, px: u32) -> Self {
        self.config.target_height = px;
        self
    }

    pub fn frame_format(mut self, format: FrameFormat) -> Self {
        self.config.frame_format = format;
        self
    }

    pub fn scheduling(mut self, scheduling: Scheduling) -> Self {
        self.config.scheduling = scheduling;
        self
    }

    pub fn encoder(mut self, encoder: EncoderSettings) -> Self {
        self.config.encoder = encoder;
        self
    }

    pub fn ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.encoder.ffmpeg_path = path.into();
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn event_capacity(mut self, n: usize) -> Self {
        self.config.event_capacity = n.max(1);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig> {
        let c = &self.config;
        if !(16..=8640).contains(&c.target_height) {
            return Err(Pdf2VideoError::InvalidConfig(format!(
                "Target height must be 16–8640 px, got {}",
                c.target_height
            )));
        }
        c.encoder.validate()?;
        Ok(self.config)
    }
}

// ── Concurrency ──────────────────────────────────────────────────────────

/// How many rasterizer invocations may run at the same time.
///
/// Every policy resolves to a single ceiling `C ≥ 1` via [`ceiling`](Self::ceiling):
/// `Sequential` is `C = 1`, `Unbounded` is `C = N` (one fan-out over every page).
/// `Unbounded` is meant for trusted deployments only; on a shared machine it
/// will pin every core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyPolicy {
    /// One page at a time.
    Sequential,
    /// At most `n` pages at a time.
    Bounded(usize),
    /// Every page at once.
    Unbounded,
}

impl Default for ConcurrencyPolicy {
    fn default() -> Self {
        ConcurrencyPolicy::Bounded(DEFAULT_CONCURRENCY)
    }
}

impl ConcurrencyPolicy {
    /// Resolve the policy into a concrete ceiling for `task_count` tasks.
    pub fn ceiling(&self, task_count: usize) -> usize {
        match self {
            ConcurrencyPolicy::Sequential => 1,
            ConcurrencyPolicy::Bounded(n) => (*n).max(1),
            ConcurrencyPolicy::Unbounded => task_count.max(1),
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            ConcurrencyPolicy::Bounded(0) => Err(Pdf2VideoError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            )),
            _ => Ok(()),
        }
    }
}

impl FromStr for ConcurrencyPolicy {
    type Err = Pdf2VideoError;

    /// Accepts `sequential`, `unbounded` (alias `parallel`) or a positive integer.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sequential" | "serial" => Ok(ConcurrencyPolicy::Sequential),
            "unbounded" | "parallel" | "unlocked" => Ok(ConcurrencyPolicy::Unbounded),
            n => match n.parse::<usize>() {
                Ok(0) | Err(_) => Err(Pdf2VideoError::InvalidConfig(format!(
                    "Concurrency must be 'sequential', 'unbounded' or a positive integer, got '{s}'"
                ))),
                Ok(1) => Ok(ConcurrencyPolicy::Sequential),
                Ok(n) => Ok(ConcurrencyPolicy::Bounded(n)),
            },
        }
    }
}

impl fmt::Display for ConcurrencyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcurrencyPolicy::Sequential => f.write_str("sequential"),
            ConcurrencyPolicy::Bounded(n) => write!(f, "{n}"),
            ConcurrencyPolicy::Unbounded => f.write_str("unbounded"),
        }
    }
}

/// Scheduling strategy of the bounded executor.
///
/// | Mode | In flight | Progress unit |
/// |------|-----------|---------------|
/// | `Chunked`  | chunks of ≤ C tasks, one chunk after another | one per chunk |
/// | `Windowed` | a sliding window of ≤ C tasks | one per task |
///
/// `Chunked` idles while the slowest page of a chunk finishes; `Windowed`
/// keeps all C slots busy. Both never exceed C and both return results in
/// input order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheduling {
    #[default]
    Chunked,
    Windowed,
}

impl FromStr for Scheduling {
    type Err = Pdf2VideoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "chunked" => Ok(Scheduling::Chunked),
            "windowed" | "window" => Ok(Scheduling::Windowed),
            other => Err(Pdf2VideoError::InvalidConfig(format!(
                "Unknown scheduling mode '{other}' (expected 'chunked' or 'windowed')"
            ))),
        }
    }
}

// ── Frames ───────────────────────────────────────────────────────────────

/// File format of the rasterized frame artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameFormat {
    /// Lossless; larger temp files. (default)
    #[default]
    Png,
    /// Lossy; the encoder re-compresses anyway, so quality loss is minor.
    Jpeg,
}

impl FrameFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            FrameFormat::Png => "png",
            FrameFormat::Jpeg => "jpg",
        }
    }

    pub fn image_format(&self) -> image::ImageFormat {
        match self {
            FrameFormat::Png => image::ImageFormat::Png,
            FrameFormat::Jpeg => image::ImageFormat::Jpeg,
        }
    }
}

impl FromStr for FrameFormat {
    type Err = Pdf2VideoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "png" => Ok(FrameFormat::Png),
            "jpg" | "jpeg" => Ok(FrameFormat::Jpeg),
            other => Err(Pdf2VideoError::InvalidConfig(format!(
                "Unknown frame format '{other}' (expected 'png' or 'jpeg')"
            ))),
        }
    }
}

// ── Encoder ──────────────────────────────────────────────────────────────

/// Settings for the ffmpeg-backed encoder.
///
/// Values end up as subprocess arguments (never through a shell), and
/// [`validate`](Self::validate) still restricts them to a conservative
/// character set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderSettings {
    /// ffmpeg executable. Default: `ffmpeg` from `PATH`.
    pub ffmpeg_path: PathBuf,

    /// Video codec. Default: `libx264`.
    pub codec: String,

    /// Container format; also the output file extension. Default: `mp4`.
    pub container: String,

    /// Output stream frame rate. Default: 25.
    ///
    /// Slides repeat frames to fill this rate; H.264 compresses the repeats
    /// away, so a higher rate barely changes the file size but keeps players
    /// and seek bars happy.
    pub output_fps: u32,

    /// Output pixel format. Default: `yuv420p`.
    ///
    /// When set, frame dimensions are rounded down to even numbers, which
    /// 4:2:0 subsampling requires.
    pub pixel_format: Option<String>,

    /// mp4 `movflags`. Default: fragmented mp4 (`frag_keyframe+empty_moov`),
    /// playable while still being written.
    pub movflags: Option<String>,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            codec: "libx264".into(),
            container: "mp4".into(),
            output_fps: 25,
            pixel_format: Some("yuv420p".into()),
            movflags: Some("frag_keyframe+empty_moov".into()),
        }
    }
}

impl EncoderSettings {
    /// Output file extension.
    pub fn extension(&self) -> &str {
        &self.container
    }

    pub fn validate(&self) -> Result<()> {
        let token_ok = |s: &str| {
            !s.is_empty()
                && s
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+'))
        };
        if !token_ok(self.codec.as_str()) {
            return Err(Pdf2VideoError::InvalidConfig(format!(
                "Invalid codec name '{}'",
                self.codec
            )));
        }
        if !token_ok(self.container.as_str()) {
            return Err(Pdf2VideoError::InvalidConfig(format!(
                "Invalid container name '{}'",
                self.container
            )));
        }
        for value in [&self.pixel_format, &self.movflags].into_iter().flatten() {
            if !token_ok(value.as_str()) {
                return Err(Pdf2VideoError::InvalidConfig(format!(
                    "Invalid encoder option '{value}'"
                )));
            }
        }
        if self.output_fps == 0 || self.output_fps > 240 {
            return Err(Pdf2VideoError::InvalidConfig(format!(
                "Output fps must be 1–240, got {}",
                self.output_fps
            )));
        }
        Ok(())
    }
}

// ── Frame timing ─────────────────────────────────────────────────────────

/// A validated, finite, strictly positive frame rate in frames per second.
///
/// The only way to obtain one is [`FrameRate::new`] (or [`FrameTiming::frame_rate`]),
/// so any `FrameRate` is safe to format into a subprocess argument.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct FrameRate(f64);

impl FrameRate {
    pub fn new(fps: f64) -> Result<Self> {
        if !fps.is_finite() {
            return Err(Pdf2VideoError::Validation(format!(
                "frame rate must be numeric, got {fps}"
            )));
        }
        if fps <= 0.0 {
            return Err(Pdf2VideoError::Validation(format!(
                "frame rate must be positive, got {fps}"
            )));
        }
        Ok(FrameRate(fps))
    }

    pub fn get(&self) -> f64 {
        self.0
    }

    /// Seconds each frame stays on screen.
    pub fn seconds_per_frame(&self) -> f64 {
        1.0 / self.0
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FrameRate {
    type Err = Pdf2VideoError;

    fn from_str(s: &str) -> Result<Self> {
        FrameRate::new(parse_number("frame rate", s)?)
    }
}

/// The caller's frame-timing input: exactly one of an explicit rate or a
/// per-frame duration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameTiming {
    pub frames_per_second: Option<f64>,
    pub seconds_per_frame: Option<f64>,
}

impl FrameTiming {
    pub fn frames_per_second(fps: f64) -> Self {
        Self {
            frames_per_second: Some(fps),
            seconds_per_frame: None,
        }
    }

    pub fn seconds_per_frame(spf: f64) -> Self {
        Self {
            frames_per_second: None,
            seconds_per_frame: Some(spf),
        }
    }

    /// Parse untrusted text input (form fields, CLI flags).
    ///
    /// Empty strings count as absent. Anything that is not a plain finite
    /// number is rejected here, long before an encoder process is spawned.
    pub fn from_text(fps: Option<&str>, spf: Option<&str>) -> Result<Self> {
        let field = |name: &str, raw: Option<&str>| -> Result<Option<f64>> {
            match raw.map(str::trim) {
                None | Some("") => Ok(None),
                Some(text) => parse_number(name, text).map(Some),
            }
        };
        Ok(Self {
            frames_per_second: field("framesPerSecond", fps)?,
            seconds_per_frame: field("secondsPerFrame", spf)?,
        })
    }

    /// Derive the frame rate: `fps` directly, or `1 / spf`.
    pub fn frame_rate(&self) -> Result<FrameRate> {
        match (self.frames_per_second, self.seconds_per_frame) {
            (Some(fps), None) => FrameRate::new(fps),
            (None, Some(spf)) => {
                if !spf.is_finite() || spf <= 0.0 {
                    return Err(Pdf2VideoError::Validation(format!(
                        "seconds per frame must be a positive number, got {spf}"
                    )));
                }
                FrameRate::new(1.0 / spf)
            }
            (Some(_), Some(_)) => Err(Pdf2VideoError::Validation(
                "provide either frames per second or seconds per frame, not both".into(),
            )),
            (None, None) => Err(Pdf2VideoError::Validation(
                "missing frame rate: provide frames per second or seconds per frame".into(),
            )),
        }
    }
}

fn parse_number(name: &str, text: &str) -> Result<f64> {
    let value: f64 = text.trim().parse().map_err(|_| {
        Pdf2VideoError::Validation(format!("{name} must be numeric, got {text:?}"))
    })?;
    if !value.is_finite() {
        return Err(Pdf2VideoError::Validation(format!(
            "{name} must be a finite number, got {text:?}"
        )));
    }
    Ok(value)
}

// ── Paths ────────────────────────────────────────────────────────────────

/// Directory layout used by a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelinePaths {
    /// Where incoming documents are stored.
    pub upload_dir: PathBuf,
    /// Per-job frame artifacts, `<jobId>_<page>.<ext>`.
    pub temp_dir: PathBuf,
    /// Final videos, `<jobId>.<ext>`.
    pub output_dir: PathBuf,
}

impl PipelinePaths {
    /// `upload/`, `generated/temp/` and `generated/video/` under `root`.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let generated = root.join("generated");
        Self {
            upload_dir: root.join("upload"),
            temp_dir: generated.join("temp"),
            output_dir: generated.join("video"),
        }
    }

    /// Create every directory that does not exist yet.
    pub async fn ensure(&self) -> Result<()> {
        for dir in [&self.upload_dir, &self.temp_dir, &self.output_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| Pdf2VideoError::io(dir, e))?;
        }
        Ok(())
    }
}

impl Default for PipelinePaths {
    fn default() -> Self {
        Self::under(".")
    }
}

// ── Request ──────────────────────────────────────────────────────────────

/// One conversion job. Immutable once handed to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRequest {
    /// Path of the source document.
    pub source: PathBuf,
    /// Name shown in notifications instead of the source file name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Frame-rate input; validated by the coordinator before anything runs.
    pub timing: FrameTiming,
    /// Rasterization concurrency ceiling.
    pub concurrency: ConcurrencyPolicy,
    /// Directory for this job's temporary frame files.
    pub temp_dir: PathBuf,
    /// Directory for the final video.
    pub output_dir: PathBuf,
}

impl ConversionRequest {
    /// Create a new builder for `source`.
    pub fn builder(source: impl Into<PathBuf>) -> ConversionRequestBuilder {
        let paths = PipelinePaths::default();
        ConversionRequestBuilder {
            request: ConversionRequest {
                source: source.into(),
                display_name: None,
                timing: FrameTiming::default(),
                concurrency: ConcurrencyPolicy::default(),
                temp_dir: paths.temp_dir,
                output_dir: paths.output_dir,
            },
        }
    }

    /// Display name of the source document, for notifications: the
    /// `display_name` if set, else the source file name.
    pub fn source_name(&self) -> String {
        if let Some(name) = &self.display_name {
            return name.clone();
        }
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.display().to_string())
    }
}

/// Builder for [`ConversionRequest`].
#[derive(Debug)]
pub struct ConversionRequestBuilder {
    request: ConversionRequest,
}

impl ConversionRequestBuilder {
    pub fn timing(mut self, timing: FrameTiming) -> Self {
        self.request.timing = timing;
        self
    }

    pub fn frames_per_second(mut self, fps: f64) -> Self {
        self.request.timing.frames_per_second = Some(fps);
        self
    }

    pub fn seconds_per_frame(mut self, spf: f64) -> Self {
        self.request.timing.seconds_per_frame = Some(spf);
        self
    }

    pub fn concurrency(mut self, policy: ConcurrencyPolicy) -> Self {
        self.request.concurrency = policy;
        self
    }

    pub fn paths(mut self, paths: &PipelinePaths) -> Self {
        self.request.temp_dir = paths.temp_dir.clone();
        self.request.output_dir = paths.output_dir.clone();
        self
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.request.display_name = Some(name.into());
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.request.temp_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.request.output_dir = dir.into();
        self
    }

    /// Build the request. Frame timing is checked later by the coordinator,
    /// so a request with missing timing still builds and fails at `convert`.
    pub fn build(self) -> Result<ConversionRequest> {
        let r = &self.request;
        if r.source.as_os_str().is_empty() {
            return Err(Pdf2VideoError::Validation("source path is empty".into()));
        }
        r.concurrency.validate()?;
        Ok(self.request)
    }
}
