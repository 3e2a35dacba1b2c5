//! Structured pipeline events: progress, benchmarks, start and end.
//!
//! The pipeline publishes [`PipelineEvent`]s on an [`EventSink`], a thin
//! wrapper over a Tokio broadcast channel. Every job running on a pipeline
//! produces into the same channel, and every event carries its `job_id`.
//! There can be any number of consumers, such as the CLI's progress bar or a
//! JSON-lines log. Nobody has to listen: emitting with zero subscribers is a
//! no-op and never affects the conversion.
//!
//! # Example
//!
//! ```rust
//! use pdf2video::{EventSink, PipelineEvent, ProgressTracker, Stage};
//!
//! let sink = EventSink::new(16);
//! let mut rx = sink.subscribe();
//!
//! let mut tracker = ProgressTracker::new("job-1", Stage::Raster, 3, sink.clone());
//! tracker.advance();
//! tracker.close();
//!
//! let mut percents = Vec::new();
//! while let Ok(PipelineEvent::Progress(p)) = rx.try_recv() {
//!     assert_eq!(p.job_id, "job-1");
//!     percents.push(p.percent);
//! }
//! assert_eq!(percents, vec![20, 100]);
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

/// The two stages that report progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Pages → frame images.
    Raster,
    /// Frame images → video.
    Render,
}

impl Stage {
    pub fn adjective(&self) -> &'static str {
        match self {
            Stage::Raster => "Rasterizing",
            Stage::Render => "Rendering",
        }
    }
}

/// What a benchmark event measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkKind {
    Raster,
    Render,
    Total,
}

impl BenchmarkKind {
    pub fn adjective(&self) -> &'static str {
        match self {
            BenchmarkKind::Raster => "rasterizing",
            BenchmarkKind::Render => "rendering",
            BenchmarkKind::Total => "converting",
        }
    }
}

/// Percentage update for one stage. `percent` is in `0..=100`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: String,
    pub stage: Stage,
    pub message: String,
    pub percent: u8,
}

/// Everything a job tells the outside world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    Start {
        job_id: String,
        message: String,
        source_name: String,
    },
    Progress(ProgressEvent),
    Benchmark {
        job_id: String,
        kind: BenchmarkKind,
        message: String,
        seconds: f64,
    },
    End {
        job_id: String,
        message: String,
        output_name: String,
        output_path: PathBuf,
    },
}

impl PipelineEvent {
    /// Flat event name, e.g. `progress_raster` or `benchmark_total`.
    pub fn event_name(&self) -> &'static str {
        match self {
            PipelineEvent::Start { .. } => "start",
            PipelineEvent::Progress(p) => match p.stage {
                Stage::Raster => "progress_raster",
                Stage::Render => "progress_render",
            },
            PipelineEvent::Benchmark { kind, .. } => match kind {
                BenchmarkKind::Raster => "benchmark_raster",
                BenchmarkKind::Render => "benchmark_render",
                BenchmarkKind::Total => "benchmark_total",
            },
            PipelineEvent::End { .. } => "end",
        }
    }

    /// Job the event belongs to.
    pub fn job_id(&self) -> &str {
        match self {
            PipelineEvent::Start { job_id, .. }
            | PipelineEvent::Benchmark { job_id, .. }
            | PipelineEvent::End { job_id, .. } => job_id,
            PipelineEvent::Progress(p) => &p.job_id,
        }
    }

    /// Human-readable message carried by every event.
    pub fn message(&self) -> &str {
        match self {
            PipelineEvent::Start { message, .. }
            | PipelineEvent::Benchmark { message, .. }
            | PipelineEvent::End { message, .. } => message,
            PipelineEvent::Progress(p) => &p.message,
        }
    }
}

/// Broadcasting producer handle. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventSink {
    /// A sink whose subscribers buffer up to `capacity` events each.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Like [`subscribe`](Self::subscribe) but as a `Stream`. Lagged
    /// subscribers see `Err(Lagged)` items and then resume.
    pub fn subscribe_stream(&self) -> BroadcastStream<PipelineEvent> {
        BroadcastStream::new(self.tx.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish an event. Never fails: no subscribers simply means nobody hears it.
    pub fn emit(&self, event: PipelineEvent) {
        debug!("event {}: {}", event.event_name(), event.message());
        let _ = self.tx.send(event);
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Turns discrete completion events into a monotonic percentage.
///
/// Each [`advance`](Self::advance) emits `round(100 * done / (total + 2))`.
/// The `+ 2` keeps the running value clear of 100 so the bar visibly waits
/// for the final flush; only [`close`](Self::close) emits 100. Extra
/// `advance` calls beyond `total` are capped at 99.
///
/// Monotonicity holds per job and stage; filter on `job_id` when several jobs
/// share a sink.
#[derive(Debug)]
pub struct ProgressTracker {
    job_id: String,
    stage: Stage,
    total: usize,
    done: usize,
    last_percent: u8,
    sink: EventSink,
}

impl ProgressTracker {
    pub fn new(job_id: impl Into<String>, stage: Stage, total: usize, sink: EventSink) -> Self {
        Self {
            job_id: job_id.into(),
            stage,
            total: total.max(1),
            done: 0,
            last_percent: 0,
            sink,
        }
    }

    /// Record one completed unit and emit the new percentage.
    pub fn advance(&mut self) -> u8 {
        self.done += 1;
        let raw = (100.0 * self.done as f64 / (self.total + 2) as f64).round();
        let percent = (raw.min(99.0) as u8).max(self.last_percent);
        self.last_percent = percent;
        self.emit(percent);
        percent
    }

    /// Emit the final 100, regardless of how many units were recorded.
    pub fn close(&mut self) -> u8 {
        self.last_percent = 100;
        self.emit(100);
        100
    }

    fn emit(&self, percent: u8) {
        self.sink.emit(PipelineEvent::Progress(ProgressEvent {
            job_id: self.job_id.clone(),
            stage: self.stage,
            message: format!("{}... {}/100", self.stage.adjective(), percent),
            percent,
        }));
    }
}

/// Wall-clock stopwatch that reports itself as a benchmark event.
#[derive(Debug, Clone, Copy)]
pub struct Benchmark {
    kind: BenchmarkKind,
    started: Instant,
}

impl Benchmark {
    pub fn start(kind: BenchmarkKind) -> Self {
        Self {
            kind,
            started: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Emit `"Finished <stage> in <n> seconds."` and return the seconds.
    pub fn finish(&self, job_id: &str, sink: &EventSink) -> f64 {
        let seconds = self.elapsed_secs();
        sink.emit(PipelineEvent::Benchmark {
            job_id: job_id.to_string(),
            kind: self.kind,
            message: format!(
                "Finished {} in {:.3} seconds.",
                self.kind.adjective(),
                seconds
            ),
            seconds,
        });
        seconds
    }
}
