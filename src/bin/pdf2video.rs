//! CLI binary for pdf2video.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig` / `ConversionRequest`, renders pipeline events and
//! prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf2video::{
    sweep_stale_frames, ConcurrencyPolicy, ConversionRequest, FrameFormat, FrameTiming, Pipeline,
    PipelineConfig, PipelineEvent, PipelinePaths, Scheduling, Stage, DEFAULT_STALE_AGE,
};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── Event rendering ──────────────────────────────────────────────────────────

/// Drive an indicatif bar from pipeline events until the channel closes.
///
/// Each stage reports 0–100; the bar is reset when the stage changes.
async fn render_progress(mut events: broadcast::Receiver<PipelineEvent>) {
    let bar = ProgressBar::new(100);
    let style = ProgressStyle::with_template(
        "{spinner:.cyan} {prefix:.bold:>11}  [{bar:42.green/238}] {pos:>3}%  ⏱ {elapsed_precise}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ")
    .tick_strings(TICKS);
    bar.set_style(style);
    bar.set_prefix("Preparing");
    bar.enable_steady_tick(Duration::from_millis(80));

    let mut stage: Option<Stage> = None;
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        };
        match event {
            PipelineEvent::Start { message, .. } => {
                bar.println(format!("{} {}", cyan("◆"), bold(&message)));
            }
            PipelineEvent::Progress(p) => {
                if stage != Some(p.stage) {
                    stage = Some(p.stage);
                    bar.reset();
                    bar.set_prefix(p.stage.adjective());
                }
                bar.set_position(u64::from(p.percent));
            }
            PipelineEvent::Benchmark { message, .. } => {
                bar.println(format!("  {} {}", green("✓"), dim(&message)));
            }
            PipelineEvent::End { message, .. } => {
                bar.println(format!("{} {}", green("✔"), message));
            }
        }
    }
    bar.finish_and_clear();
}

/// Print every event as one JSON line on stdout until the channel closes.
async fn print_json_events(mut events: broadcast::Receiver<PipelineEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!("Could not serialise event: {}", e),
            },
            Err(RecvError::Lagged(n)) => tracing::warn!("Dropped {} events", n),
            Err(RecvError::Closed) => break,
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Five seconds per page
  pdf2video slides.pdf --spf 5

  # Two pages per second, 720p, into ./out
  pdf2video deck.pdf --fps 2 --height 720 --output-dir out

  # Render one page at a time on a small machine
  pdf2video book.pdf --spf 3 --concurrency sequential

  # Inspect page count and size only
  pdf2video --inspect-only deck.pdf

  # Delete frame files left behind by crashed runs
  pdf2video --sweep-temp

  # Machine-readable events and result
  pdf2video deck.pdf --fps 1 --json-events --json

DIRECTORIES:
  Without --temp-dir / --output-dir, frames go to <root>/generated/temp and
  videos to <root>/generated/video, where <root> is --root (default: .).

ENVIRONMENT VARIABLES:
  PDF2VIDEO_FFMPEG        Path to the ffmpeg binary (default: ffmpeg on PATH)
  PDF2VIDEO_PDFIUM_LIB    Path to libpdfium (default: system library path)
  PDF2VIDEO_CONCURRENCY   Rasterization concurrency: sequential, unbounded or N
  RUST_LOG                Overrides the log filter
"#;

/// Convert PDF documents into slideshow videos.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2video",
    version,
    about = "Convert PDF documents into slideshow videos",
    long_about = "Rasterize every page of a PDF with pdfium and encode the frames, in page \
order, into a video with ffmpeg. Each page is shown for a fixed duration set with --fps or --spf.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF file to convert. Not needed with --sweep-temp.
    #[arg(required_unless_present = "sweep_temp")]
    input: Option<PathBuf>,

    /// Frames (pages) per second. Mutually exclusive with --spf.
    #[arg(long, env = "PDF2VIDEO_FPS")]
    fps: Option<String>,

    /// Seconds each page stays on screen. Mutually exclusive with --fps.
    #[arg(long, env = "PDF2VIDEO_SPF")]
    spf: Option<String>,

    /// Frame height in pixels; width follows the document's aspect ratio.
    #[arg(
        long,
        env = "PDF2VIDEO_HEIGHT",
        default_value_t = pdf2video::config::DEFAULT_TARGET_HEIGHT
    )]
    height: u32,

    /// Rasterization concurrency: sequential, unbounded, or a number ≥ 1.
    #[arg(short, long, env = "PDF2VIDEO_CONCURRENCY", default_value = "8")]
    concurrency: ConcurrencyPolicy,

    /// Rasterization scheduling: chunked or windowed.
    #[arg(long, env = "PDF2VIDEO_SCHEDULING", default_value = "chunked")]
    scheduling: Scheduling,

    /// Frame image format: png or jpeg.
    #[arg(long, env = "PDF2VIDEO_FRAME_FORMAT", default_value = "png")]
    frame_format: FrameFormat,

    /// Root for the default upload/ and generated/ directories.
    #[arg(long, env = "PDF2VIDEO_ROOT", default_value = ".")]
    root: PathBuf,

    /// Directory for temporary frame files.
    #[arg(long, env = "PDF2VIDEO_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// Directory for the finished video.
    #[arg(short, long, env = "PDF2VIDEO_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// ffmpeg executable.
    #[arg(long, env = "PDF2VIDEO_FFMPEG")]
    ffmpeg: Option<PathBuf>,

    /// libpdfium shared library.
    #[arg(long, env = "PDF2VIDEO_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// Print the result (ConversionOutput) as JSON on stdout.
    #[arg(long, env = "PDF2VIDEO_JSON")]
    json: bool,

    /// Stream pipeline events as JSON lines on stdout.
    #[arg(long, env = "PDF2VIDEO_JSON_EVENTS")]
    json_events: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2VIDEO_NO_PROGRESS")]
    no_progress: bool,

    /// Print page count and page size only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Delete temp files older than one hour, then exit.
    #[arg(long)]
    sweep_temp: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2VIDEO_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2VIDEO_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.json_events;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let paths = build_paths(&cli);

    // ── Sweep mode ───────────────────────────────────────────────────────
    if cli.sweep_temp {
        let report = sweep_stale_frames(&paths.temp_dir, DEFAULT_STALE_AGE)
            .await
            .with_context(|| format!("Failed to sweep {}", paths.temp_dir.display()))?;
        if !cli.quiet {
            eprintln!(
                "Removed {}/{} files from {}",
                report.removed,
                report.scanned,
                paths.temp_dir.display()
            );
        }
        return Ok(());
    }

    let input = cli
        .input
        .clone()
        .context("An input PDF is required")?;
    let config = build_config(&cli)?;
    let pipeline = Pipeline::new(config);

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let info = pipeline
            .inspect(&input)
            .await
            .context("Failed to inspect PDF")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialize document info")?
            );
        } else {
            let sample = pdf2video::DocumentInfo::sample_page(info.page_count);
            println!("File:         {}", input.display());
            println!("Pages:        {}", info.page_count);
            println!("Page {:<7} {} x {} pt", format!("{sample}:"), info.width, info.height);
            println!(
                "Frame size:   {} x {} px",
                info.scaled_width(pipeline.config().target_height),
                pipeline.config().target_height
            );
        }
        return Ok(());
    }

    // ── Build request ────────────────────────────────────────────────────
    let timing = FrameTiming::from_text(cli.fps.as_deref(), cli.spf.as_deref())
        .context("Invalid frame timing")?;
    let request = ConversionRequest::builder(&input)
        .timing(timing)
        .concurrency(cli.concurrency)
        .paths(&paths)
        .build()
        .context("Invalid request")?;

    // ── Run conversion ───────────────────────────────────────────────────
    let listener = if cli.json_events {
        Some(tokio::spawn(print_json_events(pipeline.subscribe())))
    } else if show_progress {
        Some(tokio::spawn(render_progress(pipeline.subscribe())))
    } else {
        None
    };

    let result = pipeline.convert(&request).await;

    // Dropping the pipeline closes the event channel, which ends the listener.
    drop(pipeline);
    if let Some(listener) = listener {
        listener.await.ok();
    }

    let output = result.context("Conversion failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        eprintln!(
            "{}  {} pages  {}x{} @ {} fps  {:.2}s  →  {}",
            green("✔"),
            output.document.page_count,
            output.frame_width,
            output.frame_height,
            output.frame_rate,
            output.stats.total_secs,
            bold(&output.video_path.display().to_string()),
        );
    }

    Ok(())
}

/// Directory layout from `--root`, with explicit overrides.
fn build_paths(cli: &Cli) -> PipelinePaths {
    let mut paths = PipelinePaths::under(&cli.root);
    if let Some(ref dir) = cli.temp_dir {
        paths.temp_dir = dir.clone();
    }
    if let Some(ref dir) = cli.output_dir {
        paths.output_dir = dir.clone();
    }
    paths
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .target_height(cli.height)
        .scheduling(cli.scheduling)
        .frame_format(cli.frame_format);

    if let Some(ref ffmpeg) = cli.ffmpeg {
        builder = builder.ffmpeg_path(ffmpeg);
    }
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_library(lib);
    }

    builder.build().context("Invalid configuration")
}
