//! Streaming video encoder driving an external `ffmpeg` process.
//!
//! Frames are piped into ffmpeg's stdin as a sequence of complete image
//! files (`-f image2pipe`). ffmpeg decodes each image as it arrives, so the
//! pipeline never holds more than one frame in memory and never writes an
//! intermediate image list to disk.
//!
//! stderr is drained on a background task for the whole session; an encoder
//! that fills its stderr pipe would otherwise block on write and deadlock
//! against our stdin writes.

use crate::backend::{EncoderSession, VideoEncoder};
use crate::config::{EncoderSettings, FrameRate};
use crate::error::{Pdf2VideoError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// [`VideoEncoder`] backed by the ffmpeg command-line tool.
#[derive(Debug, Clone, Default)]
pub struct FfmpegEncoder {
    settings: EncoderSettings,
}

impl FfmpegEncoder {
    pub fn new(settings: EncoderSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &EncoderSettings {
        &self.settings
    }

    /// Full argument list for one session, excluding the program name.
    pub fn command_args(&self, frame_rate: FrameRate, output_path: &Path) -> Vec<String> {
        let s = &self.settings;
        let mut args: Vec<String> = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-y",
            "-f",
            "image2pipe",
            "-framerate",
        ]
        .iter()
        .map(|a| a.to_string())
        .collect();
        args.push(frame_rate.to_string());
        args.extend(["-i".into(), "-".into(), "-c:v".into(), s.codec.clone()]);

        if let Some(pix_fmt) = &s.pixel_format {
            // yuv420p needs even dimensions.
            args.extend([
                "-vf".into(),
                "scale=trunc(iw/2)*2:trunc(ih/2)*2".into(),
                "-pix_fmt".into(),
                pix_fmt.clone(),
            ]);
        }
        if let Some(flags) = &s.movflags {
            args.extend(["-movflags".into(), flags.clone()]);
        }

        args.extend([
            "-r".into(),
            s.output_fps.to_string(),
            "-f".into(),
            s.container.clone(),
            output_path.to_string_lossy().into_owned(),
        ]);
        args
    }
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    async fn open(
        &self,
        frame_rate: FrameRate,
        output_path: &Path,
    ) -> Result<Box<dyn EncoderSession>> {
        let args = self.command_args(frame_rate, output_path);
        debug!("Spawning {} {}", self.settings.ffmpeg_path.display(), args.join(" "));

        let mut child = Command::new(&self.settings.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Pdf2VideoError::Encode(format!(
                        "ffmpeg not found at '{}'. Install ffmpeg or set PDF2VIDEO_FFMPEG.",
                        self.settings.ffmpeg_path.display()
                    ))
                } else {
                    Pdf2VideoError::Encode(format!("failed to start ffmpeg: {}", e))
                }
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Pdf2VideoError::Internal("ffmpeg stdin was not captured".into()))?;
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                if let Err(e) = stderr.read_to_end(&mut buf).await {
                    warn!("Reading ffmpeg stderr failed: {}", e);
                }
                buf
            })
        });

        info!(
            "Encoding {} at {} fps with {}",
            output_path.display(),
            frame_rate,
            self.settings.codec
        );

        Ok(Box::new(FfmpegSession {
            child,
            stdin: Some(stdin),
            stderr_task,
            output_path: output_path.to_path_buf(),
            frames: 0,
        }))
    }
}

struct FfmpegSession {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_task: Option<JoinHandle<Vec<u8>>>,
    output_path: PathBuf,
    frames: usize,
}

impl FfmpegSession {
    async fn collect_stderr(&mut self) -> String {
        match self.stderr_task.take() {
            Some(task) => match task.await {
                Ok(bytes) => String::from_utf8_lossy(&bytes).trim().to_string(),
                Err(_) => String::new(),
            },
            None => String::new(),
        }
    }
}

#[async_trait]
impl EncoderSession for FfmpegSession {
    async fn write_frame(&mut self, frame: &mut (dyn AsyncRead + Unpin + Send)) -> Result<u64> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Pdf2VideoError::Internal("encoder input already closed".into()))?;
        let index = self.frames + 1;
        let written = tokio::io::copy(frame, stdin).await.map_err(|e| {
            Pdf2VideoError::Encode(format!("writing frame {} to ffmpeg: {}", index, e))
        })?;
        self.frames += 1;
        Ok(written)
    }

    async fn finish(&mut self) -> Result<()> {
        if let Some(mut stdin) = self.stdin.take() {
            // A flush failure surfaces again as a non-zero exit below.
            if let Err(e) = stdin.flush().await {
                debug!("Flushing ffmpeg stdin failed: {}", e);
            }
        }

        let status = self
            .child
            .wait()
            .await
            .map_err(|e| Pdf2VideoError::Encode(format!("waiting for ffmpeg: {}", e)))?;
        let stderr = self.collect_stderr().await;

        if !status.success() {
            return Err(Pdf2VideoError::EncoderExited {
                status: status.to_string(),
                stderr,
            });
        }

        info!(
            "Encoded {} frames into {}",
            self.frames,
            self.output_path.display()
        );
        Ok(())
    }

    async fn abort(&mut self) {
        self.stdin.take();
        if let Err(e) = self.child.kill().await {
            debug!("Killing ffmpeg failed: {}", e);
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        warn!("Encoding of {} aborted", self.output_path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_command_line() {
        let enc = FfmpegEncoder::default();
        let rate = FrameRate::new(0.5).unwrap();
        let args = enc.command_args(rate, Path::new("/out/job.mp4"));
        assert_eq!(
            args.join(" "),
            "-hide_banner -loglevel error -y -f image2pipe -framerate 0.5 -i - -c:v libx264 \
             -vf scale=trunc(iw/2)*2:trunc(ih/2)*2 -pix_fmt yuv420p \
             -movflags frag_keyframe+empty_moov -r 25 -f mp4 /out/job.mp4"
        );
    }

    #[test]
    fn optional_flags_are_omitted() {
        let settings = EncoderSettings {
            codec: "libvpx-vp9".into(),
            container: "webm".into(),
            pixel_format: None,
            movflags: None,
            output_fps: 30,
            ..EncoderSettings::default()
        };
        let args = FfmpegEncoder::new(settings)
            .command_args(FrameRate::new(2.0).unwrap(), Path::new("v.webm"));
        assert!(!args.contains(&"-pix_fmt".to_string()));
        assert!(!args.contains(&"-movflags".to_string()));
        assert_eq!(&args[args.len() - 5..], ["-r", "30", "-f", "webm", "v.webm"]);
    }

    #[tokio::test]
    async fn missing_binary_is_encode_error() {
        let settings = EncoderSettings {
            ffmpeg_path: PathBuf::from("/nonexistent/ffmpeg-binary"),
            ..EncoderSettings::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let err = FfmpegEncoder::new(settings)
            .open(FrameRate::new(1.0).unwrap(), &dir.path().join("x.mp4"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Pdf2VideoError::Encode(ref m) if m.contains("not found")), "{err}");
    }
}
