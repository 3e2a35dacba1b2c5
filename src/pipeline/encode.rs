//! Video encoding stage: stream page-ordered frames into one encoder session.
//!
//! Frames are read from disk one at a time and copied into the session, so
//! memory use is independent of page count. Frame *i* is written only after
//! frame *i − 1* has been fully consumed; the encoder therefore sees the
//! pages in document order.

use crate::backend::{EncoderSession, VideoEncoder};
use crate::config::FrameRate;
use crate::error::{Pdf2VideoError, Result};
use crate::output::FrameArtifact;
use crate::progress::{EventSink, ProgressTracker, Stage};
use std::path::Path;
use tracing::debug;

/// Feeds a job's frames to a [`VideoEncoder`].
pub struct StreamingEncodeStage<'a> {
    encoder: &'a dyn VideoEncoder,
    events: &'a EventSink,
}

impl<'a> StreamingEncodeStage<'a> {
    pub fn new(encoder: &'a dyn VideoEncoder, events: &'a EventSink) -> Self {
        Self { encoder, events }
    }

    /// Encode job `job_id`'s `frames` at `frame_rate` into `output_path`.
    ///
    /// Returns the number of frame bytes streamed. On any failure the session
    /// is aborted before the error is returned.
    pub async fn run(
        &self,
        job_id: &str,
        frames: &[FrameArtifact],
        frame_rate: FrameRate,
        output_path: &Path,
    ) -> Result<u64> {
        if frames.is_empty() {
            return Err(Pdf2VideoError::Encode("no frames to encode".into()));
        }
        if let Some(pair) = frames.windows(2).find(|w| w[0].page >= w[1].page) {
            return Err(Pdf2VideoError::Internal(format!(
                "frames out of order: page {} before page {}",
                pair[0].page, pair[1].page
            )));
        }

        let mut session = self.encoder.open(frame_rate, output_path).await?;
        let mut tracker =
            ProgressTracker::new(job_id, Stage::Render, frames.len(), self.events.clone());
        let mut streamed = 0u64;

        for frame in frames {
            match stream_frame(session.as_mut(), frame).await {
                Ok(n) => streamed += n,
                Err(e) => {
                    session.abort().await;
                    return Err(e);
                }
            }
            tracker.advance();
        }
        tracker.close();

        if let Err(e) = session.finish().await {
            session.abort().await;
            return Err(e);
        }
        debug!("Job {}: streamed {} frames ({} bytes)", job_id, frames.len(), streamed);
        Ok(streamed)
    }
}

async fn stream_frame(session: &mut dyn EncoderSession, frame: &FrameArtifact) -> Result<u64> {
    let mut file = tokio::fs::File::open(&frame.path)
        .await
        .map_err(|e| Pdf2VideoError::io(&frame.path, e))?;
    let written = session.write_frame(&mut file).await?;
    debug!("Frame {} → encoder ({} bytes)", frame.page, written);
    Ok(written)
}
