//! Video receive loop

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, error, info, trace};

use crate::Result;
use crate::driver::{Driver, ErrorBudget, LoopState};
use crate::history::History;
use crate::provider::FrameSource;
use crate::types::VideoFrame;

/// Pulls frames from a source into the video history.
pub struct VideoReceiver {
    source: Arc<dyn FrameSource>,
    frames: Arc<History<VideoFrame>>,
    driver: Driver,
    max_errors: u32,
}

impl VideoReceiver {
    pub fn new(source: Arc<dyn FrameSource>, frames: Arc<History<VideoFrame>>) -> Self {
        Self { source, frames, driver: Driver::new("video receiver"), max_errors: 10 }
    }

    pub fn with_max_errors(mut self, max_errors: u32) -> Self {
        self.max_errors = max_errors;
        self
    }

    /// Open the source and start pulling frames.
    pub fn start(&self, span: Span) -> Result<()> {
        let source = Arc::clone(&self.source);
        let frames = Arc::clone(&self.frames);
        let budget = ErrorBudget::new(self.max_errors);
        self.driver.spawn(span, move |cancel| video_loop(source, frames, budget, cancel))
    }

    pub fn stop(&self) {
        self.driver.stop();
    }

    pub async fn join(&self) -> Result<()> {
        self.driver.join().await
    }

    pub fn is_receiving(&self) -> bool {
        self.driver.is_receiving()
    }

    pub fn state(&self) -> LoopState {
        self.driver.state()
    }
}

async fn video_loop(
    source: Arc<dyn FrameSource>,
    frames: Arc<History<VideoFrame>>,
    mut budget: ErrorBudget,
    cancel: CancellationToken,
) {
    let addr = source.addr();
    info!(%addr, "Opening video stream");

    let opened = tokio::select! {
        _ = cancel.cancelled() => return,
        opened = source.open() => opened,
    };
    let mut provider = match opened {
        Ok(provider) => provider,
        Err(e) => {
            error!(%addr, "Failed to open video stream: {}", e);
            return;
        }
    };

    let mut frame_count = 0u64;
    loop {
        if cancel.is_cancelled() {
            break;
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = provider.next_frame() => result,
        };

        match result {
            Ok(Some(frame)) => {
                budget.record_success();
                frame_count += 1;
                trace!(frame = frame_count, bytes = frame.len(), "Video frame");
                frames.append(frame);
            }
            Ok(None) => {
                info!("Video stream ended");
                break;
            }
            Err(e) => {
                error!("Video error ({}/{}): {}", budget.count() + 1, budget.max_errors(), e);
                let Some(backoff) = budget.record_failure() else {
                    error!("Too many video errors, stopping video receiver");
                    break;
                };
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }
    }

    debug!(frames = frame_count, "Video loop exited");
}
