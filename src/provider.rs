//! Provider traits for the video channel
//!
//! Video decoding is not part of this crate. A [`FrameSource`] opens the
//! stream when the video loop starts and hands back a [`FrameProvider`] that
//! yields frames until the stream ends. The built-in source reassembles the
//! raw elementary stream; a decoder is plugged in by implementing these
//! traits around it.

use std::net::SocketAddr;

use crate::Result;
use crate::types::VideoFrame;

/// An open video stream
#[async_trait::async_trait]
pub trait FrameProvider: Send + 'static {
    /// Get the next frame
    ///
    /// Returns:
    /// - `Ok(Some(frame))` - New frame available
    /// - `Ok(None)` - Stream ended (normal termination)
    /// - `Err(e)` - Error occurred; the video loop backs off and retries
    async fn next_frame(&mut self) -> Result<Option<VideoFrame>>;
}

/// Opens video streams
///
/// Called each time the video loop starts, so a stopped stream can be
/// reopened.
#[async_trait::async_trait]
pub trait FrameSource: Send + Sync + 'static {
    async fn open(&self) -> Result<Box<dyn FrameProvider>>;

    /// Address identifying the stream
    fn addr(&self) -> SocketAddr;
}
