//! Raw UDP video source
//!
//! The drone streams its encoded video as UDP datagrams of at most
//! [`FRAGMENT_SIZE`] bytes. A frame is split across full-size fragments and
//! terminated by a shorter one. This provider reassembles fragments into
//! frames without decoding them.

use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{debug, info, trace, warn};

use crate::provider::{FrameProvider, FrameSource};
use crate::types::VideoFrame;
use crate::{Result, TelloError};

/// Payload size of a full video fragment.
pub const FRAGMENT_SIZE: usize = 1460;

/// Frames larger than this are assumed to have lost their terminator and are dropped.
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

const RECV_BUFFER: usize = 2048;

/// Opens a [`UdpFrameProvider`] bound to the video address.
#[derive(Debug, Clone)]
pub struct UdpFrameSource {
    addr: SocketAddr,
}

impl UdpFrameSource {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }
}

#[async_trait::async_trait]
impl FrameSource for UdpFrameSource {
    async fn open(&self) -> Result<Box<dyn FrameProvider>> {
        Ok(Box::new(UdpFrameProvider::bind(self.addr).await?))
    }

    fn addr(&self) -> SocketAddr {
        self.addr
    }
}

/// Reassembles fragmented video datagrams into frames.
#[derive(Debug)]
pub struct UdpFrameProvider {
    socket: UdpSocket,
    buf: Vec<u8>,
    partial: Vec<u8>,
    frames: u64,
}

impl UdpFrameProvider {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| TelloError::socket_error(format!("bind video {}", addr), e))?;
        info!(%addr, "Video socket bound");
        Ok(Self { socket, buf: vec![0; RECV_BUFFER], partial: Vec::new(), frames: 0 })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(|e| TelloError::socket_error("video local_addr", e))
    }

    /// Append one datagram; returns a complete frame when it is the terminator.
    fn push_fragment(&mut self, len: usize) -> Option<Vec<u8>> {
        self.partial.extend_from_slice(&self.buf[..len]);
        if self.partial.len() > MAX_FRAME_BYTES {
            warn!(bytes = self.partial.len(), "Video frame exceeded limit, dropping");
            self.partial.clear();
            return None;
        }
        if len < FRAGMENT_SIZE && !self.partial.is_empty() {
            return Some(std::mem::take(&mut self.partial));
        }
        None
    }
}

#[async_trait::async_trait]
impl FrameProvider for UdpFrameProvider {
    async fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        loop {
            // recv_from is cancel safe; partial frames survive in `self`.
            let (len, from) = self
                .socket
                .recv_from(&mut self.buf)
                .await
                .map_err(|e| TelloError::socket_error("receive video", e))?;
            trace!(len, %from, "Video fragment");

            if let Some(data) = self.push_fragment(len) {
                self.frames += 1;
                if self.frames == 1 {
                    debug!(bytes = data.len(), "First video frame");
                }
                return Ok(Some(VideoFrame::new(data, from)));
            }
        }
    }
}
