//! Video frame type

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

/// One frame from the video channel.
///
/// The buffer is opaque: either a reassembled encoded frame or, when a decoder
/// sits behind the frame source, a decoded image.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Frame buffer (shared, never copied after capture)
    pub data: Arc<[u8]>,

    /// Capture time
    pub timestamp: SystemTime,

    /// Address the frame came from
    pub addr: SocketAddr,
}

impl VideoFrame {
    pub fn new(data: Vec<u8>, addr: SocketAddr) -> Self {
        Self { data: data.into(), timestamp: SystemTime::now(), addr }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "timestamp: {:?}\naddress: {}\nframe: {} bytes",
            self.timestamp,
            self.addr,
            self.len()
        )
    }
}
