//! Frame source implementations

pub mod udp;

pub use udp::{UdpFrameProvider, UdpFrameSource};
