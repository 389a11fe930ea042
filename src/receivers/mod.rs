//! Background receive loops
//!
//! Two loops run independently of each other and of the caller: the state
//! receiver multiplexes replies and telemetry from the command socket, the
//! video receiver pulls frames from a [`FrameSource`](crate::provider::FrameSource).

pub mod state;
pub mod video;

pub use state::{Observer, Route, StateReceiver, route_datagram};
pub use video::VideoReceiver;
