//! Core types for commands, responses, telemetry and video.
//!
//! - [`CommandSpec`] describes one command kind: wire token, arity,
//!   [`Classification`] and declared [`ResultType`]
//! - [`Response`] tracks one issued command from send to reply (or timeout)
//! - [`TelemetryRecord`] is one parsed `key:value;` state packet
//! - [`VideoFrame`] is one opaque frame buffer from the video channel
//!
//! ```rust
//! use tellolink::types::TelemetryRecord;
//!
//! let addr = "192.168.10.1:8889".parse().unwrap();
//! let record = TelemetryRecord::parse("bat:87;baro:12.5;mpry:0,0,0;", addr);
//! assert_eq!(record.bat(), Some(87));
//! assert_eq!(record.mpry(), Some(&[0.0, 0.0, 0.0][..]));
//! ```

mod command;
mod frame;
mod response;
mod telemetry;
mod update_rate;

pub use command::{Classification, CommandSpec, ResultType, SUCCESS_TOKEN};
pub use frame::VideoFrame;
pub use response::{Completion, Response, ResponseBody};
pub use telemetry::{
    FIELD_SEPARATOR, FieldKind, TELEMETRY_SCHEMA, TelemetryRecord, TelemetryValue, is_telemetry,
    schema_field,
};
pub use update_rate::UpdateRate;
