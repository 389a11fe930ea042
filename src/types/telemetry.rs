//! Telemetry packet parsing
//!
//! The drone broadcasts its state roughly ten times a second as
//! `key:value;key:value;...;`. Keys come from a fixed schema; each key has a
//! declared scalar type. Fields that are unknown or fail to parse are dropped
//! and recorded in [`TelemetryRecord::rejected_fields`]; the rest of the
//! packet is kept.

use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::SystemTime;
use tracing::trace;

use crate::{Result, TelloError};

/// Separator between telemetry fields. Its presence marks a datagram as telemetry.
pub const FIELD_SEPARATOR: char = ';';

const KEY_VALUE_SEPARATOR: char = ':';
const VECTOR_SEPARATOR: char = ',';

/// Declared type of a telemetry field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FieldKind {
    Integer,
    Float,
    /// Comma-separated floats
    FloatVector,
}

/// Known telemetry keys and their types.
pub const TELEMETRY_SCHEMA: &[(&str, FieldKind)] = &[
    ("mid", FieldKind::Integer),
    ("x", FieldKind::Integer),
    ("y", FieldKind::Integer),
    ("z", FieldKind::Integer),
    ("mpry", FieldKind::FloatVector),
    ("pitch", FieldKind::Integer),
    ("roll", FieldKind::Integer),
    ("yaw", FieldKind::Integer),
    ("vgx", FieldKind::Integer),
    ("vgy", FieldKind::Integer),
    ("vgz", FieldKind::Integer),
    ("templ", FieldKind::Integer),
    ("temph", FieldKind::Integer),
    ("tof", FieldKind::Integer),
    ("h", FieldKind::Integer),
    ("bat", FieldKind::Integer),
    ("baro", FieldKind::Float),
    ("time", FieldKind::Integer),
    ("agx", FieldKind::Float),
    ("agy", FieldKind::Float),
    ("agz", FieldKind::Float),
];

/// Look up a key in the schema, returning the canonical static key and its type.
pub fn schema_field(key: &str) -> Option<(&'static str, FieldKind)> {
    TELEMETRY_SCHEMA.iter().find(|(name, _)| *name == key).copied()
}

/// Whether a decoded datagram is a telemetry packet rather than a reply.
pub fn is_telemetry(text: &str) -> bool {
    text.contains(FIELD_SEPARATOR)
}

/// A typed telemetry value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TelemetryValue {
    Integer(i64),
    Float(f64),
    Vector(Vec<f64>),
}

impl TelemetryValue {
    /// Parse `raw` as `kind`.
    pub fn parse(key: &str, kind: FieldKind, raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let malformed = |reason: &str| TelloError::malformed_telemetry(key, raw, reason);
        match kind {
            FieldKind::Integer => {
                raw.parse().map(TelemetryValue::Integer).map_err(|_| malformed("expected integer"))
            }
            FieldKind::Float => {
                raw.parse().map(TelemetryValue::Float).map_err(|_| malformed("expected float"))
            }
            FieldKind::FloatVector => raw
                .split(VECTOR_SEPARATOR)
                .map(|part| part.trim().parse::<f64>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(TelemetryValue::Vector)
                .map_err(|_| malformed("expected comma-separated floats")),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TelemetryValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TelemetryValue::Float(v) => Some(*v),
            TelemetryValue::Integer(v) => Some(*v as f64),
            TelemetryValue::Vector(_) => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            TelemetryValue::Vector(v) => Some(v),
            _ => None,
        }
    }
}

impl std::fmt::Display for TelemetryValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TelemetryValue::Integer(v) => write!(f, "{}", v),
            TelemetryValue::Float(v) => write!(f, "{}", v),
            TelemetryValue::Vector(values) => {
                let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

/// One parsed telemetry packet.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryRecord {
    values: BTreeMap<&'static str, TelemetryValue>,
    rejected: Vec<String>,
    timestamp: SystemTime,
    addr: SocketAddr,
}

macro_rules! integer_fields {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $name(&self) -> Option<i64> {
                self.integer(stringify!($name))
            }
        )*
    };
}

macro_rules! float_fields {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $name(&self) -> Option<f64> {
                self.float(stringify!($name))
            }
        )*
    };
}

impl TelemetryRecord {
    /// Parse a telemetry datagram. Never fails: bad fields are dropped.
    pub fn parse(data: &str, addr: SocketAddr) -> Self {
        let mut values = BTreeMap::new();
        let mut rejected = Vec::new();

        for segment in data.trim().split(FIELD_SEPARATOR) {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }

            let Some((key, raw)) = segment.split_once(KEY_VALUE_SEPARATOR) else {
                trace!(segment, "Dropping telemetry segment without key separator");
                rejected.push(segment.to_string());
                continue;
            };
            let key = key.trim();

            let Some((name, kind)) = schema_field(key) else {
                trace!(key, "Dropping unknown telemetry key");
                rejected.push(key.to_string());
                continue;
            };

            match TelemetryValue::parse(name, kind, raw) {
                Ok(value) => {
                    values.insert(name, value);
                }
                Err(e) => {
                    trace!(error = %e, "Dropping malformed telemetry field");
                    rejected.push(name.to_string());
                }
            }
        }

        Self { values, rejected, timestamp: SystemTime::now(), addr }
    }

    pub fn get(&self, key: &str) -> Option<&TelemetryValue> {
        self.values.get(key)
    }

    /// Parsed fields in key order.
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &TelemetryValue)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Keys (or raw segments) dropped during parsing.
    pub fn rejected_fields(&self) -> &[String] {
        &self.rejected
    }

    /// Capture time.
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Source address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn integer(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(TelemetryValue::as_i64)
    }

    pub fn float(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(TelemetryValue::as_f64)
    }

    /// Mission pad pitch/roll/yaw.
    pub fn mpry(&self) -> Option<&[f64]> {
        self.get("mpry").and_then(TelemetryValue::as_vector)
    }

    integer_fields! {
        /// Mission pad id, -1 when none is detected
        mid,
        x,
        y,
        z,
        /// Degrees
        pitch,
        /// Degrees
        roll,
        /// Degrees
        yaw,
        /// Speed along x, dm/s
        vgx,
        vgy,
        vgz,
        /// Lowest temperature, °C
        templ,
        /// Highest temperature, °C
        temph,
        /// Time-of-flight distance, cm
        tof,
        /// Height, cm
        h,
        /// Battery percentage
        bat,
        /// Motor on time, s
        time,
    }

    float_fields! {
        /// Barometer altitude, m
        baro,
        agx,
        agy,
        agz,
    }

    /// One `key: value` line per field, then timestamp and address.
    pub fn summary(&self) -> String {
        let mut lines: Vec<String> =
            self.values.iter().map(|(key, value)| format!("{}: {}", key, value)).collect();
        lines.push(format!("timestamp: {:?}", self.timestamp));
        lines.push(format!("addr: {}", self.addr));
        lines.join("\n")
    }
}
