//! Error types for drone control and telemetry.
//!
//! All errors implement `std::error::Error` and carry enough structured context
//! to decide whether a retry makes sense.
//!
//! ## Error Categories
//!
//! - **Dispatch Errors**: unknown command names or wrong argument counts
//! - **Lifecycle Errors**: starting a loop that is already running
//! - **Data Errors**: malformed telemetry fields, undecodable or orphaned replies
//! - **Transport Errors**: socket bind/send/receive failures
//! - **Configuration Errors**: unreadable or invalid session configuration
//!
//! Structural errors are returned to the caller of the offending operation.
//! Data errors are produced inside the receive loops, logged and absorbed.
//!
//! ```rust
//! use tellolink::TelloError;
//!
//! let error = TelloError::unknown_command("barrel-roll");
//! assert!(!error.is_retryable());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

/// Result type alias for drone operations.
pub type Result<T, E = TelloError> = std::result::Result<T, E>;

/// Main error type for drone operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TelloError {
    #[error("Unknown command '{name}'")]
    UnknownCommand { name: String },

    #[error("Command '{name}' takes {expected} argument(s), {found} given")]
    ArityMismatch { name: String, expected: usize, found: usize },

    #[error("{component} is already running")]
    AlreadyRunning { component: String },


    #[error("Malformed telemetry field '{key}' = '{value}': {reason}")]
    MalformedTelemetry { key: String, value: String, reason: String },

    #[error("No pending response for reply '{body}'")]
    OrphanResponse { body: String },

    #[error("Response to '{command}' was already completed")]
    AlreadyCompleted { command: String },

    #[error("Command '{command}' was aborted: {reason}")]
    Aborted { command: String, reason: String },

    #[error("Cannot decode reply '{body}' as {expected}")]
    Decode { expected: String, body: String },

    #[error("Socket {operation} failed")]
    Socket {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {reason}")]
    Config {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Video stream error: {reason}")]
    Video {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl TelloError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            TelloError::Socket { .. } => true,
            TelloError::Timeout { .. } => true,
            TelloError::Video { .. } => true,
            TelloError::OrphanResponse { .. } => true,
            TelloError::UnknownCommand { .. } => false,
            TelloError::ArityMismatch { .. } => false,
            TelloError::AlreadyRunning { .. } => false,
            TelloError::Aborted { .. } => true,
            TelloError::MalformedTelemetry { .. } => false,
            TelloError::AlreadyCompleted { .. } => false,
            TelloError::Decode { .. } => false,
            TelloError::Config { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            TelloError::UnknownCommand { .. } => vec![
                "Check the command name against the catalog",
                "Use the typed dispatcher methods instead of raw names",
            ],
            TelloError::ArityMismatch { .. } => vec![
                "Pass exactly the number of arguments the command declares",
                "Check the command's arity in the catalog",
            ],
            TelloError::AlreadyRunning { .. } => {
                vec!["Check is_started() before calling start()", "Call stop() before restarting"]
            }
            TelloError::Aborted { .. } => {
                vec!["Check the socket error logged for the send", "Resend the command"]
            }
            TelloError::MalformedTelemetry { .. } => vec![
                "Verify the drone firmware version",
                "Inspect rejected_fields() on the telemetry record",
            ],
            TelloError::OrphanResponse { .. } => vec![
                "Issue commands one at a time",
                "Enable serialize_commands in the session configuration",
            ],
            TelloError::AlreadyCompleted { .. } => {
                vec!["Only the receive loop should complete responses"]
            }
            TelloError::Decode { .. } => vec![
                "Check the declared result type of the command",
                "Inspect the raw reply body",
            ],
            TelloError::Socket { .. } => vec![
                "Ensure the host is connected to the drone's WiFi network",
                "Check that the local port is not already bound",
                "Verify firewall rules allow UDP traffic",
            ],
            TelloError::Config { .. } => vec![
                "Check the configuration file exists and is valid YAML",
                "Ensure capacities and timeouts are non-zero",
            ],
            TelloError::Timeout { .. } => vec![
                "Increase response_timeout_ms",
                "Check the drone is powered on and in SDK mode",
                "Send the 'command' command to enter SDK mode",
            ],
            TelloError::Video { .. } => vec![
                "Send 'streamon' before starting video",
                "Check the video port is not already bound",
            ],
        }
    }

    /// Helper constructor for unknown command errors.
    pub fn unknown_command(name: impl Into<String>) -> Self {
        TelloError::UnknownCommand { name: name.into() }
    }

    /// Helper constructor for socket errors with the failing operation.
    pub fn socket_error(operation: impl Into<String>, source: std::io::Error) -> Self {
        TelloError::Socket { operation: operation.into(), source }
    }

    /// Helper constructor for lifecycle errors.
    pub fn already_running(component: impl Into<String>) -> Self {
        TelloError::AlreadyRunning { component: component.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config_error(reason: impl Into<String>) -> Self {
        TelloError::Config { reason: reason.into(), source: None }
    }

    /// Helper constructor for configuration errors with source.
    pub fn config_error_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        TelloError::Config { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for telemetry field errors.
    pub fn malformed_telemetry(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        TelloError::MalformedTelemetry {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Helper constructor for video errors.
    pub fn video_error(reason: impl Into<String>) -> Self {
        TelloError::Video { reason: reason.into(), source: None }
    }
}

impl From<std::io::Error> for TelloError {
    fn from(err: std::io::Error) -> Self {
        TelloError::Socket { operation: "<unknown>".to_string(), source: err }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
          #[test]
          fn error_messages_carry_their_context(
            name in "[a-z?]{1,12}",
            expected in 0usize..5,
            found in 0usize..5,
            body in "[a-z0-9 ]*",
          ) {
            let unknown = TelloError::unknown_command(name.clone());
            prop_assert!(unknown.to_string().contains(&name));

            let arity = TelloError::ArityMismatch { name: name.clone(), expected, found };
            let msg = arity.to_string();
            prop_assert!(msg.contains(&expected.to_string()));
            prop_assert!(msg.contains(&found.to_string()));

            let orphan = TelloError::OrphanResponse { body: body.clone() };
            prop_assert!(orphan.to_string().contains(&body));
          }

          #[test]
          fn io_conversion_preserves_message(reason in ".*") {
            let io_err = std::io::Error::other(reason.clone());
            let converted: TelloError = io_err.into();
            match converted {
              TelloError::Socket { source, .. } => prop_assert_eq!(source.to_string(), reason),
              _ => prop_assert!(false, "Expected Socket error from io::Error conversion"),
            }
          }
        }
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<TelloError>();

        let error = TelloError::already_running("state receiver");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn retry_classification() {
        assert!(!TelloError::unknown_command("flip").is_retryable());
        assert!(!TelloError::already_running("video receiver").is_retryable());
        assert!(TelloError::Timeout { duration: Duration::from_secs(15) }.is_retryable());
        assert!(
            TelloError::socket_error("send", std::io::Error::other("unreachable")).is_retryable()
        );
    }

    #[test]
    fn recovery_suggestions_are_descriptive() {
        let errors = [
            TelloError::unknown_command("flip"),
            TelloError::config_error("zero capacity"),
            TelloError::video_error("bind failed"),
            TelloError::OrphanResponse { body: "ok".to_string() },
        ];
        for error in &errors {
            let suggestions = error.recovery_suggestions();
            assert!(!suggestions.is_empty());
            assert!(suggestions.iter().all(|s| s.len() > 5));
        }
    }

    #[test]
    fn socket_error_exposes_source() {
        let error = TelloError::socket_error("bind", std::io::Error::other("address in use"));
        let source = std::error::Error::source(&error).expect("socket error has a source");
        assert_eq!(source.to_string(), "address in use");
    }
}
