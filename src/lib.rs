//! Command, response and telemetry client for Tello-class drones.
//!
//! The drone speaks plain text over UDP: commands go out as `token arg ...`,
//! replies (`ok`, `error`, or a value) and a `key:value;` telemetry broadcast
//! come back on the same socket, and video arrives on a second port.
//!
//! # Features
//!
//! - **Reply correlation**: replies carry no request id; each command's
//!   [`Response`] is registered before sending and completed by the next reply
//! - **Telemetry**: typed [`TelemetryRecord`]s parsed from every state packet
//! - **Bounded history**: every stream is kept in a fixed-size [`History`]
//!   with O(1) access to the newest entry
//! - **Video**: frames pulled from a pluggable [`FrameSource`]
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use tellolink::{Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> tellolink::Result<()> {
//!     let session = Session::bind(SessionConfig::default()).await?;
//!     session.start()?;
//!
//!     let response = session.commands().command().await?;
//!     response.wait().await?;
//!
//!     let takeoff = session.commands().takeoff().await?;
//!     if takeoff.wait().await.is_ok() && takeoff.is_success() {
//!         if let Some(state) = session.latest_telemetry() {
//!             println!("battery: {:?}%", state.bat());
//!         }
//!         session.commands().land().await?;
//!     }
//!
//!     session.stop_all();
//!     session.join().await
//! }
//! ```

// Core types and error handling
mod error;
pub mod history;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Commands and receive loops
pub mod catalog;
pub mod dispatcher;
pub mod driver;
pub mod receivers;

// Video sources
pub mod provider;
pub mod providers;

// Facade and supporting modules
pub mod config;
pub mod logging;
pub mod session;
pub mod stream;

// Core exports
pub use error::*;
pub use history::History;
pub use types::*;

// Main API exports
pub use catalog::{CATALOG, CommandCatalog};
pub use config::SessionConfig;
pub use dispatcher::Dispatcher;
pub use provider::{FrameProvider, FrameSource};
pub use session::Session;

/// Entry point for drone sessions.
///
/// ```rust,no_run
/// use tellolink::Tello;
///
/// #[tokio::main]
/// async fn main() -> tellolink::Result<()> {
///     let session = Tello::connect().await?;
///     session.commands().command().await?;
///     Ok(())
/// }
/// ```
pub struct Tello;

impl Tello {
    /// Bind a session with the default access-point configuration and start
    /// the command/telemetry loop.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The local command port cannot be bound
    /// - Called outside a tokio runtime
    pub async fn connect() -> Result<Session> {
        Self::connect_with(SessionConfig::default()).await
    }

    /// Bind and start a session with `config`.
    pub async fn connect_with(config: SessionConfig) -> Result<Session> {
        let session = Session::bind(config).await?;
        session.start()?;
        Ok(session)
    }
}
