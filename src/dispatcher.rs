//! Command dispatch
//!
//! The wire protocol has no request id, so replies are matched by order: the
//! dispatcher appends the pending [`Response`] to the response history
//! *before* the datagram leaves, and the receive loop completes whichever
//! response is newest. That is only sound with one command in flight; set
//! `serialize_commands` to have the dispatcher enforce it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, trace, warn};

use crate::catalog::{self, CommandCatalog};
use crate::history::History;
use crate::types::{CommandSpec, Response};
use crate::{Result, TelloError};

/// Serializes commands and registers their pending responses.
#[derive(Debug)]
pub struct Dispatcher {
    socket: Arc<UdpSocket>,
    target: SocketAddr,
    responses: Arc<History<Response>>,
    catalog: &'static CommandCatalog,
    timeout: Duration,
    serialize: bool,
    gate: Mutex<()>,
}

macro_rules! no_argument_commands {
    ($($(#[$doc:meta])* $method:ident => $spec:path),* $(,)?) => {
        $(
            $(#[$doc])*
            pub async fn $method(&self) -> Result<Arc<Response>> {
                self.dispatch(&$spec, Vec::new()).await
            }
        )*
    };
}

macro_rules! single_argument_commands {
    ($($(#[$doc:meta])* $method:ident($arg:ident) => $spec:path),* $(,)?) => {
        $(
            $(#[$doc])*
            pub async fn $method(&self, $arg: i32) -> Result<Arc<Response>> {
                self.dispatch(&$spec, vec![$arg.to_string()]).await
            }
        )*
    };
}

impl Dispatcher {
    pub fn new(
        socket: Arc<UdpSocket>,
        target: SocketAddr,
        responses: Arc<History<Response>>,
        timeout: Duration,
    ) -> Self {
        Self {
            socket,
            target,
            responses,
            catalog: CommandCatalog::standard(),
            timeout,
            serialize: false,
            gate: Mutex::new(()),
        }
    }

    /// Wait for the previous command to finish before sending the next one.
    pub fn with_serialized_commands(mut self, serialize: bool) -> Self {
        self.serialize = serialize;
        self
    }

    /// Send a command by name.
    ///
    /// Fails with `UnknownCommand` or `ArityMismatch` before anything is
    /// registered or sent. On success exactly one response has been appended
    /// and one datagram sent; the returned response completes asynchronously.
    pub async fn execute<A: ToString>(&self, name: &str, args: &[A]) -> Result<Arc<Response>> {
        let spec = self.catalog.lookup(name)?;
        let args = args.iter().map(ToString::to_string).collect();
        self.dispatch(spec, args).await
    }

    async fn dispatch(&self, spec: &CommandSpec, args: Vec<String>) -> Result<Arc<Response>> {
        spec.check_arity(args.len())?;
        let _gate = if self.serialize { Some(self.wait_for_in_flight().await) } else { None };

        let line = spec.construct(&args);
        // Registered before sending so a fast reply always finds it.
        let response = self.responses.append(Response::new(*spec, args, self.timeout));

        debug!(command = %line, target = %self.target, "Sending command");
        if let Err(e) = self.socket.send_to(line.as_bytes(), self.target).await {
            // Settle it so the gate and the receive loop stop treating it as in flight.
            let _ = response.abort(e.to_string());
            warn!(command = %line, target = %self.target, error = %e, "Command send failed");
            return Err(TelloError::socket_error(format!("send '{}'", line), e));
        }
        Ok(response)
    }

    async fn wait_for_in_flight(&self) -> MutexGuard<'_, ()> {
        let guard = self.gate.lock().await;
        if let Some(previous) = self.responses.latest() {
            if previous.is_pending() {
                trace!(command = previous.command(), "Waiting for in-flight command");
                // A timeout releases the gate as well.
                let _ = previous.wait().await;
            }
        }
        guard
    }

    /// Newest registered response.
    pub fn latest_response(&self) -> Option<Arc<Response>> {
        self.responses.latest()
    }

    pub fn responses(&self) -> &Arc<History<Response>> {
        &self.responses
    }

    pub fn catalog(&self) -> &'static CommandCatalog {
        self.catalog
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn is_serialized(&self) -> bool {
        self.serialize
    }

    no_argument_commands! {
        /// Enter SDK mode.
        command => catalog::COMMAND,
        takeoff => catalog::TAKEOFF,
        land => catalog::LAND,
        /// Hover in place.
        stop => catalog::STOP,
        emergency => catalog::EMERGENCY,
        streamon => catalog::STREAMON,
        streamoff => catalog::STREAMOFF,
        /// Battery percentage.
        battery => catalog::BATTERY,
        /// Current speed setting, cm/s.
        speed => catalog::SPEED,
        /// Flight time.
        time => catalog::TIME,
        /// WiFi signal to noise ratio.
        wifi => catalog::WIFI,
    }

    single_argument_commands! {
        up(cm) => catalog::UP,
        down(cm) => catalog::DOWN,
        left(cm) => catalog::LEFT,
        right(cm) => catalog::RIGHT,
        forward(cm) => catalog::FORWARD,
        back(cm) => catalog::BACK,
        cw(degrees) => catalog::CW,
        ccw(degrees) => catalog::CCW,
        /// Set speed, cm/s.
        set_speed(cm_per_s) => catalog::SET_SPEED,
    }

    /// Fly to `x y z` (cm, relative) at `speed` cm/s.
    pub async fn go(&self, x: i32, y: i32, z: i32, speed: i32) -> Result<Arc<Response>> {
        let args = [x, y, z, speed].iter().map(ToString::to_string).collect();
        self.dispatch(&catalog::GO, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeDrone;

    async fn dispatcher(drone: &FakeDrone, timeout: Duration) -> Dispatcher {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        Dispatcher::new(socket, drone.addr(), Arc::new(History::new(100)), timeout)
    }

    #[tokio::test]
    async fn response_is_registered_before_execute_returns() {
        let drone = FakeDrone::bind().await;
        let dispatcher = dispatcher(&drone, Response::DEFAULT_TIMEOUT).await;

        let response = dispatcher.takeoff().await.unwrap();
        let latest = dispatcher.latest_response().unwrap();
        assert!(Arc::ptr_eq(&response, &latest));
        assert!(!latest.is_set());

        let (line, _) = drone.recv_command().await;
        assert_eq!(line, "takeoff");
    }

    #[tokio::test]
    async fn arguments_are_space_joined() {
        let drone = FakeDrone::bind().await;
        let dispatcher = dispatcher(&drone, Response::DEFAULT_TIMEOUT).await;

        dispatcher.go(20, -20, 30, 50).await.unwrap();
        assert_eq!(drone.recv_command().await.0, "go 20 -20 30 50");

        dispatcher.execute("cw", &[90]).await.unwrap();
        assert_eq!(drone.recv_command().await.0, "cw 90");
        assert_eq!(dispatcher.responses().len(), 2);
    }

    #[tokio::test]
    async fn unknown_command_registers_nothing() {
        let drone = FakeDrone::bind().await;
        let dispatcher = dispatcher(&drone, Response::DEFAULT_TIMEOUT).await;

        let err = dispatcher.execute("barrel-roll", &[1]).await.unwrap_err();
        assert!(matches!(err, TelloError::UnknownCommand { .. }));
        assert_eq!(dispatcher.responses().len(), 0);
        assert!(drone.try_recv_command(Duration::from_millis(50)).await.is_none());
    }

    #[tokio::test]
    async fn wrong_arity_registers_nothing() {
        let drone = FakeDrone::bind().await;
        let dispatcher = dispatcher(&drone, Response::DEFAULT_TIMEOUT).await;

        let err = dispatcher.execute("up", &[10, 20]).await.unwrap_err();
        assert!(matches!(err, TelloError::ArityMismatch { expected: 1, found: 2, .. }));
        assert!(dispatcher.responses().is_empty());
    }

    #[tokio::test]
    async fn serialized_dispatch_waits_for_the_previous_reply() {
        let drone = FakeDrone::bind().await;
        let dispatcher = Arc::new(
            dispatcher(&drone, Duration::from_secs(5)).await.with_serialized_commands(true),
        );

        let first = dispatcher.takeoff().await.unwrap();
        let second_sender = Arc::clone(&dispatcher);
        let second = tokio::spawn(async move { second_sender.land().await });

        assert_eq!(drone.recv_command().await.0, "takeoff");
        // The second command is held back while the first is pending.
        assert!(drone.try_recv_command(Duration::from_millis(100)).await.is_none());
        assert!(!second.is_finished());

        first.set("ok", drone.addr()).unwrap();
        assert_eq!(drone.recv_command().await.0, "land");
        let second = second.await.unwrap().unwrap();
        assert_eq!(second.command(), "land");
    }

    #[tokio::test]
    async fn failed_send_settles_the_response() {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let unreachable: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let responses = Arc::new(History::new(10));
        let dispatcher = Dispatcher::new(socket, unreachable, responses, Duration::from_secs(5))
            .with_serialized_commands(true);

        let err = dispatcher.takeoff().await.unwrap_err();
        assert!(matches!(err, TelloError::Socket { .. }));

        let failed = dispatcher.latest_response().unwrap();
        assert_eq!(dispatcher.responses().len(), 1);
        assert!(failed.is_aborted());
        assert!(!failed.is_pending());
        assert!(failed.set("ok", unreachable).is_err());

        // The gate does not wait out the five second timeout of the failed command.
        let second = tokio::time::timeout(Duration::from_millis(500), dispatcher.land()).await;
        assert!(second.is_ok());
        assert_eq!(dispatcher.responses().len(), 2);
    }

    #[tokio::test]
    async fn serialized_dispatch_proceeds_after_timeout() {
        let drone = FakeDrone::bind().await;
        let dispatcher =
            dispatcher(&drone, Duration::from_millis(50)).await.with_serialized_commands(true);

        dispatcher.takeoff().await.unwrap();
        dispatcher.land().await.unwrap();
        assert_eq!(drone.recv_command().await.0, "takeoff");
        assert_eq!(drone.recv_command().await.0, "land");
    }
}
