//! Command/telemetry receive loop
//!
//! Commands, their replies and the telemetry broadcast share one socket. Each
//! datagram is classified by content: text containing the telemetry field
//! separator is parsed into a [`TelemetryRecord`], anything else is the reply
//! to the newest registered [`Response`]. Bad data is logged and dropped;
//! nothing a peer sends can end the loop.

use std::net::SocketAddr;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, error, info, trace, warn};

use crate::driver::{Driver, ErrorBudget, LoopState};
use crate::history::History;
use crate::types::{Response, TelemetryRecord, is_telemetry};
use crate::{Result, TelloError};

/// Callback invoked with every raw datagram after routing.
pub type Observer = Arc<dyn Fn(&str, SocketAddr) + Send + Sync>;

/// Where a datagram ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Telemetry,
    Response,
    /// Reply with nothing left to complete; dropped
    Orphan,
}

/// Classify one decoded datagram and push it to the right history.
pub fn route_datagram(
    text: &str,
    addr: SocketAddr,
    telemetry: &History<TelemetryRecord>,
    responses: &History<Response>,
) -> Route {
    if is_telemetry(text) {
        let record = telemetry.append(TelemetryRecord::parse(text, addr));
        if !record.rejected_fields().is_empty() {
            let rejected = record.rejected_fields();
            warn!(%addr, ?rejected, "Dropped malformed telemetry fields");
        }
        return Route::Telemetry;
    }

    let body = text.trim();
    let Some(response) = responses.latest() else {
        let orphan = TelloError::OrphanResponse { body: body.to_string() };
        warn!(%addr, "{}", orphan);
        return Route::Orphan;
    };

    match response.set(body, addr) {
        Ok(()) => {
            debug!(
                command = %response.wire(),
                body,
                duration = ?response.duration(),
                success = response.is_success(),
                "Response completed"
            );
            Route::Response
        }
        Err(e) => {
            warn!(%addr, body, "Dropping reply: {}", e);
            Route::Orphan
        }
    }
}

/// Background loop feeding the telemetry and response histories.
pub struct StateReceiver {
    socket: Arc<UdpSocket>,
    telemetry: Arc<History<TelemetryRecord>>,
    responses: Arc<History<Response>>,
    observers: Arc<RwLock<Vec<Observer>>>,
    driver: Driver,
    max_errors: u32,
    buffer_size: usize,
}

impl StateReceiver {
    pub fn new(
        socket: Arc<UdpSocket>,
        telemetry: Arc<History<TelemetryRecord>>,
        responses: Arc<History<Response>>,
    ) -> Self {
        Self {
            socket,
            telemetry,
            responses,
            observers: Arc::new(RwLock::new(Vec::new())),
            driver: Driver::new("state receiver"),
            max_errors: 10,
            buffer_size: 2048,
        }
    }

    /// Consecutive socket errors tolerated before the loop exits.
    pub fn with_max_errors(mut self, max_errors: u32) -> Self {
        self.max_errors = max_errors;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    pub fn add_observer<F>(&self, observer: F)
    where
        F: Fn(&str, SocketAddr) + Send + Sync + 'static,
    {
        debug!("Adding datagram observer");
        self.observers.write().unwrap_or_else(PoisonError::into_inner).push(Arc::new(observer));
    }

    /// Spawn the receive loop. Fails with `AlreadyRunning` if it is receiving.
    pub fn start(&self, span: Span) -> Result<()> {
        let receive_loop = ReceiveLoop {
            socket: Arc::clone(&self.socket),
            telemetry: Arc::clone(&self.telemetry),
            responses: Arc::clone(&self.responses),
            observers: Arc::clone(&self.observers),
            budget: ErrorBudget::new(self.max_errors),
            buffer_size: self.buffer_size,
        };
        self.driver.spawn(span, move |cancel| receive_loop.run(cancel))
    }

    pub fn stop(&self) {
        self.driver.stop();
    }

    pub async fn join(&self) -> Result<()> {
        self.driver.join().await
    }

    pub fn is_receiving(&self) -> bool {
        self.driver.is_receiving()
    }

    pub fn state(&self) -> LoopState {
        self.driver.state()
    }
}

struct ReceiveLoop {
    socket: Arc<UdpSocket>,
    telemetry: Arc<History<TelemetryRecord>>,
    responses: Arc<History<Response>>,
    observers: Arc<RwLock<Vec<Observer>>>,
    budget: ErrorBudget,
    buffer_size: usize,
}

impl ReceiveLoop {
    async fn run(mut self, cancel: CancellationToken) {
        info!("State receiver loop started");
        let mut buf = vec![0u8; self.buffer_size];
        let mut datagrams = 0u64;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.socket.recv_from(&mut buf) => result,
            };

            match result {
                Ok((len, addr)) => {
                    self.budget.record_success();
                    datagrams += 1;
                    let text = String::from_utf8_lossy(&buf[..len]);
                    trace!(%addr, len, "Datagram received");
                    route_datagram(&text, addr, &self.telemetry, &self.responses);
                    self.notify_observers(&text, addr);
                }
                Err(e) => {
                    let e = TelloError::socket_error("receive", e);
                    error!(
                        "Receive error ({}/{}): {}",
                        self.budget.count() + 1,
                        self.budget.max_errors(),
                        e
                    );
                    let Some(backoff) = self.budget.record_failure() else {
                        error!("Too many receive errors, stopping state receiver");
                        break;
                    };
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }

        info!(datagrams, "State receiver loop exited");
    }

    fn notify_observers(&self, text: &str, addr: SocketAddr) {
        let observers = self.observers.read().unwrap_or_else(PoisonError::into_inner).clone();
        for observer in observers {
            if catch_unwind(AssertUnwindSafe(|| observer(text, addr))).is_err() {
                error!("Datagram observer panicked");
            }
        }
    }
}
