//! Session facade
//!
//! A [`Session`] owns the command socket, the three histories, the dispatcher
//! and both receive loops. The command/telemetry loop and the video loop have
//! independent lifecycles. All `latest_*` accessors are non-blocking reads.

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio_stream::wrappers::WatchStream;
use tracing::{Span, debug, info, info_span};

use crate::config::SessionConfig;
use crate::dispatcher::Dispatcher;
use crate::history::History;
use crate::provider::FrameSource;
use crate::providers::UdpFrameSource;
use crate::receivers::{StateReceiver, VideoReceiver};
use crate::stream::ThrottleExt;
use crate::types::{Response, TelemetryRecord, UpdateRate, VideoFrame};
use crate::{Result, TelloError};


/// Nominal telemetry broadcast rate of the drone.
pub const TELEMETRY_HZ: f64 = 10.0;

/// Connection to one drone.
pub struct Session {
    config: SessionConfig,
    socket: Arc<UdpSocket>,
    dispatcher: Dispatcher,
    state: StateReceiver,
    video: VideoReceiver,
    telemetry: Arc<History<TelemetryRecord>>,
    responses: Arc<History<Response>>,
    frames: Arc<History<VideoFrame>>,
    span: Span,
}

impl Session {
    /// Bind the command socket and wire up the default UDP video source.
    ///
    /// Nothing is received until [`start`](Self::start) is called.
    pub async fn bind(config: SessionConfig) -> Result<Self> {
        let source = Arc::new(UdpFrameSource::new(config.video_addr));
        Self::bind_with_source(config, source).await
    }

    /// Bind with a custom video source, e.g. one wrapping a decoder.
    pub async fn bind_with_source(
        config: SessionConfig,
        video_source: Arc<dyn FrameSource>,
    ) -> Result<Self> {
        config.validate()?;

        let span = info_span!("tello", drone = %config.drone_addr);
        let socket = UdpSocket::bind(config.local_addr)
            .await
            .map_err(|e| TelloError::socket_error(format!("bind {}", config.local_addr), e))?;
        let socket = Arc::new(socket);
        let local_addr =
            socket.local_addr().map_err(|e| TelloError::socket_error("local_addr", e))?;

        let telemetry = Arc::new(History::new(config.telemetry_capacity));
        let responses = Arc::new(History::new(config.response_capacity));
        let frames = Arc::new(History::new(config.video_capacity));

        let dispatcher = Dispatcher::new(
            Arc::clone(&socket),
            config.drone_addr,
            Arc::clone(&responses),
            config.response_timeout(),
        )
        .with_serialized_commands(config.serialize_commands);

        let state =
            StateReceiver::new(Arc::clone(&socket), Arc::clone(&telemetry), Arc::clone(&responses))
                .with_max_errors(config.max_consecutive_errors)
                .with_buffer_size(config.recv_buffer_size);

        let video = VideoReceiver::new(video_source, Arc::clone(&frames))
            .with_max_errors(config.max_consecutive_errors);

        span.in_scope(|| {
            info!(%local_addr, video = %config.video_addr, "Session bound");
        });

        Ok(Self { config, socket, dispatcher, state, video, telemetry, responses, frames, span })
    }

    /// Command dispatcher.
    pub fn commands(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Send a command by name; see [`Dispatcher::execute`].
    pub async fn execute<A: ToString>(&self, name: &str, args: &[A]) -> Result<Arc<Response>> {
        self.dispatcher.execute(name, args).await
    }

    /// Start the command/telemetry receive loop.
    pub fn start(&self) -> Result<()> {
        self.state.start(self.span.clone())
    }

    /// Stop the command/telemetry receive loop.
    pub fn stop(&self) {
        self.state.stop();
    }

    pub fn is_started(&self) -> bool {
        self.state.is_receiving()
    }

    /// Start pulling video frames. Send `streamon` first.
    pub fn start_video(&self) -> Result<()> {
        self.video.start(self.span.clone())
    }

    pub fn stop_video(&self) {
        self.video.stop();
    }

    pub fn is_video_started(&self) -> bool {
        self.video.is_receiving()
    }

    pub fn stop_all(&self) {
        self.stop();
        self.stop_video();
    }

    /// Wait for both loops to exit.
    pub async fn join(&self) -> Result<()> {
        self.state.join().await?;
        self.video.join().await
    }

    pub fn latest_telemetry(&self) -> Option<Arc<TelemetryRecord>> {
        self.telemetry.latest()
    }

    pub fn latest_response(&self) -> Option<Arc<Response>> {
        self.responses.latest()
    }

    pub fn latest_frame(&self) -> Option<Arc<VideoFrame>> {
        self.frames.latest()
    }

    pub fn telemetry_history(&self) -> &Arc<History<TelemetryRecord>> {
        &self.telemetry
    }

    pub fn response_history(&self) -> &Arc<History<Response>> {
        &self.responses
    }

    pub fn frame_history(&self) -> &Arc<History<VideoFrame>> {
        &self.frames
    }

    /// Register a callback for every raw datagram on the command socket.
    pub fn add_observer<F>(&self, observer: F)
    where
        F: Fn(&str, SocketAddr) + Send + Sync + 'static,
    {
        self.state.add_observer(observer);
    }

    /// Telemetry records as they arrive, optionally throttled.
    ///
    /// Yields the current record first if one exists.
    pub fn telemetry_updates(&self, rate: UpdateRate) -> BoxStream<'static, Arc<TelemetryRecord>> {
        let records = latest_values(WatchStream::new(self.telemetry.subscribe()));
        match rate.throttle_interval(TELEMETRY_HZ) {
            None => records.boxed(),
            Some(period) => records.throttle(period).boxed(),
        }
    }

    /// Video frames as they arrive.
    pub fn frame_updates(&self) -> BoxStream<'static, Arc<VideoFrame>> {
        latest_values(WatchStream::new(self.frames.subscribe())).boxed()
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(|e| TelloError::socket_error("local_addr", e))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        debug!("Dropping session");
        self.stop_all();
    }
}

fn latest_values<T, S>(updates: S) -> impl Stream<Item = Arc<T>> + Send + 'static
where
    T: Send + Sync + 'static,
    S: Stream<Item = Option<Arc<T>>> + Send + 'static,
{
    updates.filter_map(|item| async move { item })
}
