//! Test utilities: a loopback stand-in for the drone and canonical packets
//!
//! Shared by unit tests, integration tests and benchmarks.

#![cfg(any(test, feature = "benchmark"))]

use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

use crate::SessionConfig;

/// A telemetry packet exactly as the drone broadcasts it.
pub const SAMPLE_TELEMETRY: &str = "mid:-1;x:0;y:0;z:0;mpry:0,0,0;pitch:0;roll:0;yaw:0;vgx:0;vgy:0;vgz:0;templ:60;temph:64;tof:10;h:0;bat:87;baro:0.0;time:0;agx:0.0;agy:0.0;agz:0.0;";

/// Default drone address on its access-point network.
pub fn drone_addr() -> SocketAddr {
    SocketAddr::from(([192, 168, 10, 1], 8889))
}

/// A telemetry packet with the given battery level and height.
pub fn telemetry_packet(bat: i64, h: i64) -> String {
    format!(
        "mid:-1;x:0;y:0;z:0;mpry:0,0,0;pitch:1;roll:-2;yaw:45;vgx:0;vgy:0;vgz:0;templ:60;temph:64;tof:{};h:{};bat:{};baro:12.5;time:3;agx:-1.0;agy:2.0;agz:-999.0;\r\n",
        h + 10,
        h,
        bat
    )
}

/// Configuration pointing a session at `drone` over loopback with ephemeral ports.
pub fn loopback_config(drone: SocketAddr) -> SessionConfig {
    SessionConfig {
        drone_addr: drone,
        local_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        video_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        ..SessionConfig::default()
    }
}

/// Loopback UDP peer playing the drone's side of the command channel.
#[derive(Debug)]
pub struct FakeDrone {
    socket: UdpSocket,
}

impl FakeDrone {
    const RECV_TIMEOUT: Duration = Duration::from_secs(2);

    /// Bind on an ephemeral loopback port.
    pub async fn bind() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind fake drone");
        Self { socket }
    }

    pub fn addr(&self) -> SocketAddr {
        self.socket.local_addr().expect("fake drone address")
    }

    /// Next command line and its sender. Panics after two seconds of silence.
    pub async fn recv_command(&self) -> (String, SocketAddr) {
        self.try_recv_command(Self::RECV_TIMEOUT).await.expect("fake drone: no command received")
    }

    pub async fn try_recv_command(&self, wait: Duration) -> Option<(String, SocketAddr)> {
        let mut buf = [0u8; 1024];
        let (len, from) =
            tokio::time::timeout(wait, self.socket.recv_from(&mut buf)).await.ok()?.ok()?;
        Some((String::from_utf8_lossy(&buf[..len]).into_owned(), from))
    }

    /// Send raw text (a reply or a telemetry packet) to `to`.
    pub async fn send(&self, text: &str, to: SocketAddr) {
        self.socket.send_to(text.as_bytes(), to).await.expect("fake drone send");
    }

    /// Receive one command and answer it with `reply`. Returns the command line.
    pub async fn answer(&self, reply: &str) -> String {
        let (line, from) = self.recv_command().await;
        self.send(reply, from).await;
        line
    }
}
