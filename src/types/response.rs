//! Command response lifecycle
//!
//! A [`Response`] is registered when a command is sent and completed at most
//! once when the receive loop sees the drone's reply. Timeout is evaluated
//! lazily from wall-clock age; nothing sweeps pending responses.

use serde::Serialize;
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::Notify;
use tracing::warn;

use super::command::{Classification, CommandSpec, ResultType, SUCCESS_TOKEN};
use crate::{Result, TelloError};

/// Decoded reply body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ResponseBody {
    Text(String),
    Integer(i64),
    Float(f64),
    /// Reply that did not decode as the command's declared result type
    Unparsed(String),
}

impl ResponseBody {
    /// Decode a raw reply as `result_type`. Surrounding whitespace is ignored.
    pub fn decode(result_type: ResultType, raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let decode_error =
            || TelloError::Decode { expected: result_type.to_string(), body: raw.to_string() };
        match result_type {
            ResultType::Text => Ok(ResponseBody::Text(raw.to_string())),
            ResultType::Integer => {
                raw.parse().map(ResponseBody::Integer).map_err(|_| decode_error())
            }
            ResultType::Float => raw.parse().map(ResponseBody::Float).map_err(|_| decode_error()),
        }
    }

    /// Textual body, for `Text` and `Unparsed` replies.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ResponseBody::Text(s) | ResponseBody::Unparsed(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ResponseBody::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ResponseBody::Float(v) => Some(*v),
            ResponseBody::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseBody::Text(s) | ResponseBody::Unparsed(s) => f.write_str(s),
            ResponseBody::Integer(v) => write!(f, "{}", v),
            ResponseBody::Float(v) => write!(f, "{}", v),
        }
    }
}

/// Fields assigned when the reply arrives.
#[derive(Debug, Clone, Serialize)]
pub struct Completion {
    pub body: ResponseBody,
    /// Address the reply came from
    pub addr: SocketAddr,
    /// Completion time minus creation time
    pub duration: Duration,
    pub completed_at: SystemTime,
}

#[derive(Debug)]
enum Outcome {
    Replied(Completion),
    /// The command never left the host
    Aborted(String),
}

/// The pending or completed result of one issued command.
#[derive(Debug)]
pub struct Response {
    spec: CommandSpec,
    args: Vec<String>,
    timestamp: SystemTime,
    created: Instant,
    timeout: Duration,
    outcome: OnceLock<Outcome>,
    completed: Notify,
}

impl Response {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

    pub fn new(spec: CommandSpec, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            spec,
            args,
            timestamp: SystemTime::now(),
            created: Instant::now(),
            timeout,
            outcome: OnceLock::new(),
            completed: Notify::new(),
        }
    }

    /// Complete the response with a raw reply body.
    ///
    /// One-shot: a second call fails with `AlreadyCompleted` and leaves the
    /// first completion untouched. A body that does not decode as the declared
    /// result type is stored as [`ResponseBody::Unparsed`].
    pub fn set(&self, raw: &str, addr: SocketAddr) -> Result<()> {
        let body = ResponseBody::decode(self.spec.result_type, raw).unwrap_or_else(|e| {
            warn!(command = self.spec.name, error = %e, "Keeping undecodable reply as raw text");
            ResponseBody::Unparsed(raw.trim().to_string())
        });
        let completion = Completion {
            body,
            addr,
            duration: self.created.elapsed(),
            completed_at: SystemTime::now(),
        };
        self.finish(Outcome::Replied(completion))
    }

    /// Mark the response as never sent, e.g. after a failed send.
    ///
    /// An aborted response is no longer pending and rejects any later reply.
    pub fn abort(&self, reason: impl Into<String>) -> Result<()> {
        self.finish(Outcome::Aborted(reason.into()))
    }

    fn finish(&self, outcome: Outcome) -> Result<()> {
        self.outcome
            .set(outcome)
            .map_err(|_| TelloError::AlreadyCompleted { command: self.wire() })?;
        self.completed.notify_waiters();
        Ok(())
    }

    /// Wait until the reply arrives or the timeout elapses.
    pub async fn wait(&self) -> Result<&Completion> {
        let deadline = tokio::time::Instant::from_std(self.created + self.timeout);
        loop {
            // Register before checking so a completion in between is not missed.
            let notified = self.completed.notified();
            match self.outcome.get() {
                Some(Outcome::Replied(completion)) => return Ok(completion),
                Some(Outcome::Aborted(reason)) => {
                    return Err(TelloError::Aborted {
                        command: self.wire(),
                        reason: reason.clone(),
                    });
                }
                None => {}
            }
            tokio::time::timeout_at(deadline, notified)
                .await
                .map_err(|_| TelloError::Timeout { duration: self.timeout })?;
        }
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    /// Command token
    pub fn command(&self) -> &'static str {
        self.spec.name
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn classification(&self) -> Classification {
        self.spec.classification
    }

    /// The command line that was sent.
    pub fn wire(&self) -> String {
        self.spec.construct(&self.args)
    }

    pub fn completion(&self) -> Option<&Completion> {
        match self.outcome.get() {
            Some(Outcome::Replied(completion)) => Some(completion),
            _ => None,
        }
    }

    pub fn body(&self) -> Option<&ResponseBody> {
        self.completion().map(|c| &c.body)
    }

    pub fn addr(&self) -> Option<SocketAddr> {
        self.completion().map(|c| c.addr)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.completion().map(|c| c.duration)
    }

    /// Reason the command was never sent, if it was aborted.
    pub fn abort_reason(&self) -> Option<&str> {
        match self.outcome.get() {
            Some(Outcome::Aborted(reason)) => Some(reason),
            _ => None,
        }
    }

    /// Wall-clock creation time.
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn elapsed(&self) -> Duration {
        self.created.elapsed()
    }

    pub fn is_set(&self) -> bool {
        self.completion().is_some()
    }

    pub fn is_aborted(&self) -> bool {
        self.abort_reason().is_some()
    }

    /// CONTROL and SET succeed only on the `ok` token; READ succeeds on any reply.
    pub fn is_success(&self) -> bool {
        match (self.body(), self.spec.classification) {
            (None, _) => false,
            (Some(body), Classification::Control | Classification::Set) => {
                matches!(body, ResponseBody::Text(s) if s == SUCCESS_TOKEN)
            }
            (Some(_), Classification::Read) => true,
        }
    }

    /// True once the response is older than its timeout, whether or not it
    /// has been completed.
    pub fn is_timeout(&self) -> bool {
        self.created.elapsed() > self.timeout
    }

    /// Neither completed, aborted nor timed out.
    pub fn is_pending(&self) -> bool {
        self.outcome.get().is_none() && !self.is_timeout()
    }

    /// Human-readable multi-line description.
    pub fn summary(&self) -> String {
        let completion = self.completion();
        let addr = completion.map(|c| c.addr.to_string()).unwrap_or_else(|| "-".to_string());
        let body = match (completion, self.abort_reason()) {
            (Some(c), _) => c.body.to_string(),
            (None, Some(reason)) => format!("aborted ({})", reason),
            (None, None) => "-".to_string(),
        };
        let duration =
            completion.map(|c| format!("{:?}", c.duration)).unwrap_or_else(|| "-".to_string());
        [
            format!("type: {}", self.spec.classification),
            format!("command: {}", self.wire()),
            format!("address: {}", addr),
            format!("body: {}", body),
            format!("timestamp: {:?}", self.timestamp),
            format!("duration: {}", duration),
        ]
        .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn drone() -> SocketAddr {
        "192.168.10.1:8889".parse().unwrap()
    }

    fn control(timeout: Duration) -> Response {
        Response::new(CommandSpec::control("takeoff", 0), Vec::new(), timeout)
    }

    #[test]
    fn ok_completes_a_control_command_successfully() {
        let response = control(Response::DEFAULT_TIMEOUT);
        assert!(!response.is_set());
        assert!(!response.is_success());
        assert!(response.is_pending());

        response.set("ok", drone()).unwrap();
        assert!(response.is_set());
        assert!(response.is_success());
        assert_eq!(response.addr(), Some(drone()));
        assert!(response.duration().is_some());
    }

    #[test]
    fn error_reply_is_not_success() {
        let response = control(Response::DEFAULT_TIMEOUT);
        response.set("error", drone()).unwrap();
        assert!(response.is_set());
        assert!(!response.is_success());
        assert_eq!(response.body(), Some(&ResponseBody::Text("error".to_string())));
    }

    #[test]
    fn set_is_one_shot() {
        let response = control(Response::DEFAULT_TIMEOUT);
        response.set("ok", drone()).unwrap();
        let err = response.set("error", drone()).unwrap_err();
        assert!(matches!(err, TelloError::AlreadyCompleted { .. }));
        assert!(response.is_success());
    }

    #[test]
    fn timeout_reflects_age_even_after_completion() {
        let response = control(Duration::from_millis(20));
        response.set("ok", drone()).unwrap();
        assert!(!response.is_timeout());
        std::thread::sleep(Duration::from_millis(40));
        // Completed but old: still reports timeout.
        assert!(response.is_timeout());
        assert!(response.is_success());
    }

    #[test]
    fn unanswered_response_times_out() {
        let response = control(Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(30));
        assert!(response.is_timeout());
        assert!(!response.is_set());
        assert!(!response.is_pending());
    }

    #[test]
    fn read_commands_decode_their_result_type() {
        let battery = Response::new(
            CommandSpec::read("battery?", ResultType::Integer),
            Vec::new(),
            Response::DEFAULT_TIMEOUT,
        );
        battery.set("87\r\n", drone()).unwrap();
        assert_eq!(battery.body().and_then(ResponseBody::as_i64), Some(87));
        assert!(battery.is_success());

        let speed = Response::new(
            CommandSpec::read("speed?", ResultType::Float),
            Vec::new(),
            Response::DEFAULT_TIMEOUT,
        );
        speed.set("error", drone()).unwrap();
        assert_eq!(speed.body(), Some(&ResponseBody::Unparsed("error".to_string())));
        assert!(speed.is_success());
    }

    #[test]
    fn set_commands_need_ok() {
        let spec = CommandSpec::set("speed", 1);
        let response = Response::new(spec, vec!["50".into()], Response::DEFAULT_TIMEOUT);
        response.set("ok", drone()).unwrap();
        assert!(response.is_success());
        assert_eq!(response.wire(), "speed 50");
    }

    #[test]
    fn summary_lists_the_lifecycle() {
        let response = Response::new(
            CommandSpec::control("up", 1),
            vec!["50".into()],
            Response::DEFAULT_TIMEOUT,
        );
        response.set("ok", drone()).unwrap();
        let summary = response.summary();
        assert!(summary.contains("type: control"));
        assert!(summary.contains("command: up 50"));
        assert!(summary.contains("address: 192.168.10.1:8889"));
        assert!(summary.contains("body: ok"));
    }

    #[tokio::test]
    async fn wait_resolves_on_completion() {
        let response = Arc::new(control(Duration::from_secs(2)));
        let completer = Arc::clone(&response);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            completer.set("ok", drone()).unwrap();
        });
        let completion = response.wait().await.unwrap();
        assert_eq!(completion.body, ResponseBody::Text("ok".to_string()));
    }

    #[tokio::test]
    async fn aborted_response_is_settled_and_rejects_replies() {
        let response = control(Response::DEFAULT_TIMEOUT);
        response.abort("send failed").unwrap();

        assert!(!response.is_pending());
        assert!(response.is_aborted());
        assert!(!response.is_set());
        assert!(!response.is_success());
        assert!(matches!(response.wait().await.unwrap_err(), TelloError::Aborted { .. }));

        let err = response.set("ok", drone()).unwrap_err();
        assert!(matches!(err, TelloError::AlreadyCompleted { .. }));
        assert!(response.summary().contains("aborted (send failed)"));
    }

    #[tokio::test]
    async fn wait_times_out_without_reply() {
        let response = control(Duration::from_millis(30));
        let err = response.wait().await.unwrap_err();
        assert!(matches!(err, TelloError::Timeout { .. }));
    }
}
