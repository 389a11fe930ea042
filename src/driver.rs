//! Driver owns the lifecycle of one background receive task
//!
//! A driver moves `Idle → Receiving → Stopped` and may be restarted from
//! `Stopped`. Cancellation is cooperative through a [`CancellationToken`]:
//! loops check it once per iteration and also race it against their pending
//! receive, so `stop()` never waits on a packet that may not arrive.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info};

use crate::{Result, TelloError};

/// Observable state of a driven loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Receiving,
    Stopped,
}

#[derive(Debug)]
struct Inner {
    state: LoopState,
    cancel: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
    exited: Option<watch::Receiver<bool>>,
    generation: u64,
}

/// Spawns and tracks one receive task
#[derive(Debug)]
pub struct Driver {
    name: &'static str,
    inner: Mutex<Inner>,
}

impl Driver {
    pub fn new(name: &'static str) -> Self {
        let inner = Inner {
            state: LoopState::Idle,
            cancel: None,
            handle: None,
            exited: None,
            generation: 0,
        };
        Self { name, inner: Mutex::new(inner) }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Spawn `task` on the current tokio runtime, instrumented with `span`.
    ///
    /// Fails with `AlreadyRunning` if the loop is receiving; no task is spawned.
    pub fn spawn<F, Fut>(&self, span: Span, task: F) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut inner = self.lock();
        if Self::receiving(&inner) {
            return Err(TelloError::already_running(self.name));
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            TelloError::config_error_with_source(
                format!("{} must be started inside a tokio runtime", self.name),
                Box::new(e),
            )
        })?;

        let cancel = CancellationToken::new();
        // Dropped without sending if the task panics, which also wakes joiners.
        let (exited_tx, exited_rx) = watch::channel(false);
        let task = task(cancel.clone());
        let handle = runtime.spawn(
            async move {
                task.await;
                let _ = exited_tx.send(true);
            }
            .instrument(span),
        );
        if inner.handle.replace(handle).is_some() {
            debug!(loop_name = self.name, "Detaching previous stopped task");
        }
        inner.exited = Some(exited_rx);
        inner.generation += 1;
        inner.cancel = Some(cancel);
        inner.state = LoopState::Receiving;
        info!(loop_name = self.name, "Started");
        Ok(())
    }

    /// Signal the loop to exit. A no-op if it is not receiving.
    pub fn stop(&self) {
        let mut inner = self.lock();
        match inner.cancel.take() {
            Some(cancel) => {
                cancel.cancel();
                inner.state = LoopState::Stopped;
                info!(loop_name = self.name, "Stop requested");
            }
            None => debug!(loop_name = self.name, "Stop ignored, not running"),
        }
    }

    /// Wait for the task to exit. Returns immediately if it was never started.
    ///
    /// The handle stays registered while waiting, so the loop keeps reporting
    /// `Receiving` and a concurrent `spawn` is still rejected.
    pub async fn join(&self) -> Result<()> {
        let (exited, generation) = {
            let inner = self.lock();
            (inner.exited.clone(), inner.generation)
        };
        let Some(mut exited) = exited else {
            debug!(loop_name = self.name, "Join ignored, not started");
            return Ok(());
        };

        // A closed channel means the task is gone, panicked or not.
        let _ = exited.wait_for(|done| *done).await;

        // The task signals just before its future returns; wait out that gap.
        let finished = loop {
            {
                let mut inner = self.lock();
                if inner.generation != generation {
                    break None;
                }
                if inner.handle.as_ref().is_none_or(JoinHandle::is_finished) {
                    inner.cancel = None;
                    inner.state = LoopState::Stopped;
                    break inner.handle.take();
                }
            }
            tokio::task::yield_now().await;
        };
        if let Some(handle) = finished {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    error!(loop_name = self.name, "Receive task panicked: {}", e);
                }
            }
        }
        Ok(())
    }

    /// True while the task is spawned, not cancelled and not finished.
    pub fn is_receiving(&self) -> bool {
        Self::receiving(&self.lock())
    }

    pub fn state(&self) -> LoopState {
        let inner = self.lock();
        match inner.state {
            LoopState::Receiving if !Self::receiving(&inner) => LoopState::Stopped,
            state => state,
        }
    }

    fn receiving(inner: &Inner) -> bool {
        inner.state == LoopState::Receiving
            && inner.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        if let Some(cancel) = self.lock().cancel.take() {
            debug!(loop_name = self.name, "Dropping driver, cancelling task");
            cancel.cancel();
        }
    }
}

/// Consecutive-error budget with exponential backoff: 50ms, 100ms, 200ms, ...
#[derive(Debug, Clone)]
pub struct ErrorBudget {
    max_errors: u32,
    count: u32,
}

impl ErrorBudget {
    pub fn new(max_errors: u32) -> Self {
        Self { max_errors: max_errors.max(1), count: 0 }
    }

    pub fn record_success(&mut self) {
        self.count = 0;
    }

    /// Record a failure. Returns the backoff to wait, or `None` once the
    /// budget is exhausted.
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.count += 1;
        if self.count >= self.max_errors {
            None
        } else {
            Some(Duration::from_millis(50 * (1 << self.count.min(5))))
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn max_errors(&self) -> u32 {
        self.max_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn idle_loop(cancel: CancellationToken, iterations: Arc<AtomicUsize>) {
        loop {
            if cancel.is_cancelled() {
                break;
            }
            iterations.fetch_add(1, Ordering::SeqCst);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_millis(5)) => {}
            }
        }
    }

    #[tokio::test]
    async fn start_stop_join() {
        let driver = Driver::new("test loop");
        assert_eq!(driver.state(), LoopState::Idle);

        let iterations = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&iterations);
        driver.spawn(Span::none(), move |cancel| idle_loop(cancel, counter)).unwrap();
        assert!(driver.is_receiving());

        tokio::time::sleep(Duration::from_millis(20)).await;
        driver.stop();
        assert!(!driver.is_receiving());
        tokio::time::timeout(Duration::from_secs(1), driver.join()).await.unwrap().unwrap();
        assert_eq!(driver.state(), LoopState::Stopped);
        assert!(iterations.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let driver = Driver::new("test loop");
        let counter = Arc::new(AtomicUsize::new(0));
        let first = Arc::clone(&counter);
        driver.spawn(Span::none(), move |cancel| idle_loop(cancel, first)).unwrap();

        let second = Arc::clone(&counter);
        let err = driver.spawn(Span::none(), move |cancel| idle_loop(cancel, second)).unwrap_err();
        assert!(matches!(err, TelloError::AlreadyRunning { .. }));
        driver.stop();
        driver.join().await.unwrap();
    }

    #[tokio::test]
    async fn stop_and_join_without_start_are_no_ops() {
        let driver = Driver::new("test loop");
        driver.stop();
        driver.join().await.unwrap();
        assert_eq!(driver.state(), LoopState::Idle);
    }

    #[tokio::test]
    async fn restart_after_stop() {
        let driver = Driver::new("test loop");
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let c = Arc::clone(&counter);
            driver.spawn(Span::none(), move |cancel| idle_loop(cancel, c)).unwrap();
            driver.stop();
            driver.join().await.unwrap();
        }
        assert_eq!(driver.state(), LoopState::Stopped);
    }

    #[tokio::test]
    async fn finished_task_is_not_receiving() {
        let driver = Driver::new("test loop");
        driver.spawn(Span::none(), |_cancel| async {}).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!driver.is_receiving());
        assert_eq!(driver.state(), LoopState::Stopped);
    }

    #[tokio::test]
    async fn pending_join_keeps_the_loop_registered() {
        let driver = Arc::new(Driver::new("test loop"));
        let iterations = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&iterations);
        driver.spawn(Span::none(), move |cancel| idle_loop(cancel, counter)).unwrap();

        let joiner = Arc::clone(&driver);
        let join = tokio::spawn(async move { joiner.join().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(driver.is_receiving());
        assert_eq!(driver.state(), LoopState::Receiving);
        let err = driver.spawn(Span::none(), |_cancel| async {}).unwrap_err();
        assert!(matches!(err, TelloError::AlreadyRunning { .. }));

        driver.stop();
        tokio::time::timeout(Duration::from_secs(1), join).await.unwrap().unwrap().unwrap();
        let after_join = iterations.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(iterations.load(Ordering::SeqCst), after_join);
        assert_eq!(driver.state(), LoopState::Stopped);
    }

    #[tokio::test]
    async fn join_returns_after_a_panicking_task() {
        let driver = Driver::new("test loop");
        driver
            .spawn(Span::none(), |_cancel| async {
                if true {
                    panic!("receive loop blew up");
                }
            })
            .unwrap();
        tokio::time::timeout(Duration::from_secs(1), driver.join()).await.unwrap().unwrap();
        assert!(!driver.is_receiving());
    }

    #[test]
    fn error_budget_backs_off_then_gives_up() {
        let mut budget = ErrorBudget::new(3);
        assert_eq!(budget.record_failure(), Some(Duration::from_millis(100)));
        assert_eq!(budget.record_failure(), Some(Duration::from_millis(200)));
        assert_eq!(budget.record_failure(), None);
        budget.record_success();
        assert_eq!(budget.count(), 0);
    }

    #[test]
    fn spawn_outside_runtime_fails() {
        let driver = Driver::new("test loop");
        let err = driver.spawn(Span::none(), |_cancel| async {}).unwrap_err();
        assert!(matches!(err, TelloError::Config { .. }));
    }
}
