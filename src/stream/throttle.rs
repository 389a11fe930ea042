//! Latest-wins throttling for subscription streams

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior, interval};

/// Adds [`throttle`](ThrottleExt::throttle) to any stream.
pub trait ThrottleExt: Stream {
    /// Emit at most one item per `period`.
    ///
    /// Items arriving within one period replace each other; only the newest
    /// is emitted when the period elapses. Telemetry snapshots are complete
    /// state, so dropping intermediate ones loses nothing a reader needs.
    fn throttle(self, period: Duration) -> Throttle<Self>
    where
        Self: Sized,
    {
        Throttle::new(self, period)
    }
}

impl<T: Stream> ThrottleExt for T {}

pin_project! {
    /// Stream returned by [`ThrottleExt::throttle`].
    pub struct Throttle<S: Stream> {
        #[pin]
        inner: S,
        ticks: Interval,
        newest: Option<S::Item>,
        exhausted: bool,
    }
}

impl<S: Stream> Throttle<S> {
    pub fn new(inner: S, period: Duration) -> Self {
        let mut ticks = interval(period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { inner, ticks, newest: None, exhausted: false }
    }
}

impl<S: Stream> Stream for Throttle<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        // Keep draining between ticks so only the newest item is held.
        while !*this.exhausted {
            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => *this.newest = Some(item),
                Poll::Ready(None) => *this.exhausted = true,
                Poll::Pending => break,
            }
        }

        if this.newest.is_none() {
            return if *this.exhausted { Poll::Ready(None) } else { Poll::Pending };
        }

        ready!(this.ticks.poll_tick(cx));
        Poll::Ready(this.newest.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn burst_collapses_to_newest_item() {
        let items: Vec<u32> = futures::stream::iter(1..=5)
            .throttle(Duration::from_millis(10))
            .collect()
            .await;
        assert_eq!(items, vec![5]);
    }

    #[tokio::test]
    async fn spaced_items_pass_through() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let mut throttled = tokio_stream::wrappers::UnboundedReceiverStream::new(rx)
            .throttle(Duration::from_millis(5));

        tx.send(1).unwrap();
        assert_eq!(throttled.next().await, Some(1));
        tx.send(2).unwrap();
        assert_eq!(throttled.next().await, Some(2));
        drop(tx);
        assert_eq!(throttled.next().await, None);
    }
}
