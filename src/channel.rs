//! Non-blocking handoff between pipeline stages
//!
//! Every stage boundary uses the same discipline: try to enqueue, and if the
//! bounded queue is full drop the unit, count it and move on. A producer
//! never waits for a slow consumer.

use prometheus::IntCounter;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

/// Outcome of [`LossySender::offer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Sent,
    Dropped,
    Closed,
}

/// Sending half of a bounded channel that drops instead of waiting.
pub struct LossySender<T> {
    inner: mpsc::Sender<T>,
    dropped: IntCounter,
    boundary: &'static str,
    warn_every: u64,
}

impl<T> Clone for LossySender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            dropped: self.dropped.clone(),
            boundary: self.boundary,
            warn_every: self.warn_every,
        }
    }
}

impl<T> LossySender<T> {
    pub fn new(inner: mpsc::Sender<T>, dropped: IntCounter, boundary: &'static str) -> Self {
        Self {
            inner,
            dropped,
            boundary,
            warn_every: 1,
        }
    }

    /// Only log every `n`th drop. The counter still sees all of them.
    pub fn warn_every(mut self, n: u64) -> Self {
        self.warn_every = n.max(1);
        self
    }

    pub fn offer(&self, item: T) -> Offer {
        match self.inner.try_send(item) {
            Ok(()) => Offer::Sent,
            Err(TrySendError::Full(_)) => {
                self.dropped.inc();
                let total = self.dropped.get();
                if (total - 1) % self.warn_every == 0 {
                    warn!(
                        boundary = self.boundary,
                        dropped_total = total,
                        "Channel is full, dropping"
                    );
                }
                Offer::Dropped
            }
            Err(TrySendError::Closed(_)) => Offer::Closed,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// Create a bounded channel whose sender drops on full.
pub fn lossy_channel<T>(
    capacity: usize,
    dropped: IntCounter,
    boundary: &'static str,
) -> (LossySender<T>, mpsc::Receiver<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    (LossySender::new(tx, dropped, boundary), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> IntCounter {
        IntCounter::new("test_dropped_total", "test").unwrap()
    }

    #[test]
    fn test_offer_drops_when_full() {
        let dropped = counter();
        let (tx, mut rx) = lossy_channel(1, dropped.clone(), "test");

        assert_eq!(tx.offer(1u32), Offer::Sent);
        assert_eq!(tx.offer(2u32), Offer::Dropped);
        assert_eq!(tx.offer(3u32), Offer::Dropped);
        assert_eq!(dropped.get(), 2);

        assert_eq!(rx.try_recv().unwrap(), 1);
        assert!(rx.try_recv().is_err());

        assert_eq!(tx.offer(4u32), Offer::Sent);
        assert_eq!(rx.try_recv().unwrap(), 4);
    }

    #[test]
    fn test_offer_reports_closed() {
        let dropped = counter();
        let (tx, rx) = lossy_channel::<u32>(4, dropped.clone(), "test");
        drop(rx);

        assert!(tx.is_closed());
        assert_eq!(tx.offer(1), Offer::Closed);
        assert_eq!(dropped.get(), 0);
    }

    #[test]
    fn test_clones_share_drop_counter() {
        let dropped = counter();
        let (tx, _rx) = lossy_channel(1, dropped.clone(), "test");
        let other = tx.clone().warn_every(1000);

        assert_eq!(tx.offer(1u8), Offer::Sent);
        assert_eq!(other.offer(2u8), Offer::Dropped);
        assert_eq!(tx.offer(3u8), Offer::Dropped);
        assert_eq!(dropped.get(), 2);
    }
}
