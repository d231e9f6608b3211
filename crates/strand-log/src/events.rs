//! Broadcast notifications.

use bytes::Bytes;
use tokio::sync::broadcast;
use tracing::warn;

/// A block became locally available on a remote feed.
#[derive(Debug, Clone)]
pub struct BlockEvent {
    pub index: u64,
    pub data: Bytes,
}

/// Receiver that skips over lagged events with a warning instead of
/// surfacing `RecvError::Lagged` to every caller.
pub struct Subscription<E: Clone> {
    rx: broadcast::Receiver<E>,
}

impl<E: Clone> Subscription<E> {
    pub fn new(rx: broadcast::Receiver<E>) -> Self {
        Subscription { rx }
    }

    /// Wait for the next event. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<E> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(
                        skipped = n,
                        event_type = std::any::type_name::<E>(),
                        "subscriber lagged"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<E> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(
                        skipped = n,
                        event_type = std::any::type_name::<E>(),
                        "subscriber lagged"
                    );
                }
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lagged_subscriber_keeps_receiving() {
        let (tx, rx) = broadcast::channel(2);
        let mut sub = Subscription::new(rx);
        for i in 0..5u64 {
            tx.send(i).unwrap();
        }
        // oldest three were overwritten
        assert_eq!(sub.recv().await, Some(3));
        assert_eq!(sub.try_recv(), Some(4));
        assert_eq!(sub.try_recv(), None);
        drop(tx);
        assert_eq!(sub.recv().await, None);
    }
}
