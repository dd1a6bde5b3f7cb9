//! Broadcast relay: fans normalized events out to every live subscriber.
//!
//! Built on `tokio::sync::broadcast`: each subscriber owns an independent
//! receiver, so delivery is FIFO per subscriber and a slow or dropped
//! consumer never blocks the rest. Closed receivers fall out of the channel
//! lazily when dropped.

use tokio::sync::broadcast;
use tracing::debug;

use crate::protocol::ServerMessage;

#[derive(Clone)]
pub struct Relay {
    tx: broadcast::Sender<ServerMessage>,
}

impl Relay {
    /// `capacity` bounds the per-subscriber backlog; a subscriber that falls
    /// further behind than this skips the overrun messages and keeps going.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.tx.subscribe()
    }

    /// Deliver `message` to every current subscriber. Fire-and-forget: a
    /// send with no subscribers is not an error.
    pub fn broadcast(&self, message: ServerMessage) {
        debug!(subscribers = self.tx.receiver_count(), "broadcasting");
        let _ = self.tx.send(message);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(message: &str) -> ServerMessage {
        ServerMessage::Info {
            message: message.to_owned(),
        }
    }

    #[tokio::test]
    async fn all_subscribers_receive_the_event() {
        let relay = Relay::new(16);
        let mut a = relay.subscribe();
        let mut b = relay.subscribe();
        let mut c = relay.subscribe();

        relay.broadcast(info("hello"));

        assert_eq!(a.recv().await.unwrap(), info("hello"));
        assert_eq!(b.recv().await.unwrap(), info("hello"));
        assert_eq!(c.recv().await.unwrap(), info("hello"));
    }

    #[tokio::test]
    async fn per_subscriber_order_matches_broadcast_order() {
        let relay = Relay::new(16);
        let mut rx = relay.subscribe();

        relay.broadcast(info("first"));
        relay.broadcast(info("second"));

        assert_eq!(rx.recv().await.unwrap(), info("first"));
        assert_eq!(rx.recv().await.unwrap(), info("second"));
    }

    #[tokio::test]
    async fn dropped_subscriber_does_not_block_the_rest() {
        let relay = Relay::new(16);
        let gone = relay.subscribe();
        let mut stays = relay.subscribe();

        drop(gone);
        relay.broadcast(info("still here"));

        assert_eq!(stays.recv().await.unwrap(), info("still here"));
        assert_eq!(relay.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn broadcast_without_subscribers_is_a_no_op() {
        let relay = Relay::new(16);
        relay.broadcast(info("nobody listening"));
        assert_eq!(relay.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_events() {
        // No replay/catch-up: the gap is recoverable only via the history
        // endpoint.
        let relay = Relay::new(16);
        relay.broadcast(info("before"));

        let mut rx = relay.subscribe();
        relay.broadcast(info("after"));

        assert_eq!(rx.recv().await.unwrap(), info("after"));
    }
}
