//! # Broadcast Channel
//!
//! The shared, unscoped message medium between the page, the relay and
//! anything else running in the same context. Any code holding the channel
//! can post arbitrary JSON; every consumer subscribes for one message shape
//! and never sees the rest.
//!
//! ```text
//!   page code ──┐                        ┌── Subscription<ResponseEnvelope>  (shim)
//!   shim ───────┼──► BroadcastChannel ───┼── Subscription<RequestEnvelope>   (relay)
//!   relay ──────┘     (raw JSON)         ├── Subscription<ReadyEvent>        (readiness)
//!                                        └── Subscription<NotificationMessage>
//! ```
//!
//! Messages are decoded at post time and queued per subscription, so a
//! subscription only ever buffers messages of its own shape. Delivery is
//! lossless and in posting order no matter how much foreign traffic the
//! channel carries.

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::BridgeError;
use crate::protocol::{BridgeMessage, ReadyEvent, RequestEnvelope, ResponseEnvelope};

/// A message shape a component is willing to act on.
///
/// `decode` must return `None` for anything it does not fully understand;
/// the channel is adversarial and foreign traffic is expected.
pub trait Inbound: Sized + Send + 'static {
    fn decode(value: &Value) -> Option<Self>;
}

impl Inbound for Value {
    fn decode(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl Inbound for RequestEnvelope {
    fn decode(value: &Value) -> Option<Self> {
        match BridgeMessage::from_value(value)? {
            BridgeMessage::SignRequest(request) => Some(request),
            _ => None,
        }
    }
}

impl Inbound for ResponseEnvelope {
    fn decode(value: &Value) -> Option<Self> {
        match BridgeMessage::from_value(value)? {
            BridgeMessage::SignResult(response) => Some(response),
            _ => None,
        }
    }
}

impl Inbound for ReadyEvent {
    fn decode(value: &Value) -> Option<Self> {
        match BridgeMessage::from_value(value)? {
            BridgeMessage::Ready(event) => Some(event),
            _ => None,
        }
    }
}

/// The posting side of one typed subscription.
trait Listener: Send + Sync {
    /// Queue `value` if it has this listener's shape. Returns whether it was
    /// queued.
    fn offer(&self, value: &Value) -> bool;

    /// The subscription was dropped.
    fn detached(&self) -> bool;
}

impl<M: Inbound> Listener for mpsc::UnboundedSender<M> {
    fn offer(&self, value: &Value) -> bool {
        match M::decode(value) {
            Some(message) => self.send(message).is_ok(),
            None => false,
        }
    }

    fn detached(&self) -> bool {
        self.is_closed()
    }
}

/// In-memory fan-out of raw JSON messages, delivered in posting order.
///
/// Clones share the same set of subscriptions. Subscriptions see the end
/// of the stream once every clone is dropped.
#[derive(Clone, Default)]
pub struct BroadcastChannel {
    listeners: Arc<Mutex<Vec<Box<dyn Listener>>>>,
}

impl BroadcastChannel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Post a raw message. Returns how many subscriptions accepted it.
    pub fn post(&self, value: Value) -> usize {
        let mut listeners = self.listeners();
        listeners.retain(|listener| !listener.detached());

        let accepted = listeners
            .iter()
            .filter(|listener| listener.offer(&value))
            .count();
        if accepted == 0 {
            debug!("Message posted with no interested listeners");
        } else {
            trace!(accepted, "Message posted");
        }
        accepted
    }

    pub fn post_message(&self, message: &BridgeMessage) -> Result<usize, BridgeError> {
        Ok(self.post(message.to_value()?))
    }

    /// Start listening for messages of shape `M`. Only messages posted after
    /// this call are delivered.
    #[must_use]
    pub fn subscribe<M: Inbound>(&self) -> Subscription<M> {
        let (sender, receiver) = mpsc::unbounded_channel::<M>();
        self.listeners().push(Box::new(sender));
        Subscription { receiver }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.listeners()
            .iter()
            .filter(|listener| !listener.detached())
            .count()
    }

    fn listeners(&self) -> MutexGuard<'_, Vec<Box<dyn Listener>>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A listener for one message shape. Dropping it detaches the listener.
pub struct Subscription<M> {
    receiver: mpsc::UnboundedReceiver<M>,
}

impl<M: Inbound> Subscription<M> {
    /// Next message of shape `M`, or `None` once every channel handle is gone
    /// and the queue is drained.
    pub async fn recv(&mut self) -> Option<M> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`Subscription::recv`].
    pub fn try_recv(&mut self) -> Result<Option<M>, BridgeError> {
        match self.receiver.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(BridgeError::ChannelClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn typed_subscription_skips_foreign_shapes() {
        let channel = BroadcastChannel::new();
        let mut responses = channel.subscribe::<ResponseEnvelope>();

        channel.post(json!({"hello": "page"}));
        channel.post(RequestEnvelope::new("a", json!(1)).into_message().to_value().unwrap());
        channel
            .post_message(&ResponseEnvelope::success("a", "sig").into_message())
            .unwrap();

        let received = timeout(Duration::from_millis(100), responses.recv())
            .await
            .expect("timeout")
            .expect("response");
        assert_eq!(received, ResponseEnvelope::success("a", "sig"));
    }

    #[test]
    fn foreign_flood_does_not_displace_queued_messages() {
        let channel = BroadcastChannel::new();
        let mut responses = channel.subscribe::<ResponseEnvelope>();

        channel
            .post_message(&ResponseEnvelope::success("first", "sig").into_message())
            .unwrap();
        for i in 0..10_000 {
            assert_eq!(channel.post(json!({"unrelated": i})), 0);
        }
        channel
            .post_message(&ResponseEnvelope::success("second", "sig").into_message())
            .unwrap();

        assert_eq!(responses.try_recv().unwrap().unwrap().id, "first");
        assert_eq!(responses.try_recv().unwrap().unwrap().id, "second");
        assert_eq!(responses.try_recv().unwrap(), None);
    }

    #[test]
    fn raw_subscription_sees_everything() {
        let channel = BroadcastChannel::new();
        let mut raw = channel.subscribe::<Value>();

        channel.post(json!(1));
        channel.post(json!("two"));

        assert_eq!(raw.try_recv().unwrap(), Some(json!(1)));
        assert_eq!(raw.try_recv().unwrap(), Some(json!("two")));
        assert_eq!(raw.try_recv().unwrap(), None);
    }

    #[test]
    fn post_counts_only_interested_listeners() {
        let channel = BroadcastChannel::new();
        assert_eq!(channel.post(json!({})), 0);

        let _raw = channel.subscribe::<Value>();
        let _ready = channel.subscribe::<ReadyEvent>();
        assert_eq!(channel.post(json!({})), 1);
        assert_eq!(
            channel
                .post_message(&BridgeMessage::Ready(ReadyEvent { version: "1".into() }))
                .unwrap(),
            2
        );
    }

    #[test]
    fn dropping_subscription_detaches_listener() {
        let channel = BroadcastChannel::new();
        {
            let _a = channel.subscribe::<Value>();
            let _b = channel.subscribe::<ReadyEvent>();
            assert_eq!(channel.subscriber_count(), 2);
        }
        assert_eq!(channel.subscriber_count(), 0);
        assert_eq!(channel.post(json!({})), 0);
    }

    #[tokio::test]
    async fn recv_drains_then_ends_when_channel_is_gone() {
        let channel = BroadcastChannel::new();
        let mut ready = channel.subscribe::<ReadyEvent>();
        channel
            .post_message(&BridgeMessage::Ready(ReadyEvent { version: "1".into() }))
            .unwrap();
        drop(channel);

        assert_eq!(ready.recv().await.unwrap().version, "1");
        assert!(ready.recv().await.is_none());
    }

    #[test]
    fn try_recv_reports_closed_channel() {
        let channel = BroadcastChannel::new();
        let mut ready = channel.subscribe::<ReadyEvent>();
        drop(channel);
        assert!(matches!(ready.try_recv(), Err(BridgeError::ChannelClosed)));
    }
}
