//! # Notification Queue
//!
//! Single-slot display fed by notification-flagged messages.
//!
//! ```text
//!            timed msg             expiry / dismiss
//!   Idle ───────────────► ActiveTimed ───────────────► Idle
//!    │                                                  ▲
//!    │  modal msg                      dismiss          │
//!    └───────────────────► ActiveModal ─────────────────┘
//! ```
//!
//! Capacity is one and the policy is drop-newest: a qualifying message that
//! arrives while something is showing is discarded, not buffered.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::channel::{BroadcastChannel, Inbound, Subscription};

/// Any message whose `data.notification` is `true`.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationMessage {
    /// `data.modal`, by truthiness.
    pub modal: bool,
    /// `data.duration` in milliseconds, when it is a number. Negative values
    /// mean "expire immediately".
    pub duration: Option<Duration>,
    /// The full `data` object, for the UI to render.
    pub data: Value,
}

impl Inbound for NotificationMessage {
    fn decode(value: &Value) -> Option<Self> {
        let data = value.get("data")?;
        if data.get("notification")?.as_bool()? {
            Some(Self {
                modal: data.get("modal").is_some_and(truthy),
                duration: data
                    .get("duration")
                    .and_then(Value::as_f64)
                    .map(millis_to_duration),
                data: data.clone(),
            })
        } else {
            None
        }
    }
}

fn millis_to_duration(ms: f64) -> Duration {
    Duration::try_from_secs_f64(ms.max(0.0) / 1000.0).unwrap_or(Duration::MAX)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationState {
    Idle,
    ActiveTimed,
    ActiveModal,
}

/// Outcome of offering a notification to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Now showing, in the given state.
    Shown(NotificationState),
    /// Something was already showing; the new message was discarded.
    Dropped,
}

enum Active {
    Timed {
        message: NotificationMessage,
        expiry: JoinHandle<()>,
    },
    Modal {
        message: NotificationMessage,
    },
}

impl Active {
    fn message(&self) -> &NotificationMessage {
        match self {
            Self::Timed { message, .. } | Self::Modal { message } => message,
        }
    }
}

struct Slot {
    active: Option<Active>,
    /// Bumped on every admission so a stale expiry cannot clear a newer
    /// notification.
    generation: u64,
}

struct Shared {
    slot: Mutex<Slot>,
    display: watch::Sender<Option<NotificationMessage>>,
    default_duration: Duration,
}

impl Shared {
    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn offer(self: &Arc<Self>, message: NotificationMessage) -> Admission {
        let mut slot = self.slot();
        if slot.active.is_some() {
            debug!("Notification dropped, one is already showing");
            return Admission::Dropped;
        }

        slot.generation += 1;
        let (active, state) = if message.modal {
            (Active::Modal { message: message.clone() }, NotificationState::ActiveModal)
        } else {
            let after = message.duration.unwrap_or(self.default_duration);
            let expiry = tokio::spawn(expire_after(Arc::downgrade(self), slot.generation, after));
            (
                Active::Timed {
                    message: message.clone(),
                    expiry,
                },
                NotificationState::ActiveTimed,
            )
        };
        slot.active = Some(active);
        drop(slot);

        self.display.send_replace(Some(message));
        Admission::Shown(state)
    }

    fn expire(&self, generation: u64) {
        let mut slot = self.slot();
        if slot.generation != generation || !matches!(slot.active, Some(Active::Timed { .. })) {
            trace!(generation, "Stale notification expiry");
            return;
        }
        slot.active = None;
        drop(slot);

        debug!("Notification expired");
        self.display.send_replace(None);
    }

    fn dismiss(&self) -> bool {
        let mut slot = self.slot();
        let Some(active) = slot.active.take() else {
            return false;
        };
        if let Active::Timed { expiry, .. } = active {
            expiry.abort();
        }
        drop(slot);

        debug!("Notification dismissed");
        self.display.send_replace(None);
        true
    }
}

async fn expire_after(shared: Weak<Shared>, generation: u64, after: Duration) {
    tokio::time::sleep(after).await;
    if let Some(shared) = shared.upgrade() {
        shared.expire(generation);
    }
}

/// Drives a single-notification display.
///
/// Dropping the queue cancels any pending expiry and stops consuming.
pub struct NotificationQueue {
    shared: Arc<Shared>,
    consumer: Option<JoinHandle<()>>,
}

impl NotificationQueue {
    /// A queue fed by explicit [`offer`](Self::offer) calls. Timed
    /// notifications without a duration expire after `default_duration`.
    pub fn new(default_duration: Duration) -> Self {
        let (display, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot {
                    active: None,
                    generation: 0,
                }),
                display,
                default_duration,
            }),
            consumer: None,
        }
    }

    /// A queue that consumes notification-flagged messages from `channel`.
    /// Must be called inside a tokio runtime.
    pub fn attach(channel: &BroadcastChannel, default_duration: Duration) -> Self {
        let mut queue = Self::new(default_duration);
        let messages = channel.subscribe::<NotificationMessage>();
        queue.consumer = Some(tokio::spawn(consume(messages, queue.shared.clone())));
        queue
    }

    /// Offer a notification. Must be called inside a tokio runtime.
    pub fn offer(&self, message: NotificationMessage) -> Admission {
        self.shared.offer(message)
    }

    /// User dismissal: cancels any pending expiry, then clears the slot.
    /// Returns whether anything was showing.
    pub fn dismiss(&self) -> bool {
        self.shared.dismiss()
    }

    pub fn state(&self) -> NotificationState {
        match self.shared.slot().active {
            None => NotificationState::Idle,
            Some(Active::Timed { .. }) => NotificationState::ActiveTimed,
            Some(Active::Modal { .. }) => NotificationState::ActiveModal,
        }
    }

    pub fn active(&self) -> Option<NotificationMessage> {
        self.shared.slot().active.as_ref().map(|active| active.message().clone())
    }

    /// Receiver that changes whenever a notification is shown or cleared.
    pub fn watch(&self) -> watch::Receiver<Option<NotificationMessage>> {
        self.shared.display.subscribe()
    }
}

impl Drop for NotificationQueue {
    fn drop(&mut self) {
        if let Some(consumer) = self.consumer.take() {
            consumer.abort();
        }
        if let Some(Active::Timed { expiry, .. }) = self.shared.slot().active.take() {
            expiry.abort();
        }
    }
}

async fn consume(mut messages: Subscription<NotificationMessage>, shared: Arc<Shared>) {
    while let Some(message) = messages.recv().await {
        shared.offer(message);
    }
}
