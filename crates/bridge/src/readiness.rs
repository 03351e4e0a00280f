//! Readiness handshake state.
//!
//! The marker is a process-wide cell with three observable values: absent,
//! `pending` and `success`. It only ever moves forward. Observers that show
//! up late read the current value or wait on the cell; observers that were
//! already listening on the channel see the ready event itself.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::channel::BroadcastChannel;
use crate::protocol::ReadyEvent;

/// Stable identifier of the marker.
pub const MARKER_ID: &str = "signing-bridge-marker";
pub const VERSION_ATTRIBUTE: &str = "data-version";
pub const STATE_ATTRIBUTE: &str = "data-injection-state";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionState {
    Pending,
    Success,
}

impl InjectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessMarker {
    pub version: String,
    pub state: InjectionState,
}

impl ReadinessMarker {
    pub fn id(&self) -> &'static str {
        MARKER_ID
    }

    /// Attribute lookup, mirroring how page code reads the marker.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        match name {
            VERSION_ATTRIBUTE => Some(self.version.as_str()),
            STATE_ATTRIBUTE => Some(self.state.as_str()),
            _ => None,
        }
    }
}

/// Shared cell holding the readiness marker.
#[derive(Clone)]
pub struct ReadinessCell {
    marker: Arc<watch::Sender<Option<ReadinessMarker>>>,
}

impl ReadinessCell {
    pub fn new() -> Self {
        let (marker, _) = watch::channel(None);
        Self {
            marker: Arc::new(marker),
        }
    }

    pub fn marker(&self) -> Option<ReadinessMarker> {
        self.marker.borrow().clone()
    }

    pub fn state(&self) -> Option<InjectionState> {
        self.marker.borrow().as_ref().map(|marker| marker.state)
    }

    /// Create the marker in `pending`. Returns `false` if it already exists.
    pub fn mark_pending(&self, version: &str) -> bool {
        self.marker.send_if_modified(|marker| {
            if marker.is_some() {
                return false;
            }
            *marker = Some(ReadinessMarker {
                version: version.to_string(),
                state: InjectionState::Pending,
            });
            true
        })
    }

    /// Move the marker from `pending` to `success`. Returns `false` when the
    /// marker is absent or already successful.
    pub fn mark_success(&self) -> bool {
        self.marker.send_if_modified(|marker| match marker {
            Some(marker) if marker.state == InjectionState::Pending => {
                marker.state = InjectionState::Success;
                true
            }
            _ => false,
        })
    }

    /// Receiver notified on every transition.
    pub fn watch(&self) -> watch::Receiver<Option<ReadinessMarker>> {
        self.marker.subscribe()
    }

    /// Resolves once the marker is `success`, immediately if it already is.
    pub async fn wait_until_ready(&self) {
        let mut receiver = self.marker.subscribe();
        // The sender lives as long as `self`, so this cannot observe closure.
        let _ = receiver
            .wait_for(|marker| {
                matches!(marker, Some(marker) if marker.state == InjectionState::Success)
            })
            .await;
    }
}

impl Default for ReadinessCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Attach the listener that flips the marker to `success` on a ready event.
///
/// The subscription is taken before this returns, so a ready event posted
/// right after the call is still observed.
pub fn spawn_ready_listener(channel: &BroadcastChannel, cell: ReadinessCell) -> JoinHandle<()> {
    let mut events = channel.subscribe::<ReadyEvent>();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if cell.mark_success() {
                info!(version = %event.version, "Signing bridge ready");
            } else {
                debug!(version = %event.version, "Ready event without a pending marker");
            }
        }
    })
}
