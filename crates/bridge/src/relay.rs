use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::authority::Authority;
use crate::channel::{BroadcastChannel, Subscription};
use crate::protocol::{RequestEnvelope, ResponseEnvelope};

/// Privileged forwarder between the page's channel and the authority.
///
/// Only well-formed sign requests are forwarded; everything else on the
/// channel is ignored. Each request is handled on its own task, so results
/// go back in whatever order the authority finishes them.
pub struct Relay {
    forwarded: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl Relay {
    /// Start relaying. Must be called inside a tokio runtime.
    pub fn attach(channel: BroadcastChannel, authority: Arc<dyn Authority>) -> Self {
        let forwarded = Arc::new(AtomicU64::new(0));
        let requests = channel.subscribe::<RequestEnvelope>();
        let task = tokio::spawn(relay_requests(
            requests,
            channel,
            authority,
            forwarded.clone(),
        ));
        Self { forwarded, task }
    }

    /// Requests handed to the authority so far.
    pub fn requests_forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Hand one request to the authority and build the result for the same id.
/// The payload is passed through untouched; authority errors become failed
/// results carrying the error's full message.
pub async fn forward(authority: &dyn Authority, request: RequestEnvelope) -> ResponseEnvelope {
    let RequestEnvelope { id, data } = request;
    match authority.sign(&id, &data.structured_data).await {
        Ok(signature) => ResponseEnvelope::success(id, signature),
        Err(e) => {
            debug!(id = %id, error = %e, "Authority reported a failure");
            ResponseEnvelope::failure(id, format!("{e:#}"))
        }
    }
}

async fn relay_requests(
    mut requests: Subscription<RequestEnvelope>,
    channel: BroadcastChannel,
    authority: Arc<dyn Authority>,
    forwarded: Arc<AtomicU64>,
) {
    while let Some(request) = requests.recv().await {
        forwarded.fetch_add(1, Ordering::Relaxed);
        debug!(id = %request.id, "Forwarding signing request");

        let channel = channel.clone();
        let authority = authority.clone();
        tokio::spawn(async move {
            let response = forward(authority.as_ref(), request).await;
            if let Err(e) = channel.post_message(&response.into_message()) {
                warn!(error = %e, "Failed to post signing result");
            }
        });
    }
}
