use std::sync::Arc;

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::channel::{BroadcastChannel, Subscription};
use crate::config::BridgeConfig;
use crate::correlation::CorrelationTable;
use crate::error::BridgeError;
use crate::protocol::{RequestEnvelope, ResponseEnvelope, SignResult};

pub const REQUEST_ID_LEN: usize = 16;

/// Where the shim draws correlation ids from.
pub trait RequestIdSource: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random alphanumeric ids of [`REQUEST_ID_LEN`] characters.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl RequestIdSource for RandomIds {
    fn next_id(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(REQUEST_ID_LEN)
            .map(char::from)
            .collect()
    }
}

type Pending = CorrelationTable<SignResult>;

/// The capability exposed to page code: request a signature over structured
/// data and await the outcome.
///
/// The shim owns its correlation table outright. A single listener, attached
/// when the shim is installed, settles entries as results arrive; results
/// for ids the shim is not waiting on are ignored.
pub struct PageShim {
    channel: BroadcastChannel,
    pending: Arc<Pending>,
    ids: Box<dyn RequestIdSource>,
    config: BridgeConfig,
    dispatcher: JoinHandle<()>,
}

impl PageShim {
    /// Attach the shim to `channel`. Must be called inside a tokio runtime.
    pub fn install(channel: BroadcastChannel, config: BridgeConfig) -> Self {
        Self::with_id_source(channel, config, RandomIds)
    }

    pub fn with_id_source(
        channel: BroadcastChannel,
        config: BridgeConfig,
        ids: impl RequestIdSource + 'static,
    ) -> Self {
        let pending = Arc::new(Pending::new());
        let responses = channel.subscribe::<ResponseEnvelope>();
        let dispatcher = tokio::spawn(dispatch_results(responses, pending.clone()));

        Self {
            channel,
            pending,
            ids: Box::new(ids),
            config,
            dispatcher,
        }
    }

    /// Request a signature over `payload`.
    ///
    /// Resolves with the authority's signature, or fails with the authority's
    /// error message. Without a configured request timeout the future stays
    /// pending until a matching result arrives; dropping it releases the
    /// request's correlation entry.
    pub async fn sign_structured_data(&self, payload: Value) -> Result<String, BridgeError> {
        let (id, receiver) = self.reserve_id()?;
        let mut entry = EntryGuard {
            pending: self.pending.as_ref(),
            id: &id,
            armed: true,
        };

        self.channel
            .post_message(&RequestEnvelope::new(id.clone(), payload).into_message())?;
        debug!(id = %id, "Signing request posted");

        let settled = match self.config.request_timeout {
            None => receiver.await,
            Some(after) => match tokio::time::timeout(after, receiver).await {
                Ok(settled) => settled,
                Err(_) => {
                    debug!(id = %id, ?after, "Signing request timed out");
                    return Err(BridgeError::Timeout { id: id.clone(), after });
                }
            },
        };
        entry.armed = false;

        settled
            .map_err(|_| BridgeError::ChannelClosed)?
            .into_outcome()
    }

    /// Number of requests still waiting for a result.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    fn reserve_id(&self) -> Result<(String, tokio::sync::oneshot::Receiver<SignResult>), BridgeError> {
        let mut last = String::new();
        for _ in 0..self.config.max_id_attempts.max(1) {
            let id = self.ids.next_id();
            if let Some(receiver) = self.pending.register(&id) {
                return Ok((id, receiver));
            }
            debug!(id = %id, "Request id already in flight, drawing another");
            last = id;
        }
        Err(BridgeError::DuplicateRequestId(last))
    }
}

impl Drop for PageShim {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

/// Evicts the request's entry unless it was settled.
struct EntryGuard<'a> {
    pending: &'a Pending,
    id: &'a str,
    armed: bool,
}

impl Drop for EntryGuard<'_> {
    fn drop(&mut self) {
        if self.armed && self.pending.evict(self.id) {
            trace!(id = %self.id, "Released unsettled request");
        }
    }
}

async fn dispatch_results(mut results: Subscription<ResponseEnvelope>, pending: Arc<Pending>) {
    while let Some(response) = results.recv().await {
        if pending.complete(&response.id, response.result) {
            debug!(id = %response.id, "Signing request settled");
        } else {
            trace!(id = %response.id, "Ignoring result for an id not in flight");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    #[test]
    fn random_ids_are_long_alphanumeric_tokens() {
        let id = RandomIds.next_id();
        assert!(id.len() >= 13);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn random_ids_do_not_repeat_in_practice() {
        let ids: HashSet<String> = (0..1000).map(|_| RandomIds.next_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[tokio::test]
    async fn dropped_call_releases_its_entry() {
        let channel = BroadcastChannel::new();
        let shim = PageShim::install(channel, BridgeConfig::default());

        {
            let call = shim.sign_structured_data(serde_json::json!({"a": 1}));
            tokio::pin!(call);
            assert!(
                tokio::time::timeout(Duration::from_millis(10), &mut call)
                    .await
                    .is_err()
            );
            assert_eq!(shim.pending_requests(), 1);
        }
        assert_eq!(shim.pending_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn configured_timeout_evicts_and_fails() {
        let channel = BroadcastChannel::new();
        let config = BridgeConfig::default().with_request_timeout(Duration::from_millis(200));
        let shim = PageShim::install(channel, config);

        let error = shim
            .sign_structured_data(serde_json::json!(null))
            .await
            .unwrap_err();
        assert!(matches!(error, BridgeError::Timeout { after, .. } if after == Duration::from_millis(200)));
        assert_eq!(shim.pending_requests(), 0);
    }
}
