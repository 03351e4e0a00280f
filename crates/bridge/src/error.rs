use std::time::Duration;

/// Fallback message used when a failed result carries no error string.
pub const SIGNING_FAILED: &str = "Signing failed";

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
    #[error("{0}")]
    SigningFailed(String),
    #[error("Signing request {id} timed out after {after:?}")]
    Timeout { id: String, after: Duration },
    #[error("Could not allocate a unique request id (last attempt: {0})")]
    DuplicateRequestId(String),
    #[error("Broadcast channel closed")]
    ChannelClosed,
    #[error("Injection failed: {0}")]
    Injection(String),
}

impl BridgeError {
    /// Builds the caller-facing rejection for a failed result, falling back
    /// to [`SIGNING_FAILED`] when the authority sent no usable message.
    pub fn signing_failed(error: Option<String>) -> Self {
        match error {
            Some(message) if !message.is_empty() => Self::SigningFailed(message),
            _ => Self::SigningFailed(SIGNING_FAILED.to_string()),
        }
    }
}
