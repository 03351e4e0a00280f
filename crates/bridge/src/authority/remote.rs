use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use futures::io::{AsyncRead, AsyncWrite};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::Authority;
use crate::protocol::{
    BridgeMessage, RequestEnvelope, ResponseEnvelope, read_message, try_read_message,
    write_message,
};

/// An authority living on the far side of a byte stream.
///
/// Each call is one framed request followed by one framed result; calls are
/// serialized over the stream.
pub struct RemoteAuthority<T> {
    io: Mutex<T>,
}

impl<T> RemoteAuthority<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(io: T) -> Self {
        Self { io: Mutex::new(io) }
    }
}

#[async_trait]
impl<T> Authority for RemoteAuthority<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn sign(&self, id: &str, payload: &Value) -> Result<String> {
        let mut io = self.io.lock().await;

        write_message(
            &mut *io,
            &RequestEnvelope::new(id, payload.clone()).into_message(),
        )
        .await
        .context("sending request to authority")?;

        let reply: BridgeMessage = read_message(&mut *io)
            .await
            .context("reading authority reply")?;

        match reply {
            BridgeMessage::SignResult(response) if response.id == id => response
                .result
                .into_outcome()
                .map_err(|e| anyhow::anyhow!(e.to_string())),
            BridgeMessage::SignResult(response) => {
                bail!("authority answered {} while {id} was outstanding", response.id)
            }
            other => bail!("unexpected reply from authority: {other:?}"),
        }
    }
}

/// Serves signing requests read from `io` until the peer closes the stream.
///
/// 1. Reads a `SignRequest`.
/// 2. Signs the payload with `authority`.
/// 3. Writes the matching `SignResult`, success or failure, under the same id.
pub async fn serve_authority<T>(mut io: T, authority: &dyn Authority) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(message) = try_read_message::<_, BridgeMessage>(&mut io)
        .await
        .context("reading request")?
    {
        let request = match message {
            BridgeMessage::SignRequest(request) => request,
            other => {
                warn!(message = ?other, "Ignoring non-request message");
                continue;
            }
        };

        let response = match authority.sign(&request.id, &request.data.structured_data).await {
            Ok(signature) => ResponseEnvelope::success(request.id, signature),
            Err(e) => {
                debug!(id = %request.id, error = %e, "Authority declined to sign");
                ResponseEnvelope::failure(request.id, format!("{e:#}"))
            }
        };

        write_message(&mut io, &response.into_message())
            .await
            .context("sending result")?;
    }

    info!("Relay closed the authority stream");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::duplex;
    use tokio_util::compat::TokioAsyncReadCompatExt;

    struct Declining;

    #[async_trait]
    impl Authority for Declining {
        async fn sign(&self, _id: &str, _payload: &Value) -> Result<String> {
            bail!("declined")
        }
    }

    #[tokio::test]
    async fn failure_message_crosses_the_stream_verbatim() {
        let (relay_io, authority_io) = duplex(4096);
        let server = tokio::spawn(async move {
            serve_authority(authority_io.compat(), &Declining).await.unwrap();
        });

        let remote = RemoteAuthority::new(relay_io.compat());
        let error = remote.sign("req_abc", &json!({"foo": 1})).await.unwrap_err();
        assert_eq!(error.to_string(), "declined");

        drop(remote);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn mismatched_reply_id_is_an_error() {
        let (relay_io, authority_io) = duplex(4096);
        let fake = tokio::spawn(async move {
            let mut io = authority_io.compat();
            let _: BridgeMessage = read_message(&mut io).await.unwrap();
            write_message(&mut io, &ResponseEnvelope::success("other", "sig").into_message())
                .await
                .unwrap();
        });

        let remote = RemoteAuthority::new(relay_io.compat());
        let error = remote.sign("mine", &json!(null)).await.unwrap_err();
        assert!(error.to_string().contains("other"));
        fake.await.unwrap();
    }
}
