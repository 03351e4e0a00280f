use std::io::ErrorKind;

use anyhow::{Context, Result, bail};
use futures::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use serde::{Serialize, de::DeserializeOwned};

const MAX_MESSAGE_SIZE: u32 = 10 * 1024 * 1024; // 10 MB

/// Write a length-prefixed JSON message.
pub async fn write_message<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(msg).context("serializing message")?;
    let len = u32::try_from(payload.len()).context("message length exceeds u32")?;
    if len > MAX_MESSAGE_SIZE {
        bail!("message too large: {len} bytes (max {MAX_MESSAGE_SIZE})");
    }
    writer.write_all(&len.to_be_bytes()).await.context("writing length prefix")?;
    writer.write_all(&payload).await.context("writing payload")?;
    writer.flush().await.context("flushing writer")?;
    Ok(())
}

/// Read a length-prefixed JSON message.
pub async fn read_message<R, T>(reader: &mut R) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    match try_read_message(reader).await? {
        Some(msg) => Ok(msg),
        None => bail!("stream closed before a message arrived"),
    }
}

/// Like [`read_message`], but a stream that ends cleanly on a frame boundary
/// yields `Ok(None)`.
pub async fn try_read_message<R, T>(reader: &mut R) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e).context("reading length prefix"),
    }
    let len = u32::from_be_bytes(len_buf);

    if len > MAX_MESSAGE_SIZE {
        bail!("message too large: {len} bytes (max {MAX_MESSAGE_SIZE})");
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await.context("reading payload")?;
    serde_json::from_slice(&payload)
        .map(Some)
        .context("deserializing message")
}
