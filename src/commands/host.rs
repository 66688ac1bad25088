use std::io::ErrorKind;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::relay::types::RelayMessage;
use crate::relay::{Envelope, Relay};
use crate::state::AppState;

/// Largest frame accepted from the browser.
pub const MAX_FRAME: usize = 64 * 1024 * 1024;

/// Run as a native-messaging host on stdin/stdout.
pub async fn host(state: &AppState) -> Result<()> {
    info!("native messaging host started");
    serve_host(state.relay.clone(), tokio::io::stdin(), tokio::io::stdout()).await?;
    info!("native messaging host stopped");
    Ok(())
}

/// Reads `mcq_detected` frames until EOF and writes one `mcq_answer` frame
/// per request, in completion order. Requests still in flight at EOF are
/// answered before returning.
pub async fn serve_host<R, W>(relay: Arc<Relay>, mut reader: R, writer: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (relay_tx, relay_rx) = mpsc::unbounded_channel();
    let relay_task = tokio::spawn(relay.serve(relay_rx));

    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<RelayMessage>();
    let writer_task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(message) = reply_rx.recv().await {
            let payload = serde_json::to_vec(&message)?;
            write_frame(&mut writer, &payload).await?;
        }
        Ok::<_, anyhow::Error>(())
    });

    let read_result = forward_frames(&mut reader, &relay_tx, &reply_tx).await;

    // Flush answers already in flight even when the input stream failed.
    drop(relay_tx);
    drop(reply_tx);
    relay_task.await?;
    let write_result = writer_task.await?;
    read_result?;
    write_result
}

/// Relay every inbound frame until a clean EOF.
async fn forward_frames<R: AsyncRead + Unpin>(
    reader: &mut R,
    relay_tx: &mpsc::UnboundedSender<Envelope>,
    reply_tx: &mpsc::UnboundedSender<RelayMessage>,
) -> Result<()> {
    while let Some(frame) = read_frame(reader).await? {
        let message: RelayMessage = match serde_json::from_slice(&frame) {
            Ok(m) => m,
            Err(e) => {
                warn!(size = frame.len(), "dropping malformed message: {}", e);
                continue;
            }
        };
        debug!("message received");
        let envelope = Envelope {
            message,
            reply_to: reply_tx.clone(),
        };
        if relay_tx.send(envelope).is_err() {
            bail!("relay stopped unexpectedly");
        }
    }
    Ok(())
}

/// One length-prefixed frame, or `None` on a clean EOF.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len = [0u8; 4];
    match reader.read_exact(&mut len).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_ne_bytes(len) as usize;
    if len > MAX_FRAME {
        bail!("frame of {} bytes exceeds the {} byte limit", len, MAX_FRAME);
    }
    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .context("truncated frame")?;
    Ok(Some(payload))
}

pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let len = u32::try_from(payload.len()).context("frame too large")?;
    writer.write_all(&len.to_ne_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}
