use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::core::Result;
use crate::protocol::HostFramer;

/// Why a host session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Host closed the connection
    Closed,
    /// Shutdown requested
    Shutdown,
    /// Transmit queue went away
    QueueClosed,
}

/// Runs one host connection
///
/// Packets decoded from the host are queued for transmission; the queue
/// blocks the reader when full. Received packets are written back
/// byte-stuffed.
pub async fn run_session<S>(
    stream: S,
    mtu: usize,
    outbound: &mpsc::Sender<Bytes>,
    inbound: &mut mpsc::Receiver<Bytes>,
    shutdown: &CancellationToken,
) -> Result<SessionEnd>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, writer) = tokio::io::split(stream);
    let mut reader = FramedRead::new(reader, HostFramer::new(mtu));
    let mut writer = FramedWrite::new(writer, HostFramer::new(mtu));

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                return Ok(SessionEnd::Shutdown);
            }

            frame = reader.next() => {
                let packet = match frame {
                    Some(Ok(packet)) => packet,
                    Some(Err(e)) => return Err(e),
                    None => return Ok(SessionEnd::Closed),
                };
                tracing::debug!(len = packet.len(), "packet from host");
                if outbound.send(packet).await.is_err() {
                    return Ok(SessionEnd::QueueClosed);
                }
            }

            Some(packet) = inbound.recv() => {
                tracing::debug!(len = packet.len(), "packet to host");
                writer.send(packet).await?;
            }
        }
    }
}
