//! Host link
//!
//! A TCP server that serves one host connection at a time. Packets decoded
//! from the host feed the transmit queue; packets received over the air are
//! written back to whichever host is connected, or dropped if none is.

mod connection;

pub use self::connection::{run_session, SessionEnd};

use std::net::SocketAddr;

use bytes::Bytes;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::{Error, HostConfig, Result};

/// TCP server for the host link
pub struct HostServer {
    /// Bound listener
    listener: TcpListener,
    /// Largest packet accepted from the host
    mtu: usize,
}

impl HostServer {
    /// Binds the listening socket
    pub async fn bind(config: &HostConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|e| Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to bind host link on {}: {}", config.bind_addr, e),
            )))?;

        Ok(HostServer {
            listener,
            mtu: config.mtu,
        })
    }

    /// Returns the local socket address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts hosts until shutdown
    pub async fn run(
        self,
        outbound: mpsc::Sender<Bytes>,
        mut inbound: mpsc::Receiver<Bytes>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        tracing::info!(addr = %self.local_addr()?, "host link listening");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("host link shutting down");
                    return Ok(());
                }

                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(a) => a,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!(error = %e, "set_nodelay failed");
                    }
                    tracing::info!(%peer, "host connected");

                    match run_session(stream, self.mtu, &outbound, &mut inbound, &shutdown).await {
                        Ok(SessionEnd::Closed) => tracing::info!(%peer, "host disconnected"),
                        Ok(SessionEnd::Shutdown) => {
                            tracing::info!("host link shutting down");
                            return Ok(());
                        }
                        Ok(SessionEnd::QueueClosed) => {
                            tracing::info!("transmit queue closed, host link exiting");
                            return Ok(());
                        }
                        Err(e) => tracing::warn!(%peer, error = %e, "host session failed"),
                    }
                }

                Some(packet) = inbound.recv() => {
                    tracing::debug!(len = packet.len(), "no host connected, dropping received packet");
                }
            }
        }
    }
}
