//! Protocol engine
//!
//! Wires the carrier sense, the fragmenter and the device boundaries into a
//! transmit path fed by the host and a receive path fed by audio capture.

mod link;
mod receive;
mod transmit;

pub use self::link::SharedLink;
pub use self::receive::ReceiveSequencer;
pub use self::transmit::{TransmitSequencer, TxPhase};

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::channel::ChannelSense;
use crate::core::{Config, Result};
use crate::device::{AudioOutput, Modem, Ptt};

/// Both halves of the engine around one modem
pub struct Engine<M, A, P> {
    pub transmitter: TransmitSequencer<M, A, P>,
    pub receiver: ReceiveSequencer<M>,
    pub link: SharedLink,
    /// Largest host packet the air layer can carry
    host_mtu: usize,
}

impl<M, A, P> Engine<M, A, P>
where
    M: Modem,
    A: AudioOutput,
    P: Ptt,
{
    /// Builds the engine, received packets go to `received`
    pub fn new(
        config: &Config,
        modem: M,
        audio: A,
        ptt: P,
        received: mpsc::Sender<Bytes>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let sense = ChannelSense::new(&config.channel, modem.sample_rate())?;
        let link = SharedLink::new(sense);
        let modem = Arc::new(Mutex::new(modem));

        let transmitter = TransmitSequencer::new(
            modem.clone(),
            audio,
            ptt,
            link.clone(),
            config.channel.clone(),
            config.transmit.clone(),
            shutdown,
        )?;
        let receiver = ReceiveSequencer::new(modem, link.clone(), received)?;

        let host_mtu = config.host.mtu.min(transmitter.max_packet_len());
        if host_mtu < config.host.mtu {
            tracing::warn!(
                mtu = config.host.mtu,
                max_packet = transmitter.max_packet_len(),
                "host MTU exceeds what the air frames can carry, capping"
            );
        }
        tracing::info!(host_mtu, max_packet = transmitter.max_packet_len(), "engine ready");

        Ok(Engine {
            transmitter,
            receiver,
            link,
            host_mtu,
        })
    }

    /// MTU to serve the host link with
    ///
    /// The configured MTU, capped at the largest packet the fragment
    /// countdown can express.
    pub fn host_mtu(&self) -> usize {
        self.host_mtu
    }
}

/// Sends queued host packets one at a time until shutdown
///
/// Failures of a single packet are logged and the next packet is taken.
pub async fn run_transmitter<M, A, P>(
    mut transmitter: TransmitSequencer<M, A, P>,
    mut queue: mpsc::Receiver<Bytes>,
    shutdown: CancellationToken,
) -> Result<()>
where
    M: Modem,
    A: AudioOutput,
    P: Ptt,
{
    loop {
        let packet = tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("transmitter shutting down");
                return Ok(());
            }
            packet = queue.recv() => match packet {
                Some(packet) => packet,
                None => {
                    tracing::info!("packet queue closed, transmitter exiting");
                    return Ok(());
                }
            },
        };

        match transmitter.transmit(&packet).await {
            Ok(()) => tracing::debug!(len = packet.len(), "packet sent"),
            Err(e) if e.is_cancelled() => {
                tracing::info!("transmission cancelled by shutdown");
                return Ok(());
            }
            Err(e) => tracing::warn!(error = %e, len = packet.len(), "packet not sent"),
        }
    }
}
