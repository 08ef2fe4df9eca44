use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::core::Result;
use crate::device::Modem;
use crate::protocol::{AirFramer, AirStats};
use super::link::SharedLink;

/// Turns captured audio into host packets
///
/// Driven from the audio capture callback, one block at a time.
pub struct ReceiveSequencer<M> {
    modem: Arc<Mutex<M>>,
    link: SharedLink,
    /// Reassembly, owned by this path only
    air: AirFramer,
    /// Samples waiting for the demodulator
    buf: Vec<i16>,
    /// Largest buffer kept between blocks
    capacity: usize,
    /// Completed packets for the host
    packets: mpsc::Sender<Bytes>,
    /// Packets dropped because the host queue was full
    dropped: u64,
}

impl<M: Modem> ReceiveSequencer<M> {
    pub fn new(modem: Arc<Mutex<M>>, link: SharedLink, packets: mpsc::Sender<Bytes>) -> Result<Self> {
        let (frame_bytes, max_rx) = {
            let modem = modem.lock().unwrap_or_else(PoisonError::into_inner);
            (modem.frame_bytes(), modem.max_rx_samples())
        };

        // Room for one demodulator step plus a generous capture block
        let capacity = max_rx * 2 + 4096;

        Ok(ReceiveSequencer {
            modem,
            link,
            air: AirFramer::new(frame_bytes)?,
            buf: Vec::with_capacity(capacity),
            capacity,
            packets,
            dropped: 0,
        })
    }

    /// Handles one captured block
    pub fn on_samples(&mut self, block: &[i16]) {
        if self.link.observe(block).is_none() {
            // Our own transmission, and whatever was buffered before it is stale
            self.buf.clear();
            return;
        }

        if self.buf.len() + block.len() > self.capacity {
            tracing::warn!(
                buffered = self.buf.len(),
                block = block.len(),
                "receive buffer overflow, discarding samples"
            );
            self.buf.clear();
            if block.len() > self.capacity {
                return;
            }
        }
        self.buf.extend_from_slice(block);

        let mut modem = self.modem.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            let need = modem.next_required_sample_count();
            if need == 0 || self.buf.len() < need {
                break;
            }

            let frame = modem.samples_to_frame(&self.buf[..need]);
            self.buf.drain(..need);

            if let Some(frame) = frame {
                if let Some(packet) = self.air.decode(&frame) {
                    Self::deliver(&self.packets, &mut self.dropped, packet);
                }
            }
        }
    }

    fn deliver(packets: &mpsc::Sender<Bytes>, dropped: &mut u64, packet: Bytes) {
        match packets.try_send(packet) {
            Ok(()) => {}
            Err(TrySendError::Full(packet)) => {
                *dropped += 1;
                tracing::warn!(len = packet.len(), "host queue full, dropping received packet");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("host queue closed, dropping received packet");
            }
        }
    }

    /// Reassembly counters
    pub fn stats(&self) -> AirStats {
        self.air.stats()
    }

    /// Packets lost to a full host queue
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Samples waiting for the demodulator
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}
