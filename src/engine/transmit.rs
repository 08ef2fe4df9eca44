use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::core::{ChannelConfig, Error, Result, TransmitConfig};
use crate::device::{AudioOutput, Modem, Ptt};
use crate::protocol::{AirFrame, AirFramer};
use crate::util::{duration_of, hex_dump, samples_for};
use super::link::SharedLink;

/// Step of the transmit sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPhase {
    Idle,
    WaitChannelFree,
    KeyedLeadIn,
    Preamble,
    FrameEmit,
    Postamble,
    LeadOut,
    Drain,
    KeyDown,
}

/// Sends one host packet at a time over the air
pub struct TransmitSequencer<M, A, P> {
    /// Modem shared with the receive path
    modem: Arc<Mutex<M>>,
    /// Audio playback
    audio: A,
    /// Keying line
    ptt: P,
    /// Permission and keyed status
    link: SharedLink,
    /// Fragmenter, encode side only
    air: AirFramer,
    /// Channel access timing
    channel: ChannelConfig,
    /// Key-up and drain timing
    timing: TransmitConfig,
    /// Sample rate of the modem
    sample_rate: u32,
    /// Source for the persistence draw
    rng: StdRng,
    /// Current step
    phase: TxPhase,
    /// Shutdown signal for the wait points
    shutdown: CancellationToken,
}

impl<M, A, P> TransmitSequencer<M, A, P>
where
    M: Modem,
    A: AudioOutput,
    P: Ptt,
{
    pub fn new(
        modem: Arc<Mutex<M>>,
        audio: A,
        ptt: P,
        link: SharedLink,
        channel: ChannelConfig,
        timing: TransmitConfig,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let (frame_bytes, sample_rate) = {
            let modem = modem.lock().unwrap_or_else(PoisonError::into_inner);
            (modem.frame_bytes(), modem.sample_rate())
        };

        Ok(TransmitSequencer {
            modem,
            audio,
            ptt,
            link,
            air: AirFramer::new(frame_bytes)?,
            channel,
            timing,
            sample_rate,
            rng: StdRng::from_entropy(),
            phase: TxPhase::Idle,
            shutdown,
        })
    }

    /// Replaces the source of the persistence draw
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Current step
    pub fn phase(&self) -> TxPhase {
        self.phase
    }

    /// Largest packet the fragmenter accepts
    pub fn max_packet_len(&self) -> usize {
        self.air.max_packet_len()
    }

    /// Keying line
    pub fn ptt(&self) -> &P {
        &self.ptt
    }

    /// Runs the whole sequence for one packet
    ///
    /// Once the link is keyed the key-down step runs on every path, and an
    /// error from an earlier step is returned after it.
    pub async fn transmit(&mut self, packet: &[u8]) -> Result<()> {
        self.air.check_len(packet.len())?;
        tracing::debug!(len = packet.len(), data = %hex_dump(packet), "transmit packet");

        self.wait_channel_free().await?;

        let sent = self.send_keyed(packet).await;
        let unkeyed = self.key_down();
        sent.and(unkeyed)
    }

    async fn wait_channel_free(&mut self) -> Result<()> {
        self.set_phase(TxPhase::WaitChannelFree);
        let started = Instant::now();

        loop {
            if self.shutdown.is_cancelled() {
                self.set_phase(TxPhase::Idle);
                return Err(Error::Cancelled);
            }

            let mut pause = self.channel.poll_interval;
            if self.link.may_transmit() {
                if self.persistence_draw() {
                    if self.link.try_key() {
                        break;
                    }
                } else {
                    pause = self.channel.slot_time;
                }
            }

            if let Some(limit) = self.channel.max_wait {
                if started.elapsed() >= limit {
                    self.set_phase(TxPhase::Idle);
                    tracing::warn!(waited = ?limit, "channel busy, dropping packet");
                    return Err(Error::ChannelBusy(limit));
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => {}
                _ = sleep(pause) => {}
            }
        }

        self.set_phase(TxPhase::KeyedLeadIn);
        if let Err(e) = self.ptt.set(true) {
            self.link.unkey();
            self.set_phase(TxPhase::Idle);
            return Err(e);
        }
        Ok(())
    }

    fn persistence_draw(&mut self) -> bool {
        self.channel.persistence == u8::MAX || self.rng.gen::<u8>() <= self.channel.persistence
    }

    async fn send_keyed(&mut self, packet: &[u8]) -> Result<()> {
        self.silence(self.timing.lead_in)?;

        self.set_phase(TxPhase::Preamble);
        let preamble = self.with_modem(|m| m.preamble_to_samples());
        if !preamble.is_empty() {
            self.audio.write(&preamble)?;
        }

        self.set_phase(TxPhase::FrameEmit);
        let frames: Vec<AirFrame> = {
            let modem = self.modem.lock().unwrap_or_else(PoisonError::into_inner);
            self.air.encode(packet, |b| modem.crc16(b))?.collect()
        };
        let mut frame_samples = 0;
        for frame in &frames {
            tracing::trace!(header = ?frame.header(), "emit frame");
            let samples = self.with_modem(|m| m.frame_to_samples(frame.as_bytes()));
            self.audio.write(&samples)?;
            frame_samples += samples.len();
        }
        tracing::debug!(
            frames = frames.len(),
            airtime = ?duration_of(frame_samples, self.sample_rate),
            "frames queued"
        );

        self.set_phase(TxPhase::Postamble);
        let postamble = self.with_modem(|m| m.postamble_to_samples());
        if !postamble.is_empty() {
            self.audio.write(&postamble)?;
        }

        self.set_phase(TxPhase::LeadOut);
        self.silence(self.timing.lead_out)?;

        self.set_phase(TxPhase::Drain);
        self.wait_drained().await
    }

    fn silence(&mut self, duration: Duration) -> Result<()> {
        let len = samples_for(duration, self.sample_rate);
        if len > 0 {
            self.audio.write(&vec![0i16; len])?;
        }
        Ok(())
    }

    async fn wait_drained(&mut self) -> Result<()> {
        let deadline = Instant::now() + self.timing.drain_timeout;
        loop {
            if self.audio.is_drained()? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::DrainTimeout(self.timing.drain_timeout));
            }
            tokio::select! {
                _ = self.shutdown.cancelled() => return Err(Error::Cancelled),
                _ = sleep(self.timing.drain_poll) => {}
            }
        }
    }

    fn key_down(&mut self) -> Result<()> {
        self.set_phase(TxPhase::KeyDown);
        let result = self.ptt.set(false);
        self.link.unkey();
        self.set_phase(TxPhase::Idle);
        if let Err(ref e) = result {
            tracing::error!(error = %e, "failed to unkey PTT");
        }
        result
    }

    fn with_modem<R>(&self, f: impl FnOnce(&mut M) -> R) -> R {
        let mut modem = self.modem.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut modem)
    }

    fn set_phase(&mut self, phase: TxPhase) {
        tracing::trace!(from = ?self.phase, to = ?phase, "transmit phase");
        self.phase = phase;
    }
}
