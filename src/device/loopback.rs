use std::sync::{Arc, Mutex, PoisonError};

use crate::core::{Error, ModemConfig, Result};
use super::{AudioOutput, Modem};

/// Marks the start of a frame in the loopback waveform
const SYNC: i16 = i16::MIN;
/// Preamble tone amplitude
const PREAMBLE_LEVEL: i16 = 8000;
/// Left shift applied to each byte
const DATA_SHIFT: u32 = 6;

/// CRC-16/CCITT-FALSE, the CRC FreeDV raw data frames use
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    data.iter().fold(0xFFFF, |mut crc: u16, &byte| {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
        crc
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxState {
    /// Looking for the sync sample
    Hunt,
    /// Collecting one frame
    Frame,
}

/// In-process stand-in for the modem codec
///
/// A frame is one sync sample followed by one sample per byte. The demodulator
/// hunts for the sync sample one sample at a time, then asks for a whole frame
/// and accepts it only if the trailing CRC matches.
#[derive(Debug)]
pub struct LoopbackModem {
    frame_bytes: usize,
    preamble_samples: usize,
    rx_state: RxState,
    /// Frames rejected by the CRC check
    crc_errors: u64,
}

impl LoopbackModem {
    /// Opens the modem with the configured geometry
    pub fn open(config: &ModemConfig) -> Result<Self> {
        if config.frame_bytes < 4 {
            return Err(Error::modem(format!(
                "loopback frame of {} bytes is too small",
                config.frame_bytes
            )));
        }
        tracing::info!(
            mode = %config.mode,
            frame_bytes = config.frame_bytes,
            "loopback modem open"
        );
        Ok(LoopbackModem {
            frame_bytes: config.frame_bytes,
            preamble_samples: config.preamble_samples,
            rx_state: RxState::Hunt,
            crc_errors: 0,
        })
    }

    /// Frames dropped for a bad CRC
    pub fn crc_errors(&self) -> u64 {
        self.crc_errors
    }
}

impl Modem for LoopbackModem {
    fn bits_per_frame(&self) -> usize {
        self.frame_bytes * 8
    }

    fn max_tx_samples(&self) -> usize {
        self.frame_bytes + 1
    }

    fn max_rx_samples(&self) -> usize {
        self.frame_bytes
    }

    fn preamble_to_samples(&mut self) -> Vec<i16> {
        (0..self.preamble_samples)
            .map(|i| if i % 2 == 0 { PREAMBLE_LEVEL } else { -PREAMBLE_LEVEL })
            .collect()
    }

    fn postamble_to_samples(&mut self) -> Vec<i16> {
        Vec::new()
    }

    fn frame_to_samples(&mut self, frame: &[u8]) -> Vec<i16> {
        let mut samples = Vec::with_capacity(frame.len() + 1);
        samples.push(SYNC);
        samples.extend(frame.iter().map(|&b| i16::from(b) << DATA_SHIFT));
        samples
    }

    fn next_required_sample_count(&self) -> usize {
        match self.rx_state {
            RxState::Hunt => 1,
            RxState::Frame => self.frame_bytes,
        }
    }

    fn samples_to_frame(&mut self, samples: &[i16]) -> Option<Vec<u8>> {
        match self.rx_state {
            RxState::Hunt => {
                if samples.first() == Some(&SYNC) {
                    self.rx_state = RxState::Frame;
                }
                None
            }
            RxState::Frame => {
                self.rx_state = RxState::Hunt;
                let frame: Vec<u8> = samples
                    .iter()
                    .map(|&s| (s >> DATA_SHIFT) as u8)
                    .collect();

                let n = frame.len();
                if n < 2 {
                    return None;
                }
                let received = u16::from_be_bytes([frame[n - 2], frame[n - 1]]);
                if crc16_ccitt(&frame[..n - 2]) != received {
                    self.crc_errors += 1;
                    tracing::debug!("loopback frame failed CRC");
                    return None;
                }
                Some(frame)
            }
        }
    }

    fn crc16(&self, data: &[u8]) -> u16 {
        crc16_ccitt(data)
    }
}

#[derive(Debug, Default)]
struct Played {
    samples: Vec<i16>,
    writes: usize,
    fail_after: Option<usize>,
    drain_polls: usize,
    pending_polls: usize,
}

/// Audio output that records everything written
///
/// Clones share the same recording, so a test can keep one handle while the
/// engine owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryAudio {
    inner: Arc<Mutex<Played>>,
}

impl MemoryAudio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports drained only after `polls` calls following each write
    pub fn with_drain_polls(self, polls: usize) -> Self {
        self.lock().drain_polls = polls;
        self
    }

    /// Fails every write after the first `writes`
    pub fn fail_after(self, writes: usize) -> Self {
        self.lock().fail_after = Some(writes);
        self
    }

    /// Samples written so far
    pub fn samples(&self) -> Vec<i16> {
        self.lock().samples.clone()
    }

    /// Takes and clears the samples written so far
    pub fn take_samples(&self) -> Vec<i16> {
        std::mem::take(&mut self.lock().samples)
    }

    /// Number of successful writes
    pub fn writes(&self) -> usize {
        self.lock().writes
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Played> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AudioOutput for MemoryAudio {
    fn write(&mut self, samples: &[i16]) -> Result<()> {
        let mut played = self.lock();
        if played.fail_after.map_or(false, |limit| played.writes >= limit) {
            return Err(Error::audio("write failed"));
        }
        played.samples.extend_from_slice(samples);
        played.writes += 1;
        played.pending_polls = played.drain_polls;
        Ok(())
    }

    fn is_drained(&mut self) -> Result<bool> {
        let mut played = self.lock();
        if played.pending_polls > 0 {
            played.pending_polls -= 1;
            return Ok(false);
        }
        Ok(true)
    }
}
