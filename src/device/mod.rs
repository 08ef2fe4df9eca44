//! Boundaries to the external collaborators
//!
//! The modem waveform codec, the audio engine and the PTT line driver live
//! outside the protocol engine. These traits describe what the engine needs
//! from them.

mod loopback;
mod ptt;

pub use self::loopback::{crc16_ccitt, LoopbackModem, MemoryAudio};
pub use self::ptt::{open_ptt, NullPtt, SerialPtt};

use crate::core::Result;

/// Data modem working on whole frames
pub trait Modem: Send {
    /// Frame size in bits
    fn bits_per_frame(&self) -> usize;

    /// Audio sample rate
    fn sample_rate(&self) -> u32 {
        crate::core::SAMPLE_RATE
    }

    /// Most samples one frame modulates to
    fn max_tx_samples(&self) -> usize;

    /// Most samples the demodulator asks for at once
    fn max_rx_samples(&self) -> usize;

    /// Preamble audio, empty if the waveform has none
    fn preamble_to_samples(&mut self) -> Vec<i16>;

    /// Postamble audio, empty if the waveform has none
    fn postamble_to_samples(&mut self) -> Vec<i16>;

    /// Modulates one frame
    fn frame_to_samples(&mut self, frame: &[u8]) -> Vec<i16>;

    /// Samples the demodulator needs for its next step
    fn next_required_sample_count(&self) -> usize;

    /// Demodulates exactly `next_required_sample_count` samples, returning a
    /// frame once one passes the modem's own validity check
    fn samples_to_frame(&mut self, samples: &[i16]) -> Option<Vec<u8>>;

    /// CRC used to seal frames
    fn crc16(&self, data: &[u8]) -> u16;

    /// Frame size in bytes
    fn frame_bytes(&self) -> usize {
        self.bits_per_frame() / 8
    }
}

/// Audio playback
pub trait AudioOutput: Send {
    /// Queues samples for playback
    fn write(&mut self, samples: &[i16]) -> Result<()>;

    /// Whether everything written so far has been played
    fn is_drained(&mut self) -> Result<bool>;
}

/// Transmitter keying line
pub trait Ptt: Send {
    /// Keys or unkeys the transmitter
    fn set(&mut self, on: bool) -> Result<()>;

    /// Current key state
    fn is_on(&self) -> bool;
}

impl<T: Ptt + ?Sized> Ptt for Box<T> {
    fn set(&mut self, on: bool) -> Result<()> {
        (**self).set(on)
    }

    fn is_on(&self) -> bool {
        (**self).is_on()
    }
}

impl<T: AudioOutput + ?Sized> AudioOutput for Box<T> {
    fn write(&mut self, samples: &[i16]) -> Result<()> {
        (**self).write(samples)
    }

    fn is_drained(&mut self) -> Result<bool> {
        (**self).is_drained()
    }
}
