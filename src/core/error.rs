use std::io;
use std::time::Duration;
use thiserror::Error;

/// Custom error types for the TNC
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("PTT error: {0}")]
    Ptt(String),

    #[error("Modem error: {0}")]
    Modem(String),

    #[error("Packet of {len} bytes exceeds the {max} byte limit")]
    PacketTooLarge { len: usize, max: usize },

    #[error("Channel stayed busy for {0:?}")]
    ChannelBusy(Duration),

    #[error("Audio output not drained after {0:?}")]
    DrainTimeout(Duration),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a new audio error
    pub fn audio(msg: impl Into<String>) -> Self {
        Error::Audio(msg.into())
    }

    /// Creates a new PTT error
    pub fn ptt(msg: impl Into<String>) -> Self {
        Error::Ptt(msg.into())
    }

    /// Creates a new modem error
    pub fn modem(msg: impl Into<String>) -> Self {
        Error::Modem(msg.into())
    }

    /// Whether the error ends the transmit worker rather than a single packet
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
