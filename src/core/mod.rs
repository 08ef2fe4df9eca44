//! Core types shared by the TNC
//!
//! Errors, configuration and the protocol constants fixed by the host link
//! and audio boundaries.

pub mod error;
pub mod types;
pub mod serde;

pub use self::error::{Error, Result};
pub use self::types::{
    ChannelConfig,
    Config,
    HostConfig,
    ModemConfig,
    PttConfig,
    PttLine,
    TransmitConfig,
};

/// Default TCP port for the host link
pub const DEFAULT_PORT: u16 = 8080;

/// Maximum host packet size in bytes
pub const DEFAULT_MTU: usize = 1024;

/// Audio sample rate of the modem boundary
pub const SAMPLE_RATE: u32 = 8000;

/// Duration of one captured audio block in milliseconds
pub const CAPTURE_BLOCK_MS: u64 = 10;

/// Floor of the channel energy estimate
pub const SILENCE_DB: f32 = -60.0;
