use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Serialize, Deserialize};

use super::{Error, Result};

/// Configuration for the TNC
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host link settings
    pub host: HostConfig,
    /// Modem selection
    pub modem: ModemConfig,
    /// Carrier sense and channel access
    pub channel: ChannelConfig,
    /// Transmit timing
    pub transmit: TransmitConfig,
    /// PTT line
    pub ptt: PttConfig,
}

/// Host-facing TCP link
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Local address to listen on
    pub bind_addr: SocketAddr,
    /// Largest packet accepted from the host
    pub mtu: usize,
    /// Depth of the outbound packet queue
    pub tx_queue: usize,
    /// Depth of the queue of received packets waiting for the host
    pub rx_queue: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], super::DEFAULT_PORT)),
            mtu: super::DEFAULT_MTU,
            tx_queue: 16,
            rx_queue: 16,
        }
    }
}

/// Modem selection and loopback modem geometry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModemConfig {
    /// Waveform name handed to the modem backend
    pub mode: String,
    /// Frame size in bytes for the loopback modem
    pub frame_bytes: usize,
    /// Preamble length in samples for the loopback modem
    pub preamble_samples: usize,
}

impl Default for ModemConfig {
    fn default() -> Self {
        ModemConfig {
            mode: "DATAC0".to_string(),
            frame_bytes: 14,
            preamble_samples: 160,
        }
    }
}

/// Carrier sense thresholds and channel access timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Smoothed level above which the channel is busy (dBFS)
    pub upper_db: f32,
    /// Smoothed level below which quiet time accumulates (dBFS)
    pub lower_db: f32,
    /// Weight of the running estimate in the smoothing filter
    pub smoothing: f32,
    /// Quiet time required before transmitting
    #[serde(serialize_with = "super::serde::serialize_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_millis")]
    pub min_quiet: Duration,
    /// Transmit probability per slot, as (persistence + 1) / 256
    pub persistence: u8,
    /// Wait after losing the persistence draw
    #[serde(serialize_with = "super::serde::serialize_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_millis")]
    pub slot_time: Duration,
    /// Interval between channel polls while busy
    #[serde(serialize_with = "super::serde::serialize_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_millis")]
    pub poll_interval: Duration,
    /// Longest wait for a free channel, 0 for no limit
    #[serde(serialize_with = "super::serde::serialize_opt_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_opt_millis")]
    pub max_wait: Option<Duration>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            upper_db: -30.0,
            lower_db: -40.0,
            smoothing: 0.75,
            min_quiet: Duration::from_millis(500),
            persistence: 255,
            slot_time: Duration::from_millis(100),
            poll_interval: Duration::from_millis(10),
            max_wait: Some(Duration::from_secs(30)),
        }
    }
}

/// Timing of the transmit sequence around the modem audio
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransmitConfig {
    /// Silence after keying up
    #[serde(serialize_with = "super::serde::serialize_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_millis")]
    pub lead_in: Duration,
    /// Silence before draining
    #[serde(serialize_with = "super::serde::serialize_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_millis")]
    pub lead_out: Duration,
    /// Interval between drain polls
    #[serde(serialize_with = "super::serde::serialize_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_millis")]
    pub drain_poll: Duration,
    /// Longest wait for the audio output to drain
    #[serde(serialize_with = "super::serde::serialize_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_millis")]
    pub drain_timeout: Duration,
}

impl Default for TransmitConfig {
    fn default() -> Self {
        TransmitConfig {
            lead_in: Duration::from_millis(100),
            lead_out: Duration::from_millis(50),
            drain_poll: Duration::from_millis(1),
            drain_timeout: Duration::from_secs(5),
        }
    }
}

/// Modem control line used for keying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PttLine {
    /// Request To Send
    Rts,
    /// Data Terminal Ready
    Dtr,
}

/// PTT line driver
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PttConfig {
    /// Serial device, no hardware keying when unset
    pub device: Option<String>,
    /// Control line to drive
    pub line: PttLine,
    /// Key with the line low instead of high
    pub invert: bool,
    /// Baud rate used to open the port
    pub baud: u32,
}

impl Default for PttConfig {
    fn default() -> Self {
        PttConfig {
            device: None,
            line: PttLine::Rts,
            invert: false,
            baud: 9600,
        }
    }
}

impl Config {
    /// Loads configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    /// Parses and validates configuration text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)
            .map_err(|e| Error::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Renders the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("Failed to serialize config: {}", e)))
    }

    /// Rejects values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.host.mtu == 0 {
            return Err(Error::config("host.mtu must be positive"));
        }
        if self.host.tx_queue == 0 || self.host.rx_queue == 0 {
            return Err(Error::config("queue depths must be positive"));
        }
        self.channel.validate()?;
        if self.transmit.drain_poll.is_zero() {
            return Err(Error::config("transmit.drain_poll must be positive"));
        }
        Ok(())
    }
}

impl ChannelConfig {
    /// Checks the hysteresis band and filter weight
    pub fn validate(&self) -> Result<()> {
        if !(self.lower_db < self.upper_db) {
            return Err(Error::config(format!(
                "channel.lower_db ({}) must be below channel.upper_db ({})",
                self.lower_db, self.upper_db
            )));
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(Error::config("channel.smoothing must be in [0, 1)"));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::config("channel.poll_interval must be positive"));
        }
        if self.slot_time.is_zero() {
            return Err(Error::config("channel.slot_time must be positive"));
        }
        Ok(())
    }
}
