use std::time::Duration;

use serialport::SerialPort;

use crate::core::{Error, PttConfig, PttLine, Result};
use super::Ptt;

/// Keys the transmitter through a serial control line
pub struct SerialPtt {
    /// Open serial port
    port: Box<dyn SerialPort>,
    /// Device path, for logging
    device: String,
    /// Line driven
    line: PttLine,
    /// Key with the line low
    invert: bool,
    /// Current key state
    on: bool,
}

impl SerialPtt {
    /// Opens the port and leaves the transmitter unkeyed
    pub fn open(device: &str, config: &PttConfig) -> Result<Self> {
        let port = serialport::new(device, config.baud)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|e| Error::ptt(format!("Failed to open PTT device {}: {}", device, e)))?;

        Self::from_port(port, device, config)
    }

    /// Takes over an already open port and drives its line to unkeyed
    pub fn from_port(port: Box<dyn SerialPort>, device: &str, config: &PttConfig) -> Result<Self> {
        let mut ptt = SerialPtt {
            port,
            device: device.to_string(),
            line: config.line,
            invert: config.invert,
            on: false,
        };
        ptt.drive(config.invert).map_err(|e| {
            Error::ptt(format!("Failed to unkey {:?} on {}: {}", config.line, device, e))
        })?;
        tracing::info!(device, line = ?config.line, invert = config.invert, "serial PTT ready");
        Ok(ptt)
    }

    fn drive(&mut self, level: bool) -> serialport::Result<()> {
        match self.line {
            PttLine::Rts => self.port.write_request_to_send(level),
            PttLine::Dtr => self.port.write_data_terminal_ready(level),
        }
    }
}

impl Ptt for SerialPtt {
    fn set(&mut self, on: bool) -> Result<()> {
        self.drive(on != self.invert)
            .map_err(|e| Error::ptt(format!("Failed to drive {:?} on {}: {}", self.line, self.device, e)))?;
        if self.on != on {
            tracing::info!(device = %self.device, on, "PTT");
        }
        self.on = on;
        Ok(())
    }

    fn is_on(&self) -> bool {
        self.on
    }
}

impl Drop for SerialPtt {
    fn drop(&mut self) {
        if self.on {
            if let Err(e) = self.set(false) {
                tracing::error!(error = %e, "failed to unkey PTT on close");
            }
        }
    }
}

/// PTT without hardware, only logs key changes
#[derive(Debug, Default)]
pub struct NullPtt {
    on: bool,
    /// Number of key-ups
    keyed: u64,
}

impl NullPtt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times the transmitter was keyed
    pub fn key_count(&self) -> u64 {
        self.keyed
    }
}

impl Ptt for NullPtt {
    fn set(&mut self, on: bool) -> Result<()> {
        if on && !self.on {
            self.keyed += 1;
        }
        self.on = on;
        tracing::info!(on, "PTT");
        Ok(())
    }

    fn is_on(&self) -> bool {
        self.on
    }
}

/// Opens the PTT driver selected by the configuration
pub fn open_ptt(config: &PttConfig) -> Result<Box<dyn Ptt>> {
    match config.device.as_deref() {
        Some(device) => Ok(Box::new(SerialPtt::open(device, config)?)),
        None => {
            tracing::warn!("no PTT device configured, keying is logged only");
            Ok(Box::new(NullPtt::new()))
        }
    }
}
