//! Utility module
//!
//! Sample arithmetic and log formatting helpers used throughout the crate.

use std::fmt::Write;
use std::time::Duration;

/// Number of samples covering a duration at the given rate
pub fn samples_for(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_micros() * u128::from(sample_rate) / 1_000_000) as usize
}

/// Duration covered by a number of samples at the given rate
pub fn duration_of(samples: usize, sample_rate: u32) -> Duration {
    Duration::from_secs_f64(samples as f64 / f64::from(sample_rate))
}

/// Formats bytes as space separated upper-case hex
pub fn hex_dump(buf: &[u8]) -> String {
    let mut out = String::with_capacity(buf.len() * 3);
    for (i, byte) in buf.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02X}", byte);
    }
    out
}
