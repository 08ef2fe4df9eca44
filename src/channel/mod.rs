//! Carrier sense
//!
//! Tracks a smoothed energy estimate of the received audio and derives the
//! transmit permission from it. Two thresholds form a dead band so the
//! decision does not chatter, and the channel must stay below the lower one
//! for a minimum quiet time before it is declared free.

use crate::core::{ChannelConfig, Error, Result, SILENCE_DB};
use crate::util::samples_for;

/// Energy of a sample block in dBFS, floored at -60 dB
pub fn signal_db(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return SILENCE_DB;
    }

    let sum: f32 = samples
        .iter()
        .map(|&s| {
            let x = f32::from(s) / 32768.0;
            x * x
        })
        .sum();
    let mean = sum / samples.len() as f32;

    if mean > 0.0 {
        (10.0 * mean.log10()).max(SILENCE_DB)
    } else {
        SILENCE_DB
    }
}

/// Snapshot of the channel estimate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelEnergyState {
    /// Smoothed energy in dBFS
    pub smoothed_db: f32,
    /// Samples spent below the lower threshold since the last busy edge
    pub quiet_run_length: usize,
    /// Whether transmitting is currently allowed
    pub transmit_allowed: bool,
}

/// Hysteresis carrier sense
#[derive(Debug, Clone)]
pub struct ChannelSense {
    upper_db: f32,
    lower_db: f32,
    smoothing: f32,
    min_quiet_samples: usize,
    state: ChannelEnergyState,
}

impl ChannelSense {
    /// Creates a detector for audio at `sample_rate`
    pub fn new(config: &ChannelConfig, sample_rate: u32) -> Result<Self> {
        config.validate()?;
        if sample_rate == 0 {
            return Err(Error::config("sample rate must be positive"));
        }

        Ok(ChannelSense {
            upper_db: config.upper_db,
            lower_db: config.lower_db,
            smoothing: config.smoothing,
            min_quiet_samples: samples_for(config.min_quiet, sample_rate),
            state: ChannelEnergyState {
                smoothed_db: SILENCE_DB,
                quiet_run_length: 0,
                transmit_allowed: false,
            },
        })
    }

    /// Folds one received block into the estimate
    pub fn update(&mut self, samples: &[i16]) -> ChannelEnergyState {
        let db = signal_db(samples);
        let state = &mut self.state;
        state.smoothed_db = self.smoothing * state.smoothed_db + (1.0 - self.smoothing) * db;

        if state.smoothed_db > self.upper_db {
            if state.transmit_allowed {
                tracing::debug!(level = state.smoothed_db, "channel busy");
            }
            state.quiet_run_length = 0;
            state.transmit_allowed = false;
        } else if state.smoothed_db < self.lower_db {
            state.quiet_run_length = state.quiet_run_length.saturating_add(samples.len());
            if !state.transmit_allowed && state.quiet_run_length > self.min_quiet_samples {
                tracing::debug!(level = state.smoothed_db, "channel free");
                state.transmit_allowed = true;
            }
        }

        *state
    }

    /// Current permission, no side effects
    pub fn may_transmit(&self) -> bool {
        self.state.transmit_allowed
    }

    /// Current estimate
    pub fn state(&self) -> ChannelEnergyState {
        self.state
    }

    /// Quiet time required, in samples
    pub fn min_quiet_samples(&self) -> usize {
        self.min_quiet_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const BLOCK: usize = 80;

    fn config() -> ChannelConfig {
        ChannelConfig {
            min_quiet: Duration::from_millis(100),
            ..ChannelConfig::default()
        }
    }

    fn tone(amplitude: i16) -> Vec<i16> {
        (0..BLOCK)
            .map(|i| if i % 2 == 0 { amplitude } else { -amplitude })
            .collect()
    }

    #[test]
    fn test_signal_db() {
        assert_eq!(signal_db(&[]), SILENCE_DB);
        assert_eq!(signal_db(&[0; 80]), SILENCE_DB);
        assert_eq!(signal_db(&[1; 80]), SILENCE_DB);

        let full = signal_db(&tone(i16::MAX));
        assert!(full > -0.1 && full <= 0.0);

        let quarter = signal_db(&tone(8192));
        assert!((quarter + 12.04).abs() < 0.1);
    }

    #[test]
    fn test_starts_closed() {
        let sense = ChannelSense::new(&config(), 8000).unwrap();
        assert!(!sense.may_transmit());
        assert_eq!(sense.min_quiet_samples(), 800);
    }

    #[test]
    fn test_quiet_dwell_opens_once() {
        let mut sense = ChannelSense::new(&config(), 8000).unwrap();
        let silence = vec![0i16; BLOCK];

        let mut transitions = 0;
        let mut opened_at = None;
        let mut previous = sense.may_transmit();
        for block in 1..=20 {
            let state = sense.update(&silence);
            if state.transmit_allowed != previous {
                transitions += 1;
                opened_at = Some(block);
            }
            previous = state.transmit_allowed;
        }

        assert_eq!(transitions, 1);
        // 800 samples of dwell, the count must exceed it
        assert_eq!(opened_at, Some(11));
    }

    #[test]
    fn test_loud_block_revokes_immediately() {
        let cfg = ChannelConfig {
            smoothing: 0.0,
            ..config()
        };
        let mut sense = ChannelSense::new(&cfg, 8000).unwrap();
        for _ in 0..20 {
            sense.update(&[0; BLOCK]);
        }
        assert!(sense.may_transmit());

        let state = sense.update(&tone(i16::MAX));
        assert!(!state.transmit_allowed);
        assert_eq!(state.quiet_run_length, 0);
    }

    #[test]
    fn test_busy_on_the_block_that_crosses_upper() {
        let mut sense = ChannelSense::new(&config(), 8000).unwrap();
        for _ in 0..20 {
            sense.update(&[0; BLOCK]);
        }

        // -60 -> -45 -> -33.75 -> -25.3 dB with a 0 dB signal
        let loud = tone(i16::MAX);
        assert!(sense.update(&loud).transmit_allowed);
        assert!(sense.update(&loud).transmit_allowed);
        let state = sense.update(&loud);
        assert!(state.smoothed_db > -30.0);
        assert!(!state.transmit_allowed);
        assert_eq!(state.quiet_run_length, 0);
    }

    #[test]
    fn test_dead_band_holds_state() {
        let cfg = ChannelConfig {
            upper_db: -20.0,
            lower_db: -50.0,
            smoothing: 0.0,
            ..config()
        };
        let mut sense = ChannelSense::new(&cfg, 8000).unwrap();

        // About -30 dB sits between the thresholds
        let mid = tone(1036);
        for _ in 0..50 {
            sense.update(&mid);
        }
        assert!(!sense.may_transmit());
        assert_eq!(sense.state().quiet_run_length, 0);

        for _ in 0..11 {
            sense.update(&[0; BLOCK]);
        }
        assert!(sense.may_transmit());

        for _ in 0..50 {
            sense.update(&mid);
        }
        assert!(sense.may_transmit());
    }

    #[test]
    fn test_smoothing_delays_busy_edge() {
        let mut sense = ChannelSense::new(&config(), 8000).unwrap();
        for _ in 0..20 {
            sense.update(&[0; BLOCK]);
        }

        // -40 dB new sample against a -60 dB history stays under -30 dB
        let state = sense.update(&tone(328));
        assert!(state.smoothed_db < -30.0);
        assert!(state.transmit_allowed);
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let cfg = ChannelConfig {
            upper_db: -40.0,
            lower_db: -30.0,
            ..config()
        };
        assert!(ChannelSense::new(&cfg, 8000).is_err());
    }
}
