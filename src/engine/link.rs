use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::channel::{ChannelEnergyState, ChannelSense};

#[derive(Debug)]
struct LinkState {
    sense: ChannelSense,
    keyed: bool,
}

/// Transmit permission and keyed status behind one lock
///
/// The receive path reads the keyed flag to drop its own transmission and
/// feeds the channel estimate; the transmit path checks permission and keys
/// up in a single step.
#[derive(Debug, Clone)]
pub struct SharedLink {
    inner: Arc<Mutex<LinkState>>,
}

impl SharedLink {
    pub fn new(sense: ChannelSense) -> Self {
        SharedLink {
            inner: Arc::new(Mutex::new(LinkState { sense, keyed: false })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LinkState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Feeds a received block, or returns `None` while keyed
    pub fn observe(&self, samples: &[i16]) -> Option<ChannelEnergyState> {
        let mut state = self.lock();
        if state.keyed {
            return None;
        }
        Some(state.sense.update(samples))
    }

    /// Current carrier sense permission
    pub fn may_transmit(&self) -> bool {
        self.lock().sense.may_transmit()
    }

    /// Current channel estimate
    pub fn channel(&self) -> ChannelEnergyState {
        self.lock().sense.state()
    }

    /// Whether the transmitter is keyed
    pub fn is_keyed(&self) -> bool {
        self.lock().keyed
    }

    /// Marks the link keyed if the channel is free and nobody else holds it
    pub fn try_key(&self) -> bool {
        let mut state = self.lock();
        if state.keyed || !state.sense.may_transmit() {
            return false;
        }
        state.keyed = true;
        true
    }

    /// Clears the keyed flag
    pub fn unkey(&self) {
        self.lock().keyed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ChannelConfig;
    use std::time::Duration;

    fn open_link() -> SharedLink {
        let config = ChannelConfig {
            min_quiet: Duration::from_millis(10),
            ..ChannelConfig::default()
        };
        let link = SharedLink::new(ChannelSense::new(&config, 8000).unwrap());
        for _ in 0..2 {
            link.observe(&[0; 80]);
        }
        link
    }

    #[test]
    fn test_key_requires_permission() {
        let config = ChannelConfig::default();
        let link = SharedLink::new(ChannelSense::new(&config, 8000).unwrap());
        assert!(!link.try_key());
        assert!(!link.is_keyed());
    }

    #[test]
    fn test_keyed_link_ignores_input() {
        let link = open_link();
        assert!(link.may_transmit());
        assert!(link.try_key());
        assert!(!link.try_key());

        assert_eq!(link.observe(&[i16::MAX; 80]), None);
        assert!(link.may_transmit());

        link.unkey();
        assert!(link.observe(&[0; 80]).is_some());
    }
}
