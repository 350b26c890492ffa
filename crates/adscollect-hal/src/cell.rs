//! [`ConnectionCell`] – lock-free slot holding the latest [`ConnectionState`].
//!
//! A session's change notification may fire from any thread.  It only ever
//! stores into this cell; the supervisor loads from it once per cycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use adscollect_types::ConnectionState;

/// Shared, clonable slot for the most recently observed connection state.
#[derive(Debug, Clone, Default)]
pub struct ConnectionCell(Arc<AtomicU8>);

impl ConnectionCell {
    pub fn new(initial: ConnectionState) -> Self {
        Self(Arc::new(AtomicU8::new(initial as u8)))
    }

    pub fn store(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::Release);
    }

    pub fn load(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cell_reads_none() {
        assert_eq!(ConnectionCell::default().load(), ConnectionState::None);
    }

    #[test]
    fn clones_share_the_slot() {
        let cell = ConnectionCell::new(ConnectionState::Connected);
        let notifier = cell.clone();
        std::thread::spawn(move || notifier.store(ConnectionState::Lost))
            .join()
            .unwrap();
        assert_eq!(cell.load(), ConnectionState::Lost);
    }
}
