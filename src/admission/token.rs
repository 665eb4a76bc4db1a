//! Single-use release capability for a gate slot.

use std::sync::Arc;

use crate::admission::gate::GateInner;

/// Proof of admission through a [`Gate`](crate::admission::Gate).
///
/// Calling [`release`](Self::release) is the only way to give the slot back
/// early. Dropping an unreleased token releases it, so the slot is returned
/// on every exit path, including panics and dropped futures.
#[derive(Debug)]
#[must_use = "dropping a ReleaseToken releases its slot immediately"]
pub struct ReleaseToken {
    gate: Arc<GateInner>,
    released: bool,
}

impl ReleaseToken {
    pub(crate) fn new(gate: Arc<GateInner>) -> Self {
        Self {
            gate,
            released: false,
        }
    }

    /// Return the slot to the gate.
    ///
    /// # Panics
    /// Panics if the token was already released. A second release would
    /// decrement the running count for a slot this token no longer owns.
    pub fn release(&mut self) {
        assert!(!self.released, "gate release token released twice");
        self.released = true;
        self.gate.release_slot();
    }

    /// Whether [`release`](Self::release) has been called.
    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for ReleaseToken {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            self.gate.release_slot();
        }
    }
}
