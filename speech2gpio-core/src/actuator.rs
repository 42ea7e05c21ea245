//! `Actuator`: the single synchronised entry point for pin writes.
//!
//! Every physical write, from the dispatcher thread or from the self-test
//! task, goes through one `parking_lot::Mutex` around the `PinRegistry`.
//! The lock is held for exactly one write: a two-pin command is two
//! independent critical sections, and another writer may land between them.
//!
//! Writes are best-effort. A hardware error is returned as
//! `WriteOutcome::Failed` and never propagated as an `Err`.

use parking_lot::Mutex;
use tracing::debug;

use crate::gpio::{PinLevel, PinLine, PinRegistry};

/// Result of one best-effort pin write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The level reached the hardware.
    Applied,
    /// The hardware rejected the write. Already logged; callers may ignore it.
    Failed(String),
    /// The pins were released before this write was attempted.
    Released,
}

#[derive(Debug)]
pub struct Actuator {
    pins: Mutex<PinRegistry>,
}

impl Actuator {
    pub fn new(pins: PinRegistry) -> Self {
        Self {
            pins: Mutex::new(pins),
        }
    }

    /// Drive `line` to `level`. Never fails from the caller's point of view.
    pub fn set_pin(&self, line: PinLine, level: PinLevel) -> WriteOutcome {
        let mut pins = self.pins.lock();
        let Some(pin) = pins.pin_mut(line) else {
            debug!(%line, ?level, "write skipped: pins released");
            return WriteOutcome::Released;
        };

        match pin.write(level) {
            Ok(()) => {
                debug!(%line, ?level, "pin written");
                WriteOutcome::Applied
            }
            Err(e) => {
                debug!(%line, ?level, "pin write failed: {e}");
                WriteOutcome::Failed(e.to_string())
            }
        }
    }

    /// Release both pins. Returns how many handles were released by this
    /// call; a second call returns 0.
    pub fn release(&self) -> usize {
        self.pins.lock().release_all()
    }

    pub fn is_released(&self) -> bool {
        self.pins.lock().is_released()
    }
}
