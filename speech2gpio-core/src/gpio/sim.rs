//! `SimulatedGpio`: in-memory controller that records every pin operation.
//!
//! Used by tests and by the host app when no real GPIO backend is wired in.
//! Clones share state, so a test can hand one clone to the session and keep
//! another to inspect the write journal afterwards.

use std::collections::{HashMap, HashSet};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use super::{DriveMode, GpioController, OutputPin, PinLevel};
use crate::error::{Result, SpeechGpioError};

/// One recorded physical write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinWrite {
    pub pin: u32,
    pub level: PinLevel,
}

#[derive(Default)]
struct SimState {
    open: HashSet<u32>,
    drive_modes: HashMap<u32, DriveMode>,
    levels: HashMap<u32, PinLevel>,
    release_counts: HashMap<u32, usize>,
    unavailable: HashSet<u32>,
    failing: HashSet<u32>,
    journal: Vec<PinWrite>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<SimState>,
    write_latency: Mutex<Duration>,
    /// Set while any pin is inside `write`.
    write_in_flight: AtomicBool,
    /// Writes that started while another write was still in flight.
    overlapping_writes: AtomicUsize,
}

/// In-memory GPIO controller.
#[derive(Clone, Default)]
pub struct SimulatedGpio {
    shared: Arc<Shared>,
}

impl SimulatedGpio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every physical write take `latency`. Widens the window in which
    /// an unsynchronised caller would overlap two writes.
    pub fn with_write_latency(self, latency: Duration) -> Self {
        *self.shared.write_latency.lock() = latency;
        self
    }

    /// Refuse to open `pin`.
    pub fn mark_unavailable(&self, pin: u32) {
        self.shared.state.lock().unavailable.insert(pin);
    }

    /// Make every write to `pin` fail with a hardware error.
    pub fn fail_writes(&self, pin: u32) {
        self.shared.state.lock().failing.insert(pin);
    }

    /// All successful writes, in the order they hit the hardware.
    pub fn writes(&self) -> Vec<PinWrite> {
        self.shared.state.lock().journal.clone()
    }

    /// Successful writes to one pin, in order.
    pub fn writes_for(&self, pin: u32) -> Vec<PinLevel> {
        self.shared
            .state
            .lock()
            .journal
            .iter()
            .filter(|w| w.pin == pin)
            .map(|w| w.level)
            .collect()
    }

    pub fn clear_writes(&self) {
        self.shared.state.lock().journal.clear();
    }

    /// Last level driven on `pin`.
    pub fn level(&self, pin: u32) -> Option<PinLevel> {
        self.shared.state.lock().levels.get(&pin).copied()
    }

    pub fn drive_mode(&self, pin: u32) -> Option<DriveMode> {
        self.shared.state.lock().drive_modes.get(&pin).copied()
    }

    pub fn is_open(&self, pin: u32) -> bool {
        self.shared.state.lock().open.contains(&pin)
    }

    pub fn release_count(&self, pin: u32) -> usize {
        self.shared
            .state
            .lock()
            .release_counts
            .get(&pin)
            .copied()
            .unwrap_or(0)
    }

    pub fn overlapping_writes(&self) -> usize {
        self.shared.overlapping_writes.load(Ordering::SeqCst)
    }
}

impl GpioController for SimulatedGpio {
    fn open_pin(&self, pin: u32) -> Result<Box<dyn OutputPin>> {
        let mut state = self.shared.state.lock();
        if state.unavailable.contains(&pin) || !state.open.insert(pin) {
            return Err(SpeechGpioError::PinUnavailable { pin });
        }
        state.drive_modes.insert(pin, DriveMode::Input);
        debug!(pin, "simulated pin opened");

        Ok(Box::new(SimulatedPin {
            pin,
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct SimulatedPin {
    pin: u32,
    shared: Arc<Shared>,
}

impl OutputPin for SimulatedPin {
    fn pin_number(&self) -> u32 {
        self.pin
    }

    fn set_drive_mode(&mut self, mode: DriveMode) -> Result<()> {
        self.shared.state.lock().drive_modes.insert(self.pin, mode);
        Ok(())
    }

    fn write(&mut self, level: PinLevel) -> Result<()> {
        if self.shared.write_in_flight.swap(true, Ordering::SeqCst) {
            self.shared.overlapping_writes.fetch_add(1, Ordering::SeqCst);
        }

        let latency = *self.shared.write_latency.lock();
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }

        let result = {
            let mut state = self.shared.state.lock();
            if state.failing.contains(&self.pin) {
                Err(SpeechGpioError::Gpio(format!(
                    "simulated write failure on pin {}",
                    self.pin
                )))
            } else if state.drive_modes.get(&self.pin) != Some(&DriveMode::Output) {
                Err(SpeechGpioError::Gpio(format!(
                    "pin {} is not configured as output",
                    self.pin
                )))
            } else {
                state.levels.insert(self.pin, level);
                state.journal.push(PinWrite {
                    pin: self.pin,
                    level,
                });
                Ok(())
            }
        };

        self.shared.write_in_flight.store(false, Ordering::SeqCst);
        result
    }

    fn release(self: Box<Self>) {
        let mut state = self.shared.state.lock();
        state.open.remove(&self.pin);
        *state.release_counts.entry(self.pin).or_insert(0) += 1;
        debug!(pin = self.pin, "simulated pin released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_twice_is_refused() {
        let gpio = SimulatedGpio::new();
        let _pin = gpio.open_pin(5).expect("first open");
        assert!(matches!(
            gpio.open_pin(5),
            Err(SpeechGpioError::PinUnavailable { pin: 5 })
        ));
    }

    #[test]
    fn write_requires_output_mode() {
        let gpio = SimulatedGpio::new();
        let mut pin = gpio.open_pin(5).expect("open");
        assert!(pin.write(PinLevel::High).is_err());

        pin.set_drive_mode(DriveMode::Output).expect("set mode");
        pin.write(PinLevel::High).expect("write");
        assert_eq!(gpio.level(5), Some(PinLevel::High));
        assert_eq!(gpio.writes(), vec![PinWrite { pin: 5, level: PinLevel::High }]);
    }

    #[test]
    fn failing_pin_records_nothing() {
        let gpio = SimulatedGpio::new();
        gpio.fail_writes(27);
        let mut pin = gpio.open_pin(27).expect("open");
        pin.set_drive_mode(DriveMode::Output).expect("set mode");

        assert!(pin.write(PinLevel::Low).is_err());
        assert!(gpio.writes().is_empty());
        assert_eq!(gpio.level(27), None);
    }

    #[test]
    fn release_frees_pin_for_reopen() {
        let gpio = SimulatedGpio::new();
        let pin = gpio.open_pin(5).expect("open");
        pin.release();

        assert!(!gpio.is_open(5));
        assert_eq!(gpio.release_count(5), 1);
        assert!(gpio.open_pin(5).is_ok());
    }
}
