//! GPIO abstraction and the pin registry.
//!
//! The `GpioController` / `OutputPin` traits decouple the engine from any
//! specific hardware backend (sysfs, a vendor HAL, the in-memory
//! `SimulatedGpio`, ...). The engine only needs four operations: open a pin,
//! switch it to output, write a level, release it.
//!
//! `PinRegistry` owns the two controllable lines for the lifetime of a
//! session. It is never shared directly; the `Actuator` wraps it in the
//! single write lock.

pub mod sim;

pub use sim::{PinWrite, SimulatedGpio};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;

/// Logical output level of a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinLevel {
    High,
    Low,
}

impl From<bool> for PinLevel {
    fn from(on: bool) -> Self {
        if on {
            PinLevel::High
        } else {
            PinLevel::Low
        }
    }
}

/// The two physical output lines the engine controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinLine {
    Red,
    Green,
}

impl PinLine {
    pub const ALL: [PinLine; 2] = [PinLine::Red, PinLine::Green];

    pub fn as_str(self) -> &'static str {
        match self {
            PinLine::Red => "red",
            PinLine::Green => "green",
        }
    }
}

impl std::fmt::Display for PinLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Electrical drive mode of an opened pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveMode {
    Input,
    Output,
}

/// Contract for GPIO controller backends.
pub trait GpioController: Send + Sync {
    /// Open the pin with the given hardware number for exclusive use.
    ///
    /// # Errors
    /// Returns an error if the pin does not exist or is already open.
    fn open_pin(&self, pin: u32) -> Result<Box<dyn OutputPin>>;
}

/// An opened GPIO pin.
pub trait OutputPin: Send + 'static {
    /// Hardware pin number.
    fn pin_number(&self) -> u32;

    fn set_drive_mode(&mut self, mode: DriveMode) -> Result<()>;

    /// Drive the pin to `level`. May fail on hardware error.
    fn write(&mut self, level: PinLevel) -> Result<()>;

    /// Return the pin to the controller. Consumes the handle so a pin can
    /// only be released once.
    fn release(self: Box<Self>);
}

/// Owns the red and green output pins.
///
/// Each slot is an `Option` that `release_all` takes, so a second release
/// finds nothing to do.
pub struct PinRegistry {
    red: Option<Box<dyn OutputPin>>,
    green: Option<Box<dyn OutputPin>>,
}

impl PinRegistry {
    /// Open both pins and configure them as outputs.
    ///
    /// If the second pin fails to open or configure, the first is released
    /// before the error is returned.
    pub fn acquire(gpio: &dyn GpioController, red_pin: u32, green_pin: u32) -> Result<Self> {
        let red = open_output(gpio, red_pin)?;
        let green = match open_output(gpio, green_pin) {
            Ok(pin) => pin,
            Err(e) => {
                red.release();
                return Err(e);
            }
        };

        info!(red_pin, green_pin, "GPIO pins acquired");
        Ok(Self {
            red: Some(red),
            green: Some(green),
        })
    }

    /// Mutable access to the pin behind `line`, or `None` once released.
    pub fn pin_mut(&mut self, line: PinLine) -> Option<&mut (dyn OutputPin + 'static)> {
        match line {
            PinLine::Red => self.red.as_deref_mut(),
            PinLine::Green => self.green.as_deref_mut(),
        }
    }

    pub fn is_released(&self) -> bool {
        self.red.is_none() && self.green.is_none()
    }

    /// Release every pin still held. Returns the number of pins released.
    pub fn release_all(&mut self) -> usize {
        let mut released = 0;
        for pin in [self.red.take(), self.green.take()].into_iter().flatten() {
            debug!(pin = pin.pin_number(), "releasing GPIO pin");
            pin.release();
            released += 1;
        }
        released
    }
}

impl Drop for PinRegistry {
    fn drop(&mut self) {
        self.release_all();
    }
}

impl std::fmt::Debug for PinRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinRegistry")
            .field("red", &self.red.as_ref().map(|p| p.pin_number()))
            .field("green", &self.green.as_ref().map(|p| p.pin_number()))
            .finish()
    }
}

fn open_output(gpio: &dyn GpioController, pin: u32) -> Result<Box<dyn OutputPin>> {
    let mut handle = gpio.open_pin(pin)?;
    if let Err(e) = handle.set_drive_mode(DriveMode::Output) {
        handle.release();
        return Err(e);
    }
    Ok(handle)
}
