//! GPIO pin port backed by ESP-IDF's `gpio_*` driver.
//!
//! Tracks which pins are claimed so a second `bind` of the same pin
//! reports [`PinError::Busy`].
//!
//! ## Dual-target design
//!
//! On ESP-IDF: configures and drives real GPIO outputs.
//! On host/test: keeps each pin's level in memory, readable via
//! [`GpioBank::level`].

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

use std::sync::{Mutex, PoisonError};

use heapless::Vec;
use log::warn;

use crate::error::PinError;
use crate::pins::MAX_CHANNELS;
use crate::ports::{Level, PinId, PinPort};

/// Number of GPIOs the simulated bank exposes.
#[cfg(not(target_os = "espidf"))]
pub const SIM_PIN_COUNT: PinId = 49;

/// Claimed pins and, on host, their current levels.
#[derive(Default)]
pub struct GpioBank {
    claimed: Mutex<Vec<PinId, MAX_CHANNELS>>,
    #[cfg(not(target_os = "espidf"))]
    levels: Mutex<Vec<(PinId, Level), MAX_CHANNELS>>,
}

impl GpioBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_claimed(&self, pin: PinId) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&pin)
    }
}

impl PinPort for GpioBank {
    fn bind(&self, pin: PinId) -> Result<(), PinError> {
        let mut claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        if claimed.contains(&pin) {
            return Err(PinError::Busy);
        }
        configure_output(pin)?;
        if claimed.push(pin).is_err() {
            warn!("gpio: claim table full, refusing GPIO {}", pin);
            return Err(PinError::Unavailable);
        }
        Ok(())
    }

    fn release(&self, pin: PinId) {
        let mut claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pos) = claimed.iter().position(|&p| p == pin) {
            claimed.swap_remove(pos);
            reset_pin(pin);
        }
    }

    #[cfg(target_os = "espidf")]
    fn write(&self, pin: PinId, level: Level) {
        // SAFETY: gpio_set_level is a register write on a pin configured as
        // an output in bind(); the timer task is the only writer while armed.
        let ret = unsafe { gpio_set_level(pin, u32::from(level.is_high())) };
        if ret != ESP_OK as i32 {
            warn!("gpio: set_level({}) failed (rc={})", pin, ret);
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn write(&self, pin: PinId, level: Level) {
        let mut levels = self.levels.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = levels.iter_mut().find(|(p, _)| *p == pin) {
            slot.1 = level;
        } else if levels.push((pin, level)).is_err() {
            warn!("gpio(sim): level table full, dropping write to GPIO {}", pin);
        }
    }
}

#[cfg(not(target_os = "espidf"))]
impl GpioBank {
    /// Last level written to `pin` (simulation only).
    pub fn level(&self, pin: PinId) -> Option<Level> {
        self.levels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(p, _)| *p == pin)
            .map(|&(_, l)| l)
    }
}

// ── Platform hooks ────────────────────────────────────────────

#[cfg(target_os = "espidf")]
fn configure_output(pin: PinId) -> Result<(), PinError> {
    if !(0..SOC_GPIO_PIN_COUNT as PinId).contains(&pin) {
        return Err(PinError::Unavailable);
    }
    // SAFETY: pin is in range; reset + direction are plain register
    // configuration calls, serialised by the claim lock.
    let ret = unsafe {
        gpio_reset_pin(pin);
        gpio_set_direction(pin, gpio_mode_t_GPIO_MODE_OUTPUT)
    };
    if ret != ESP_OK as i32 {
        warn!("gpio: GPIO {} cannot be an output (rc={})", pin, ret);
        return Err(PinError::Unavailable);
    }
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
fn configure_output(pin: PinId) -> Result<(), PinError> {
    if (0..SIM_PIN_COUNT).contains(&pin) {
        Ok(())
    } else {
        Err(PinError::Unavailable)
    }
}

#[cfg(target_os = "espidf")]
fn reset_pin(pin: PinId) {
    // SAFETY: pin was validated and claimed in bind().
    unsafe {
        gpio_reset_pin(pin);
    }
}

#[cfg(not(target_os = "espidf"))]
fn reset_pin(_pin: PinId) {}
