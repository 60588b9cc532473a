//! Pin port over `embedded-hal` output pins.
//!
//! Lets the PWM core drive any HAL that implements
//! [`embedded_hal::digital::OutputPin`] (esp-idf-hal `PinDriver`s, GPIO
//! expanders, test doubles).  Each output is registered up front under the
//! pin number the topology uses.

use std::sync::{Mutex, PoisonError};

use embedded_hal::digital::{Error as _, OutputPin};
use log::warn;

use crate::error::PinError;
use crate::ports::{Level, PinId, PinPort};

struct Slot<O> {
    pin: PinId,
    output: O,
    claimed: bool,
}

/// A fixed set of HAL output pins addressed by pin number.
pub struct HalPins<O> {
    slots: Mutex<Vec<Slot<O>>>,
}

impl<O: OutputPin + Send> HalPins<O> {
    pub fn new(outputs: impl IntoIterator<Item = (PinId, O)>) -> Self {
        let slots = outputs
            .into_iter()
            .map(|(pin, output)| Slot {
                pin,
                output,
                claimed: false,
            })
            .collect();
        Self {
            slots: Mutex::new(slots),
        }
    }

    /// Hand the outputs back, e.g. to reuse them after the chip is removed.
    pub fn into_inner(self) -> Vec<(PinId, O)> {
        self.slots
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_iter()
            .map(|s| (s.pin, s.output))
            .collect()
    }
}

impl<O: OutputPin + Send> PinPort for HalPins<O> {
    fn bind(&self, pin: PinId) -> Result<(), PinError> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = slots
            .iter_mut()
            .find(|s| s.pin == pin)
            .ok_or(PinError::Unavailable)?;
        if slot.claimed {
            return Err(PinError::Busy);
        }
        slot.claimed = true;
        Ok(())
    }

    fn release(&self, pin: PinId) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.iter_mut().find(|s| s.pin == pin) {
            slot.claimed = false;
        }
    }

    fn write(&self, pin: PinId, level: Level) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(slot) = slots.iter_mut().find(|s| s.pin == pin && s.claimed) else {
            return;
        };
        let result = match level {
            Level::High => slot.output.set_high(),
            Level::Low => slot.output.set_low(),
        };
        if let Err(e) = result {
            warn!("hal_pin: write to GPIO {} failed: {:?}", pin, e.kind());
        }
    }
}
