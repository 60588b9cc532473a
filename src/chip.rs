//! Channel operations facade.
//!
//! [`GpioPwmChip`] is what the surrounding PWM framework talks to: the
//! request/free/enable/disable/configure callbacks of a PWM controller,
//! each taking a channel index.  It validates the index against the
//! [`Registry`] and enforces call ordering; the engine does the rest.
//!
//! ```text
//!   framework ──▶ GpioPwmChip ──▶ Registry::get ──▶ Channel (engine)
//!                                                      │
//!                               timer task ◀───────────┘
//! ```

use std::sync::Arc;

use log::info;

use crate::config::SystemConfig;
use crate::engine::{ChannelStatus, Timing};
use crate::error::{Error, Result};
use crate::ports::{Level, PinPort};
use crate::registry::Registry;

/// Desired state of one channel, applied in a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PwmState {
    pub timing: Timing,
    pub enabled: bool,
}

/// A set of software PWM channels emulated on GPIO outputs.
pub struct GpioPwmChip<P: PinPort + 'static> {
    registry: Registry<P>,
    idle_level: Level,
}

impl<P: PinPort + 'static> GpioPwmChip<P> {
    /// Build the chip from `config`, driving pins through `pins`.
    pub fn new(config: &SystemConfig, pins: Arc<P>) -> Result<Self> {
        config.validate()?;
        let bindings = config.topology.bindings.as_slice();
        let registry = Registry::create(
            bindings.len(),
            bindings,
            pins,
            config.timer,
            config.duty_policy,
        )?;
        info!("gpio-pwm: chip ready with {} channel(s)", registry.len());
        Ok(Self {
            registry,
            idle_level: config.idle_level,
        })
    }

    /// Number of channels.
    pub fn npwm(&self) -> usize {
        self.registry.len()
    }

    /// Bind the channel's pin and drive it to the idle level.
    pub fn request(&self, channel: usize) -> Result<()> {
        self.registry.get(channel)?.request(self.idle_level)
    }

    /// Stop the channel if running, then release its pin.
    pub fn free(&self, channel: usize) -> Result<()> {
        self.registry.get(channel)?.free();
        Ok(())
    }

    /// Store period and duty.  Takes effect at the next toggle if running.
    pub fn configure(&self, channel: usize, period_ns: u64, duty_ns: u64) -> Result<Timing> {
        self.registry
            .get(channel)?
            .configure(Timing::new(period_ns, duty_ns))
    }

    /// Start toggling with the stored timing.  Fails with
    /// [`Error::NotRequested`] unless the pin is requested.
    pub fn enable(&self, channel: usize) -> Result<()> {
        self.registry.get(channel)?.start()?;
        info!("ch{}: enabled", channel);
        Ok(())
    }

    /// Commit `timing`, then start.  On failure the previous timing is
    /// restored and the channel stays as it was.
    pub fn enable_with(&self, channel: usize, timing: Timing) -> Result<()> {
        let ch = self.registry.get(channel)?;
        if !ch.is_requested() {
            return Err(Error::NotRequested);
        }
        let previous = ch.timing();
        ch.configure(timing)?;
        if let Err(e) = ch.start() {
            ch.restore_timing(previous);
            return Err(e);
        }
        info!("ch{}: enabled", channel);
        Ok(())
    }

    /// Stop toggling.  Safe to call on an idle channel.
    pub fn disable(&self, channel: usize) -> Result<()> {
        self.registry.get(channel)?.stop();
        info!("ch{}: disabled", channel);
        Ok(())
    }

    /// Apply timing and enabled state together.
    pub fn apply(&self, channel: usize, state: PwmState) -> Result<()> {
        if state.enabled {
            self.enable_with(channel, state.timing)
        } else {
            self.configure(channel, state.timing.period_ns, state.timing.duty_ns)?;
            self.disable(channel)
        }
    }

    pub fn status(&self, channel: usize) -> Result<ChannelStatus> {
        Ok(self.registry.get(channel)?.status())
    }

    /// Disable every channel and release every requested pin.
    pub fn remove(mut self) {
        self.registry.teardown();
    }
}
