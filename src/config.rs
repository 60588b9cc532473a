//! System configuration parameters
//!
//! Static channel topology plus the tunables of the software PWM engine.
//! Reconstructed at every startup; nothing here is persisted by the driver.

use core::time::Duration;

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pins::{DEFAULT_PWM_GPIOS, MAX_CHANNELS};
use crate::ports::{Level, PinId};
use crate::drivers::task_pin::Core;

/// Largest accepted timer task stack.
pub const MAX_STACK_KB: usize = 64;

/// Largest encoded configuration accepted by [`SystemConfig::from_bytes`].
pub const MAX_CONFIG_BYTES: usize = 512;

/// Ordered `channel index → pin` bindings.
///
/// `None` marks a binding the hardware description could not resolve;
/// [`Registry::create`](crate::registry::Registry::create) rejects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub bindings: Vec<Option<PinId>, MAX_CHANNELS>,
}

impl Topology {
    /// Topology with every pin present.
    pub fn from_pins(pins: &[PinId]) -> Result<Self> {
        let mut bindings = Vec::new();
        for &pin in pins {
            bindings
                .push(Some(pin))
                .map_err(|_| Error::InvalidTopology("too many channels"))?;
        }
        Ok(Self { bindings })
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            bindings: DEFAULT_PWM_GPIOS.iter().copied().map(Some).collect(),
        }
    }
}

/// What `configure` does when `duty_ns > period_ns`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DutyPolicy {
    /// Clamp duty to the period (100 % duty) and log a warning.
    #[default]
    Clamp,
    /// Fail with [`Error::InvalidTiming`] and keep the previous timing.
    Reject,
}

/// Recurring timer tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Floor applied to every scheduled delay (timer resolution).
    /// Keeps zero-length phases from spinning the CPU.
    pub min_interval_ns: u64,
    /// If the timer falls this far behind its target, re-anchor to now
    /// instead of bursting catch-up toggles.
    pub resync_after_ns: u64,
    /// Re-check interval while a channel runs with a zero period.
    #[serde(default = "default_idle_poll_ns")]
    pub idle_poll_ns: u64,
    /// Timer task stack size (KiB), at most [`MAX_STACK_KB`].
    pub stack_kb: usize,
    /// Timer task priority (FreeRTOS priority on ESP-IDF; ignored on host).
    pub priority: u8,
    /// Core the timer tasks are pinned to (ignored on host).
    pub core: Core,
}

impl TimerConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_nanos(self.min_interval_ns)
    }

    pub fn resync_after(&self) -> Duration {
        Duration::from_nanos(self.resync_after_ns)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_nanos(self.idle_poll_ns)
    }
}

fn default_idle_poll_ns() -> u64 {
    10_000_000
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            min_interval_ns: 1_000,       // 1 µs
            resync_after_ns: 50_000_000,  // 50 ms
            idle_poll_ns: default_idle_poll_ns(),
            stack_kb: 4,
            priority: 10,
            core: Core::App,
        }
    }
}

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Channel table.
    pub topology: Topology,
    /// Level driven onto a pin when it is requested, before any toggling.
    pub idle_level: Level,
    /// Handling of `duty_ns > period_ns`.
    pub duty_policy: DutyPolicy,
    /// Timer task tuning.
    pub timer: TimerConfig,
}

impl SystemConfig {
    /// Range-check the tunables.  Topology is checked by the registry.
    pub fn validate(&self) -> Result<()> {
        if self.timer.min_interval_ns == 0 {
            return Err(Error::Config("timer.min_interval_ns must be non-zero"));
        }
        if self.timer.resync_after_ns < self.timer.min_interval_ns {
            return Err(Error::Config(
                "timer.resync_after_ns must be at least min_interval_ns",
            ));
        }
        if self.timer.idle_poll_ns < self.timer.min_interval_ns {
            return Err(Error::Config(
                "timer.idle_poll_ns must be at least min_interval_ns",
            ));
        }
        if self.timer.stack_kb == 0 {
            return Err(Error::Config("timer.stack_kb must be non-zero"));
        }
        if self.timer.stack_kb > MAX_STACK_KB {
            return Err(Error::Config("timer.stack_kb exceeds MAX_STACK_KB"));
        }
        Ok(())
    }

    /// Parse and validate a JSON board description.
    pub fn from_json(json: &[u8]) -> Result<Self> {
        let config: Self =
            serde_json::from_slice(json).map_err(|_| Error::Config("malformed JSON"))?;
        config.validate()?;
        Ok(config)
    }

    /// Compact postcard encoding, for storing the configuration in flash.
    pub fn to_bytes(&self) -> Result<std::vec::Vec<u8>> {
        postcard::to_allocvec(self).map_err(|_| Error::Config("encoding failed"))
    }

    /// Decode and validate a configuration written by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_CONFIG_BYTES {
            return Err(Error::Config("config blob too large"));
        }
        let config: Self =
            postcard::from_bytes(bytes).map_err(|_| Error::Config("corrupted config"))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            topology: Topology::default(),
            idle_level: Level::High,
            duty_policy: DutyPolicy::Clamp,
            timer: TimerConfig::default(),
        }
    }
}
