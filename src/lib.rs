//! Software PWM on GPIO outputs.
//!
//! Emulates a multi-channel PWM controller on hardware without PWM
//! peripherals: each channel toggles one GPIO from a self-rescheduling
//! timer task.  All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module, so the crate builds
//! and tests on the host.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │   PWM framework (request/free/enable/disable/configure)   │
//! └─────────────────────────────┬─────────────────────────────┘
//!                               ▼
//!                     chip::GpioPwmChip  (facade)
//!                               ▼
//!                     registry::Registry (channel table)
//!                               ▼
//!   engine::Channel ──guard── timer::RecurringTimer (one task each)
//!                               ▼
//!                     ports::PinPort  ◀── drivers::{gpio, hal_pin}
//! ```

#![deny(unused_must_use)]

pub mod chip;
pub mod config;
pub mod drivers;
pub mod engine;
pub mod error;
pub mod pins;
pub mod ports;
pub mod registry;
pub mod timer;

pub use chip::{GpioPwmChip, PwmState};
pub use engine::{ChannelStatus, Timing};
pub use error::{Error, PinError, Result};
pub use ports::{Level, PinId, PinPort};
