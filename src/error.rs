//! Unified error types for the software PWM driver.
//!
//! A single `Error` enum that every layer converts into, so the framework
//! glue above the chip sees one uniform failure type.  All variants are
//! `Copy` so they can be returned from under a channel guard without
//! allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level driver error
// ---------------------------------------------------------------------------

/// Every fallible operation in the driver funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The static channel topology is malformed.  Fatal at startup.
    InvalidTopology(&'static str),
    /// A channel index does not name a channel in the registry.
    OutOfRange { index: usize, count: usize },
    /// The underlying pin could not be bound.
    Pin(PinError),
    /// `enable` was called on a channel whose pin has not been requested.
    NotRequested,
    /// Duty length exceeds the period and the duty policy rejects it.
    InvalidTiming { period_ns: u64, duty_ns: u64 },
    /// The host refused to create the timer task for a channel.
    TimerSpawnFailed,
    /// Configuration is invalid.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTopology(msg) => write!(f, "invalid topology: {msg}"),
            Self::OutOfRange { index, count } => {
                write!(f, "channel {index} out of range (have {count})")
            }
            Self::Pin(e) => write!(f, "pin: {e}"),
            Self::NotRequested => write!(f, "channel not requested"),
            Self::InvalidTiming { period_ns, duty_ns } => {
                write!(f, "duty {duty_ns}ns exceeds period {period_ns}ns")
            }
            Self::TimerSpawnFailed => write!(f, "timer task could not be created"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Pin binding errors
// ---------------------------------------------------------------------------

/// Failures reported by a [`PinPort`](crate::ports::PinPort) when binding a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinError {
    /// The pin is already claimed by another owner.
    Busy,
    /// The pin does not exist or cannot drive an output.
    Unavailable,
}

impl fmt::Display for PinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "resource busy"),
            Self::Unavailable => write!(f, "resource unavailable"),
        }
    }
}

impl From<PinError> for Error {
    fn from(e: PinError) -> Self {
        Self::Pin(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Driver-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
