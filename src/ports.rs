//! Port traits — the boundary between the PWM core and the platform.
//!
//! ```text
//!   GpioBank / HalPins ──▶ PinPort ──▶ Channel (engine)
//! ```
//!
//! The engine never touches GPIO registers directly.  Pin adapters in
//! [`drivers`](crate::drivers) implement [`PinPort`]; tests substitute a
//! recording mock.

use serde::{Deserialize, Serialize};

use crate::error::PinError;

/// Platform GPIO number.  Negative values never name a real pin.
pub type PinId = i32;

/// Logic level of a digital output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    Low,
    High,
}

impl Level {
    /// The opposite level.
    pub const fn toggled(self) -> Self {
        match self {
            Self::Low => Self::High,
            Self::High => Self::Low,
        }
    }

    pub const fn is_high(self) -> bool {
        matches!(self, Self::High)
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Self::High } else { Self::Low }
    }
}

// ───────────────────────────────────────────────────────────────
// Pin port (driven adapter: engine → GPIO)
// ───────────────────────────────────────────────────────────────

/// GPIO control consumed by the PWM core.
///
/// Methods take `&self` because `write` is called from each channel's
/// timer task while `bind`/`release` are called from the caller's
/// context.  Implementations provide their own interior locking.
pub trait PinPort: Send + Sync {
    /// Claim `pin` and configure it as an output.
    fn bind(&self, pin: PinId) -> Result<(), PinError>;

    /// Return `pin` to the platform.  Releasing an unbound pin is a no-op.
    fn release(&self, pin: PinId);

    /// Drive `pin` to `level`.
    ///
    /// Infallible at this layer: a platform write failure is logged by the
    /// adapter and swallowed, since the timer task has no caller to report to.
    fn write(&self, pin: PinId, level: Level);
}
