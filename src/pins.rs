//! GPIO pin assignments for the software PWM outputs.
//!
//! Single source of truth for the default topology — the board config and
//! the demo binary reference this module rather than hard-coding pin numbers.

use crate::ports::PinId;

// ---------------------------------------------------------------------------
// PWM output channels (channel index = position in the table)
// ---------------------------------------------------------------------------

/// Channel 0: primary PWM output.
pub const PWM0_GPIO: PinId = 17;
/// Channel 1.
pub const PWM1_GPIO: PinId = 18;
/// Channel 2.
pub const PWM2_GPIO: PinId = 21;
/// Channel 3.
pub const PWM3_GPIO: PinId = 38;

/// Default channel table, in channel order.
pub const DEFAULT_PWM_GPIOS: [PinId; 4] = [PWM0_GPIO, PWM1_GPIO, PWM2_GPIO, PWM3_GPIO];

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Maximum number of channels a single chip can emulate.
pub const MAX_CHANNELS: usize = 16;
