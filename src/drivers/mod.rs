//! Pin adapters and task helpers.

pub mod gpio;
pub mod hal_pin;
pub mod task_pin;
