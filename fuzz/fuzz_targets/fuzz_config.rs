//! Fuzz target: configuration decoding → chip construction
//!
//! Feeds arbitrary bytes through the JSON and postcard config decoders and,
//! when they parse, builds a chip from them.  Asserts that construction either fails
//! with a typed error or yields exactly one channel per binding, and that
//! teardown never panics.
//!
//! cargo fuzz run fuzz_config

#![no_main]

use std::sync::Arc;

use gpio_pwm::config::SystemConfig;
use gpio_pwm::{GpioPwmChip, Level, PinError, PinId, PinPort};
use libfuzzer_sys::fuzz_target;

struct NullPins;

impl PinPort for NullPins {
    fn bind(&self, _pin: PinId) -> Result<(), PinError> {
        Ok(())
    }
    fn release(&self, _pin: PinId) {}
    fn write(&self, _pin: PinId, _level: Level) {}
}

fuzz_target!(|data: &[u8]| {
    if let Ok(config) = SystemConfig::from_bytes(data) {
        let bytes = config.to_bytes().expect("valid config encodes");
        assert_eq!(SystemConfig::from_bytes(&bytes).ok(), Some(config));
    }

    let Ok(config) = SystemConfig::from_json(data) else {
        return;
    };

    if let Ok(chip) = GpioPwmChip::new(&config, Arc::new(NullPins)) {
        assert_eq!(chip.npwm(), config.topology.len());
        for ch in 0..chip.npwm() {
            assert!(chip.request(ch).is_ok());
        }
        assert!(chip.status(chip.npwm()).is_err());
        chip.remove();
    }
});
