//! gpio-pwm firmware — demo entry point.
//!
//! Brings up the software PWM chip on the board's default topology and
//! drives channel 0 at 50 Hz / 25 % duty, logging channel status once a
//! second.
//!
//! ```text
//!   GpioBank (ESP-IDF GPIO) ──▶ GpioPwmChip ──▶ ch0 @ GPIO 17
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::info;

use gpio_pwm::config::SystemConfig;
use gpio_pwm::drivers::gpio::GpioBank;
use gpio_pwm::{GpioPwmChip, Timing};

/// 20 ms period, 5 ms high.
const DEMO_TIMING: Timing = Timing::new(20_000_000, 5_000_000);

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("gpio-pwm v{}", env!("CARGO_PKG_VERSION"));

    // ── 2. Chip from the static topology ──────────────────────
    // A board JSON can be baked in at build time with GPIO_PWM_CONFIG.
    let config = match option_env!("GPIO_PWM_CONFIG") {
        Some(json) => SystemConfig::from_json(json.as_bytes()).context("board config")?,
        None => SystemConfig::default(),
    };
    let chip = GpioPwmChip::new(&config, Arc::new(GpioBank::new())).context("chip init")?;

    // ── 3. Channel 0 ──────────────────────────────────────────
    chip.request(0).context("request ch0")?;
    chip.enable_with(0, DEMO_TIMING).context("enable ch0")?;

    // ── 4. Status loop ────────────────────────────────────────
    loop {
        std::thread::sleep(Duration::from_secs(1));
        let s = chip.status(0)?;
        info!(
            "STATUS | ch{} gpio={} running={} toggles={} overruns={}",
            s.index, s.pin, s.running, s.toggles, s.overruns
        );
    }
}
