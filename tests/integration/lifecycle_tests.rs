//! Request/free/enable/disable ordering and teardown.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::mock_pin::{PinCall, RecordingPins};

use gpio_pwm::config::{SystemConfig, Topology};
use gpio_pwm::drivers::gpio::GpioBank;
use gpio_pwm::{Error, GpioPwmChip, Level, PinError, PwmState, Timing};

const FAST: Timing = Timing::new(2_000_000, 1_000_000);

fn make_chip(pins: &[i32]) -> (GpioPwmChip<RecordingPins>, Arc<RecordingPins>) {
    let rec = Arc::new(RecordingPins::new());
    let config = SystemConfig {
        topology: Topology::from_pins(pins).unwrap(),
        ..SystemConfig::default()
    };
    (GpioPwmChip::new(&config, Arc::clone(&rec)).unwrap(), rec)
}

// ── Startup topology ─────────────────────────────────────────

#[test]
fn absent_binding_aborts_startup() {
    let mut config = SystemConfig::default();
    config.topology.bindings[2] = None;
    let r = GpioPwmChip::new(&config, Arc::new(RecordingPins::new()));
    assert!(matches!(r, Err(Error::InvalidTopology(_))));
}

#[test]
fn default_topology_exposes_all_channels() {
    let chip = GpioPwmChip::new(&SystemConfig::default(), Arc::new(RecordingPins::new())).unwrap();
    assert_eq!(chip.npwm(), gpio_pwm::pins::DEFAULT_PWM_GPIOS.len());
    assert_eq!(chip.status(0).unwrap().pin, gpio_pwm::pins::PWM0_GPIO);
}

// ── Idempotent disable ───────────────────────────────────────

#[test]
fn disable_twice_is_safe() {
    let (chip, rec) = make_chip(&[17]);
    chip.request(0).unwrap();
    chip.enable_with(0, FAST).unwrap();
    thread::sleep(Duration::from_millis(20));

    chip.disable(0).unwrap();
    let n = rec.write_count(17);
    chip.disable(0).unwrap();
    assert!(!chip.status(0).unwrap().running);

    thread::sleep(Duration::from_millis(20));
    assert_eq!(rec.write_count(17), n, "fired after first disable");
}

#[test]
fn disable_on_never_enabled_channel_is_noop() {
    let (chip, rec) = make_chip(&[17]);
    chip.disable(0).unwrap();
    assert!(rec.calls().is_empty());
}

// ── Free while running ───────────────────────────────────────

#[test]
fn free_while_running_cancels_before_release() {
    let (chip, rec) = make_chip(&[17]);
    chip.request(0).unwrap();
    chip.enable_with(0, FAST).unwrap();
    thread::sleep(Duration::from_millis(20));

    chip.free(0).unwrap();
    let status = chip.status(0).unwrap();
    assert!(!status.running);
    assert!(!status.requested);

    let calls = rec.calls();
    let release = calls
        .iter()
        .position(|c| *c == PinCall::Release(17))
        .expect("pin never released");
    assert!(
        calls[release + 1..].iter().all(|c| !matches!(c, PinCall::Write(17, _))),
        "write after release"
    );

    thread::sleep(Duration::from_millis(20));
    assert_eq!(rec.calls().len(), calls.len(), "activity after free");
}

#[test]
fn free_unrequested_channel_does_not_release() {
    let (chip, rec) = make_chip(&[17]);
    chip.free(0).unwrap();
    assert!(rec.calls().is_empty());
}

// ── Request ──────────────────────────────────────────────────

#[test]
fn request_binds_then_writes_idle_high() {
    let (chip, rec) = make_chip(&[17]);
    chip.request(0).unwrap();
    assert_eq!(
        rec.calls(),
        vec![PinCall::Bind(17), PinCall::Write(17, Level::High)]
    );
}

#[test]
fn re_request_releases_then_binds_again() {
    let (chip, rec) = make_chip(&[17]);
    chip.request(0).unwrap();
    chip.request(0).unwrap();
    assert_eq!(
        rec.calls()[2..],
        [
            PinCall::Release(17),
            PinCall::Bind(17),
            PinCall::Write(17, Level::High)
        ]
    );
}

#[test]
fn failed_request_leaves_channel_unusable_until_retry() {
    let (chip, rec) = make_chip(&[17]);
    rec.refuse(17, PinError::Unavailable);
    assert_eq!(chip.request(0), Err(Error::Pin(PinError::Unavailable)));
    assert_eq!(chip.enable_with(0, FAST), Err(Error::NotRequested));
    assert!(!chip.status(0).unwrap().running);

    rec.accept(17);
    chip.request(0).unwrap();
    chip.enable_with(0, FAST).unwrap();
    assert!(chip.status(0).unwrap().running);
    chip.disable(0).unwrap();
}

#[test]
fn busy_pin_reported_as_busy() {
    let (chip, rec) = make_chip(&[17]);
    rec.refuse(17, PinError::Busy);
    assert_eq!(chip.request(0), Err(Error::Pin(PinError::Busy)));
}

// ── Enable ───────────────────────────────────────────────────

#[test]
fn enable_while_running_does_not_restart() {
    let (chip, _rec) = make_chip(&[17]);
    chip.request(0).unwrap();
    chip.enable_with(0, FAST).unwrap();
    thread::sleep(Duration::from_millis(20));
    let before = chip.status(0).unwrap().toggles;

    chip.enable(0).unwrap();
    thread::sleep(Duration::from_millis(20));
    let status = chip.status(0).unwrap();
    assert!(status.running);
    assert!(status.toggles > before);
    chip.disable(0).unwrap();
}

#[test]
fn apply_toggles_enabled_state() {
    let (chip, _rec) = make_chip(&[17]);
    chip.request(0).unwrap();
    chip.apply(0, PwmState { timing: FAST, enabled: true }).unwrap();
    assert!(chip.status(0).unwrap().running);
    chip.apply(0, PwmState { timing: FAST, enabled: false }).unwrap();
    assert!(!chip.status(0).unwrap().running);
}

#[test]
fn out_of_range_channel_rejected_everywhere() {
    let (chip, rec) = make_chip(&[17]);
    let oor = Err(Error::OutOfRange { index: 1, count: 1 });
    assert_eq!(chip.request(1), oor);
    assert_eq!(chip.enable(1), oor);
    assert_eq!(chip.disable(1), oor);
    assert_eq!(chip.free(1), oor);
    assert!(chip.configure(1, 10, 5).is_err());
    assert!(rec.calls().is_empty());
}

// ── Teardown ─────────────────────────────────────────────────

#[test]
fn remove_stops_all_and_releases_requested() {
    let (chip, rec) = make_chip(&[17, 18, 21]);
    chip.request(0).unwrap();
    chip.request(1).unwrap();
    chip.enable_with(0, FAST).unwrap();
    chip.enable_with(1, FAST).unwrap();
    thread::sleep(Duration::from_millis(10));

    chip.remove();
    let calls = rec.calls();
    assert!(calls.contains(&PinCall::Release(17)));
    assert!(calls.contains(&PinCall::Release(18)));
    assert!(!calls.contains(&PinCall::Release(21)), "never requested");

    thread::sleep(Duration::from_millis(20));
    assert_eq!(rec.calls().len(), calls.len(), "activity after remove");
}

#[test]
fn dropping_chip_tears_down() {
    let (chip, rec) = make_chip(&[17]);
    chip.request(0).unwrap();
    chip.enable_with(0, FAST).unwrap();
    drop(chip);
    assert_eq!(rec.calls().last(), Some(&PinCall::Release(17)));
}

// ── Simulated GPIO bank ──────────────────────────────────────

#[test]
fn gpio_bank_end_to_end() {
    let bank = Arc::new(GpioBank::new());
    let config = SystemConfig {
        topology: Topology::from_pins(&[17, 18]).unwrap(),
        ..SystemConfig::default()
    };
    let chip = GpioPwmChip::new(&config, Arc::clone(&bank)).unwrap();

    chip.request(0).unwrap();
    assert!(bank.is_claimed(17));
    assert_eq!(bank.level(17), Some(Level::High));

    chip.enable_with(0, FAST).unwrap();
    thread::sleep(Duration::from_millis(10));
    chip.free(0).unwrap();
    assert!(!bank.is_claimed(17));
}
