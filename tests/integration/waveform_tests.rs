//! Waveform tests: the pin history produced by a running channel.
//!
//! Timing assertions use averages over many cycles with tolerances of a
//! few milliseconds, well above host scheduling jitter.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::mock_pin::RecordingPins;

use gpio_pwm::config::{SystemConfig, Topology};
use gpio_pwm::{GpioPwmChip, Level, Timing};

const MS: u64 = 1_000_000;

fn make_chip(pins: &[i32]) -> (GpioPwmChip<RecordingPins>, Arc<RecordingPins>) {
    let rec = Arc::new(RecordingPins::new());
    let config = SystemConfig {
        topology: Topology::from_pins(pins).unwrap(),
        ..SystemConfig::default()
    };
    (GpioPwmChip::new(&config, Arc::clone(&rec)).unwrap(), rec)
}

fn assert_near(actual: Duration, expected_ms: u64, tol_ms: u64, what: &str) {
    let expected = Duration::from_millis(expected_ms);
    let tol = Duration::from_millis(tol_ms);
    assert!(
        actual + tol >= expected && actual <= expected + tol,
        "{what}: {actual:?} not within {tol_ms}ms of {expected_ms}ms"
    );
}

// ── 20 ms period, 25 % duty on GPIO 17 ───────────────────────

#[test]
fn quarter_duty_waveform_until_disabled() {
    let (chip, rec) = make_chip(&[17]);
    chip.configure(0, 20 * MS, 5 * MS).unwrap();
    chip.request(0).unwrap();
    chip.enable(0).unwrap();

    thread::sleep(Duration::from_millis(250));
    chip.disable(0).unwrap();

    let high = rec.mean_hold(17, Level::High).expect("no high phases");
    let low = rec.mean_hold(17, Level::Low).expect("no low phases");
    assert_near(high, 5, 3, "high phase");
    assert_near(low, 15, 3, "low phase");

    // Levels strictly alternate once toggling starts.
    let tr = rec.transitions(17);
    assert!(tr.len() >= 10, "only {} transitions", tr.len());
    for w in tr.windows(2) {
        assert_ne!(w[0].1, w[1].1);
    }

    let n = rec.write_count(17);
    thread::sleep(Duration::from_millis(60));
    assert_eq!(rec.write_count(17), n, "pin toggled after disable");
}

#[test]
fn first_toggle_follows_duty_and_goes_high() {
    let rec = Arc::new(RecordingPins::new());
    let config = SystemConfig {
        topology: Topology::from_pins(&[5]).unwrap(),
        idle_level: Level::Low,
        ..SystemConfig::default()
    };
    let chip = GpioPwmChip::new(&config, Arc::clone(&rec)).unwrap();
    chip.request(0).unwrap();
    chip.enable_with(0, Timing::new(40 * MS, 10 * MS)).unwrap();
    thread::sleep(Duration::from_millis(30));
    chip.disable(0).unwrap();

    let writes = rec.writes(5);
    assert_eq!(writes[0].1, Level::Low, "idle level first");
    assert_eq!(writes[1].1, Level::High, "first toggle drives High");
    assert_near(writes[1].0 - writes[0].0, 10, 5, "first fire");
}

// ── No cumulative drift ──────────────────────────────────────

#[test]
fn rising_edges_do_not_drift() {
    let (chip, rec) = make_chip(&[17]);
    chip.request(0).unwrap();
    chip.enable_with(0, Timing::new(10 * MS, 3 * MS)).unwrap();
    thread::sleep(Duration::from_millis(420));
    chip.disable(0).unwrap();

    // Skip the idle write; it is not a toggle.
    let edges: Vec<_> = rec.rising_edges(17).into_iter().skip(1).collect();
    assert!(edges.len() >= 30, "only {} rising edges", edges.len());

    let n = edges.len() - 1;
    let span = edges[n] - edges[0];
    assert_near(span, 10 * n as u64, 5, "span of rising edges");
}

// ── Degenerate timings ───────────────────────────────────────

#[test]
fn duty_above_period_is_clamped_to_constant_high() {
    let (chip, rec) = make_chip(&[17]);
    let stored = chip.configure(0, 5 * MS, 9 * MS).unwrap();
    assert_eq!(stored, Timing::new(5 * MS, 5 * MS));

    chip.request(0).unwrap();
    chip.enable(0).unwrap();
    thread::sleep(Duration::from_millis(60));
    chip.disable(0).unwrap();

    let writes = rec.writes(17);
    assert!(writes.len() >= 5, "timer stopped firing");
    assert!(writes.iter().all(|&(_, l)| l == Level::High));
}

#[test]
fn zero_duty_holds_low_and_keeps_firing_per_period() {
    let (chip, rec) = make_chip(&[17]);
    chip.request(0).unwrap();
    chip.enable_with(0, Timing::new(5 * MS, 0)).unwrap();
    thread::sleep(Duration::from_millis(60));
    chip.disable(0).unwrap();

    let toggles: Vec<_> = rec.writes(17).into_iter().skip(1).collect();
    assert!(toggles.len() >= 5, "timer stopped firing");
    assert!(toggles.len() <= 20, "timer spinning: {} fires", toggles.len());
    assert!(toggles.iter().all(|&(_, l)| l == Level::Low));
}

#[test]
fn zero_period_does_not_spin() {
    let (chip, rec) = make_chip(&[17]);
    chip.request(0).unwrap();
    chip.enable_with(0, Timing::new(0, 0)).unwrap();
    thread::sleep(Duration::from_millis(100));
    chip.disable(0).unwrap();

    // Polled every 10 ms while the period is zero.
    let writes = rec.writes(17);
    assert!(writes.iter().skip(1).all(|&(_, l)| l == Level::Low));
    let toggles = chip.status(0).unwrap().toggles;
    assert!(toggles > 0);
    assert!(toggles <= 20, "timer spinning: {toggles} fires in 100ms");
}

#[test]
fn unconfigured_enable_idles_then_follows_configure() {
    let (chip, rec) = make_chip(&[17]);
    chip.request(0).unwrap();
    chip.enable(0).unwrap();
    thread::sleep(Duration::from_millis(100));
    assert!(chip.status(0).unwrap().toggles <= 20);

    chip.configure(0, 10 * MS, 5 * MS).unwrap();
    thread::sleep(Duration::from_millis(100));
    chip.disable(0).unwrap();
    assert!(!rec.rising_edges(17).is_empty());
    assert!(rec.transitions(17).len() >= 5, "never picked up the new timing");
}

// ── Reconfigure while running ────────────────────────────────

#[test]
fn reconfigure_while_running_changes_subsequent_cycles() {
    let (chip, rec) = make_chip(&[17]);
    chip.request(0).unwrap();
    chip.enable_with(0, Timing::new(10 * MS, 2 * MS)).unwrap();
    thread::sleep(Duration::from_millis(100));

    chip.configure(0, 30 * MS, 20 * MS).unwrap();
    assert!(chip.status(0).unwrap().running, "configure must not stop");
    let split = rec.transitions(17).len();
    thread::sleep(Duration::from_millis(300));
    chip.disable(0).unwrap();

    // Skip a couple of transitions around the switch-over.
    let tr = rec.transitions(17);
    let after = &tr[split + 2..];
    let highs: Vec<Duration> = after
        .windows(2)
        .filter(|w| w[0].1 == Level::High)
        .map(|w| w[1].0 - w[0].0)
        .collect();
    assert!(!highs.is_empty());
    let mean = highs.iter().sum::<Duration>() / highs.len() as u32;
    assert_near(mean, 20, 3, "high phase after reconfigure");
}

// ── Cross-channel independence ───────────────────────────────

#[test]
fn channels_toggle_independently() {
    let (chip, rec) = make_chip(&[17, 18]);
    chip.request(0).unwrap();
    chip.request(1).unwrap();
    chip.enable_with(0, Timing::new(10 * MS, 5 * MS)).unwrap();
    chip.enable_with(1, Timing::new(20 * MS, 5 * MS)).unwrap();
    thread::sleep(Duration::from_millis(100));

    chip.free(1).unwrap();
    let ch0_before = rec.write_count(17);
    thread::sleep(Duration::from_millis(100));
    chip.disable(0).unwrap();

    assert!(rec.write_count(17) >= ch0_before + 10, "ch0 stalled by ch1 free");
    assert!(!chip.status(1).unwrap().running);
    assert!(!chip.status(1).unwrap().requested);
}
