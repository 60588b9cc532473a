//! Software PWM engine.
//!
//! Each [`Channel`] owns a two-state machine:
//!
//! ```text
//!            start()                     stop()
//!   ┌──────┐ ──────────────▶ ┌─────────┐ ──────────────▶ ┌──────┐
//!   │ Idle │                 │ Running │                 │ Idle │
//!   └──────┘ ◀── no-op ───── └─────────┘ ◀── no-op ───── └──────┘
//!              start()            │  ▲       stop()
//!                                 ▼  │ timer fires: flip level,
//!                                 pin write, re-arm at target + delay
//! ```
//!
//! ## Locking
//!
//! - `guard` protects level, timing, the running flag and the arm epoch.
//!   Both the caller and the timer task take it; neither holds it across
//!   a pin write.
//! - `lifecycle` holds the armed timer and serialises start/stop/request/free.
//!   Lock order is always `lifecycle` → `guard`.  The timer task only ever
//!   takes `guard`, so `stop` can join it while holding `lifecycle`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::{DutyPolicy, TimerConfig};
use crate::error::{Error, Result};
use crate::ports::{Level, PinId, PinPort};
use crate::timer::{RecurringTimer, TimerAction};

// ═══════════════════════════════════════════════════════════════
//  Timing
// ═══════════════════════════════════════════════════════════════

/// Period and duty length of one channel, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Timing {
    /// Length of one high+low cycle.
    pub period_ns: u64,
    /// Portion of the period spent High.
    pub duty_ns: u64,
}

impl Timing {
    pub const fn new(period_ns: u64, duty_ns: u64) -> Self {
        Self { period_ns, duty_ns }
    }

    /// `duty_ns <= period_ns`.
    pub const fn is_valid(&self) -> bool {
        self.duty_ns <= self.period_ns
    }

    /// Same period with duty limited to the period.
    pub fn clamped(self) -> Self {
        Self {
            period_ns: self.period_ns,
            duty_ns: self.duty_ns.min(self.period_ns),
        }
    }

    /// Time spent High per cycle.
    pub fn high_ns(&self) -> u64 {
        self.duty_ns.min(self.period_ns)
    }

    /// Time spent Low per cycle.
    pub fn low_ns(&self) -> u64 {
        self.period_ns - self.high_ns()
    }
}

/// One toggle step: given the level currently on the pin, the level to
/// drive next and how long to hold it.
///
/// A zero-length phase is skipped, so 0 % duty holds Low and 100 % duty
/// holds High while still firing once per period.  A zero period holds
/// Low with a zero hold time; the channel then polls for a new timing at
/// [`TimerConfig::idle_poll_ns`].
pub fn next_phase(current: Level, timing: Timing) -> (Level, u64) {
    if timing.period_ns == 0 {
        return (Level::Low, 0);
    }
    let high = timing.high_ns();
    let low = timing.low_ns();
    match current.toggled() {
        Level::High if high > 0 => (Level::High, high),
        Level::High => (Level::Low, low),
        Level::Low if low > 0 => (Level::Low, low),
        Level::Low => (Level::High, high),
    }
}

// ═══════════════════════════════════════════════════════════════
//  Channel
// ═══════════════════════════════════════════════════════════════

/// Snapshot of a channel, for the framework layer and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStatus {
    pub index: usize,
    pub pin: PinId,
    pub level: Level,
    pub timing: Timing,
    pub running: bool,
    pub requested: bool,
    /// Timer fires since the channel was created.
    pub toggles: u64,
    /// Overrun resynchronisations of the currently armed timer.
    pub overruns: u64,
}

/// State shared between the caller and the timer task.
#[derive(Debug)]
struct ChannelState {
    level: Level,
    timing: Timing,
    running: bool,
    requested: bool,
    /// Bumped on every start; a timer task only acts for its own epoch.
    epoch: u64,
    toggles: u64,
}

/// One emulated PWM output bound to one pin.
pub struct Channel<P: PinPort> {
    index: usize,
    pin: PinId,
    pins: Arc<P>,
    guard: Arc<Mutex<ChannelState>>,
    lifecycle: Mutex<Option<RecurringTimer>>,
    timer_config: TimerConfig,
    duty_policy: DutyPolicy,
}

impl<P: PinPort + 'static> Channel<P> {
    pub fn new(
        index: usize,
        pin: PinId,
        pins: Arc<P>,
        timer_config: TimerConfig,
        duty_policy: DutyPolicy,
    ) -> Self {
        Self {
            index,
            pin,
            pins,
            guard: Arc::new(Mutex::new(ChannelState {
                level: Level::Low,
                timing: Timing::default(),
                running: false,
                requested: false,
                epoch: 0,
                toggles: 0,
            })),
            lifecycle: Mutex::new(None),
            timer_config,
            duty_policy,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn pin(&self) -> PinId {
        self.pin
    }

    // ── Pin ownership ─────────────────────────────────────────

    /// Bind the pin and drive it to `idle`.
    ///
    /// A channel that is already requested is released and bound again.
    /// On failure the channel is left unrequested and Idle.
    pub fn request(&self, idle: Level) -> Result<()> {
        let mut slot = lock(&self.lifecycle);
        self.disarm(&mut slot);

        if self.take_requested() {
            debug!("ch{}: re-request, releasing GPIO {} first", self.index, self.pin);
            self.pins.release(self.pin);
        }

        if let Err(e) = self.pins.bind(self.pin) {
            warn!("ch{}: unable to request GPIO {}: {}", self.index, self.pin, e);
            return Err(e.into());
        }
        self.pins.write(self.pin, idle);
        lock(&self.guard).requested = true;
        info!("ch{}: requested GPIO {} (idle {:?})", self.index, self.pin, idle);
        Ok(())
    }

    /// Stop the timer if armed, then release the pin.
    ///
    /// The pin is only released after the timer task has exited, so no
    /// write can reach it afterwards.
    pub fn free(&self) {
        let mut slot = lock(&self.lifecycle);
        self.disarm(&mut slot);
        if self.take_requested() {
            self.pins.release(self.pin);
            info!("ch{}: released GPIO {}", self.index, self.pin);
        }
    }

    pub fn is_requested(&self) -> bool {
        lock(&self.guard).requested
    }

    fn take_requested(&self) -> bool {
        core::mem::replace(&mut lock(&self.guard).requested, false)
    }

    // ── State machine ─────────────────────────────────────────

    /// Idle → Running.  No-op if already running.
    ///
    /// The first fire is `duty_ns` from now; from there the timer callback
    /// alone decides each next level and delay.  Fails with
    /// [`Error::NotRequested`] unless the pin is currently bound; the check
    /// is made under the lifecycle lock, so a concurrent `free` either
    /// completes first or waits for the timer to be armed and then cancels it.
    pub fn start(&self) -> Result<()> {
        let mut slot = lock(&self.lifecycle);
        let mut st = lock(&self.guard);
        if !st.requested {
            return Err(Error::NotRequested);
        }
        if st.running {
            debug!("ch{}: already running", self.index);
            return Ok(());
        }

        st.epoch = st.epoch.wrapping_add(1);
        st.level = Level::Low;
        let first = Duration::from_nanos(st.timing.duty_ns);

        let mut toggler = Toggler {
            guard: Arc::clone(&self.guard),
            pins: Arc::clone(&self.pins),
            pin: self.pin,
            epoch: st.epoch,
            idle_poll: self.timer_config.idle_poll(),
        };
        let timer = RecurringTimer::arm_after(first, &self.timer_config, move || toggler.fire())
            .map_err(|e| {
                warn!("ch{}: timer arm failed: {}", self.index, e);
                Error::TimerSpawnFailed
            })?;

        st.running = true;
        *slot = Some(timer);
        debug!(
            "ch{}: armed, first fire in {}ns (period {}ns)",
            self.index, st.timing.duty_ns, st.timing.period_ns
        );
        Ok(())
    }

    /// Running → Idle.  No-op if already idle.
    ///
    /// Blocks until any in-flight timer callback has finished, including
    /// its pin write.
    pub fn stop(&self) {
        let mut slot = lock(&self.lifecycle);
        self.disarm(&mut slot);
    }

    /// Overwrite period and duty.  Never re-arms or cancels the timer: a
    /// running channel picks the new timing up at its next fire.
    ///
    /// Returns the timing actually stored after the duty policy applied.
    pub fn configure(&self, timing: Timing) -> Result<Timing> {
        let effective = if timing.is_valid() {
            timing
        } else {
            match self.duty_policy {
                DutyPolicy::Clamp => {
                    warn!(
                        "ch{}: duty {}ns > period {}ns, clamping",
                        self.index, timing.duty_ns, timing.period_ns
                    );
                    timing.clamped()
                }
                DutyPolicy::Reject => {
                    return Err(Error::InvalidTiming {
                        period_ns: timing.period_ns,
                        duty_ns: timing.duty_ns,
                    });
                }
            }
        };

        lock(&self.guard).timing = effective;
        debug!(
            "ch{}: configured period={}ns duty={}ns",
            self.index, effective.period_ns, effective.duty_ns
        );
        Ok(effective)
    }

    /// Store `timing` as-is, bypassing the duty policy.  Used to roll back
    /// to a timing that was previously accepted by [`configure`](Self::configure).
    pub fn restore_timing(&self, timing: Timing) {
        lock(&self.guard).timing = timing;
    }

    pub fn timing(&self) -> Timing {
        lock(&self.guard).timing
    }

    pub fn is_running(&self) -> bool {
        lock(&self.guard).running
    }

    pub fn status(&self) -> ChannelStatus {
        let overruns = lock(&self.lifecycle)
            .as_ref()
            .map_or(0, RecurringTimer::overruns);
        let st = lock(&self.guard);
        ChannelStatus {
            index: self.index,
            pin: self.pin,
            level: st.level,
            timing: st.timing,
            running: st.running,
            requested: st.requested,
            toggles: st.toggles,
            overruns,
        }
    }

    /// Clear the running flag under the guard, then cancel outside it so
    /// the timer task can finish a callback blocked on the guard.
    fn disarm(&self, slot: &mut MutexGuard<'_, Option<RecurringTimer>>) {
        {
            let mut st = lock(&self.guard);
            if !st.running {
                return;
            }
            st.running = false;
        }
        if let Some(timer) = slot.take() {
            timer.cancel();
        }
        debug!("ch{}: disarmed", self.index);
    }
}

// ═══════════════════════════════════════════════════════════════
//  Timer callback
// ═══════════════════════════════════════════════════════════════

/// Everything the timer task needs to toggle one channel.
struct Toggler<P: PinPort> {
    guard: Arc<Mutex<ChannelState>>,
    pins: Arc<P>,
    pin: PinId,
    epoch: u64,
    /// Re-check interval while the period is zero.
    idle_poll: Duration,
}

impl<P: PinPort> Toggler<P> {
    /// Flip the level under the guard, write the pin outside it, and ask
    /// for the next fire.  Exits if the channel was stopped or re-armed.
    fn fire(&mut self) -> TimerAction {
        let (level, hold_ns) = {
            let mut st = lock(&self.guard);
            if !st.running || st.epoch != self.epoch {
                return TimerAction::Stop;
            }
            let (level, hold_ns) = next_phase(st.level, st.timing);
            st.level = level;
            st.toggles = st.toggles.wrapping_add(1);
            (level, hold_ns)
        };

        self.pins.write(self.pin, level);
        if hold_ns == 0 {
            return TimerAction::Reschedule(self.idle_poll);
        }
        TimerAction::Reschedule(Duration::from_nanos(hold_ns))
    }
}

/// Lock, recovering from poisoning: a panicking pin adapter must not
/// wedge the channel.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
