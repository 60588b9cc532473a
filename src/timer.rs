//! Recurring timer that drives each channel's toggles.
//!
//! An armed [`RecurringTimer`] owns one task (spawned through
//! [`task_pin`](crate::drivers::task_pin)) that sleeps until an absolute
//! target instant, runs its callback, and re-arms itself for
//! `previous_target + delay`, where `delay` is whatever the callback
//! returned.  Targets are never derived from "now", so callback latency
//! does not accumulate from one period to the next.
//!
//! The sleep itself is platform specific:
//!
//! - ESP-IDF: a one-shot `esp_timer` (1 µs resolution) armed for each
//!   target unparks the task.  FreeRTOS timeouts are tick based (10 ms at
//!   the default `CONFIG_FREERTOS_HZ`), so the task never waits on one.
//! - Host: a `Condvar` timed wait.
//!
//! Cancellation is synchronous: [`RecurringTimer::cancel`] returns only
//! after the task has exited, so no callback can run after it returns.
//!
//! ```text
//!   arm_after(d0) ──▶ [alarm → callback → target += delay] ──▶ ... ──▶ cancel()
//!                                                                       (joins)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::warn;

use crate::config::TimerConfig;
use crate::drivers::task_pin::spawn_on_core;

const TASK_NAME: &str = "pwm-timer\0";

/// What the timer does after a callback returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// Fire again `delay` after the previous target.
    Reschedule(Duration),
    /// Let the task exit.
    Stop,
}

struct Shared {
    cancelled: Mutex<bool>,
    wake: Condvar,
    overruns: AtomicU64,
}

impl Shared {
    #[cfg(target_os = "espidf")]
    fn is_cancelled(&self) -> bool {
        *self.cancelled.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cancellable, self-rescheduling delayed invocation.
///
/// Dropping the handle cancels the timer the same way [`cancel`](Self::cancel)
/// does.
pub struct RecurringTimer {
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
}

impl RecurringTimer {
    /// Arm a timer whose first fire is `first` from now.
    ///
    /// Every delay (including `first`) is floored to
    /// [`TimerConfig::min_interval_ns`] so a zero-length phase cannot spin.
    /// Fails if the task cannot be spawned or its alarm cannot be created.
    pub fn arm_after<F>(first: Duration, config: &TimerConfig, callback: F) -> std::io::Result<Self>
    where
        F: FnMut() -> TimerAction + Send + 'static,
    {
        let shared = Arc::new(Shared {
            cancelled: Mutex::new(false),
            wake: Condvar::new(),
            overruns: AtomicU64::new(0),
        });

        let task_shared = Arc::clone(&shared);
        let min_interval = config.min_interval();
        let resync_after = config.resync_after();
        let first_target = Instant::now().checked_add(first.max(min_interval));
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        let task = spawn_on_core(
            config.core,
            config.priority,
            config.stack_kb,
            TASK_NAME,
            move || {
                let alarm = match Alarm::new() {
                    Ok(alarm) => {
                        let _ = ready_tx.send(Ok(()));
                        alarm
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                run(&task_shared, alarm, first_target, min_interval, resync_after, callback);
            },
        )?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = task.join();
                return Err(e);
            }
            Err(_) => {
                let _ = task.join();
                return Err(std::io::Error::other("timer task exited during start"));
            }
        }

        Ok(Self {
            shared,
            task: Some(task),
        })
    }

    /// Stop the timer, blocking until any in-flight callback has returned.
    pub fn cancel(mut self) {
        self.shutdown();
    }

    /// Number of times the task fell more than `resync_after_ns` behind
    /// and re-anchored to the current time.
    pub fn overruns(&self) -> u64 {
        self.shared.overruns.load(Ordering::Relaxed)
    }

    /// Whether the task has exited (cancelled or callback returned `Stop`).
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    fn shutdown(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        *self
            .shared
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = true;
        self.shared.wake.notify_all();
        task.thread().unpark();

        // Joining ourselves would deadlock; the task exits once the
        // current callback returns.
        if task.thread().id() == std::thread::current().id() {
            return;
        }
        if task.join().is_err() {
            log::error!("pwm timer task panicked");
        }
    }
}

impl Drop for RecurringTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl core::fmt::Debug for RecurringTimer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RecurringTimer")
            .field("finished", &self.is_finished())
            .field("overruns", &self.overruns())
            .finish()
    }
}

/// Timer task body.  `target == None` means "beyond the clock's range".
fn run<F>(
    shared: &Shared,
    mut alarm: Alarm,
    mut target: Option<Instant>,
    min_interval: Duration,
    resync_after: Duration,
    mut callback: F,
) where
    F: FnMut() -> TimerAction,
{
    loop {
        if !alarm.wait_until(shared, target) {
            return;
        }

        let delay = match callback() {
            TimerAction::Stop => return,
            TimerAction::Reschedule(delay) => delay.max(min_interval),
        };

        target = target.and_then(|t| t.checked_add(delay));

        if let Some(t) = target {
            let now = Instant::now();
            let lag = now.saturating_duration_since(t);
            if lag > resync_after {
                shared.overruns.fetch_add(1, Ordering::Relaxed);
                warn!("pwm timer overrun by {:?}, resynchronising", lag);
                target = Some(now);
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  ESP-IDF alarm: one-shot esp_timer per target
// ═══════════════════════════════════════════════════════════════

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use std::sync::atomic::AtomicBool;

/// State the `esp_timer` callback touches.  Boxed so its address is stable
/// for the lifetime of the timer handle.
#[cfg(target_os = "espidf")]
struct AlarmSignal {
    worker: std::thread::Thread,
    due: AtomicBool,
    /// Set as the callback's last access to this struct.
    done: AtomicBool,
}

#[cfg(target_os = "espidf")]
struct Alarm {
    handle: esp_timer_handle_t,
    signal: Box<AlarmSignal>,
    armed: bool,
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn alarm_cb(arg: *mut core::ffi::c_void) {
    // SAFETY: `arg` is the boxed `AlarmSignal` owned by the `Alarm`, which
    // outlives every dispatch: `Alarm::settle` waits for `done` before the
    // box can be dropped or the flags reset.
    let signal = unsafe { &*(arg as *const AlarmSignal) };
    signal.due.store(true, Ordering::Release);
    signal.worker.unpark();
    signal.done.store(true, Ordering::Release);
}

#[cfg(target_os = "espidf")]
impl Alarm {
    /// Create the one-shot timer.  Must run on the timer task itself: the
    /// callback unparks the calling thread.
    fn new() -> std::io::Result<Self> {
        let signal = Box::new(AlarmSignal {
            worker: std::thread::current(),
            due: AtomicBool::new(false),
            done: AtomicBool::new(true),
        });
        let args = esp_timer_create_args_t {
            callback: Some(alarm_cb),
            arg: (&*signal as *const AlarmSignal).cast_mut().cast(),
            dispatch_method: esp_timer_dispatch_t_ESP_TIMER_TASK,
            name: b"pwm-alarm\0".as_ptr() as *const _,
            skip_unhandled_events: false,
        };
        let mut handle: esp_timer_handle_t = core::ptr::null_mut();
        // SAFETY: `args` is fully initialised and `handle` is a valid out
        // pointer; `signal` is kept alive by the returned `Alarm`.
        let ret = unsafe { esp_timer_create(&args, &mut handle) };
        if ret != ESP_OK {
            log::error!("pwm timer: esp_timer_create failed (rc={})", ret);
            return Err(std::io::Error::other("esp_timer_create failed"));
        }
        Ok(Self {
            handle,
            signal,
            armed: false,
        })
    }

    /// Park until `target`.  Returns `false` if cancelled first.
    fn wait_until(&mut self, shared: &Shared, target: Option<Instant>) -> bool {
        if let Some(t) = target {
            let remaining = t.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return !shared.is_cancelled();
            }
            let us = u64::try_from(remaining.as_micros()).unwrap_or(u64::MAX).max(1);
            self.signal.due.store(false, Ordering::Relaxed);
            self.signal.done.store(false, Ordering::Relaxed);
            // SAFETY: `handle` was created by `esp_timer_create` and is not
            // armed (`settle`/`disarm` ran after the previous target).
            let ret = unsafe { esp_timer_start_once(self.handle, us) };
            if ret != ESP_OK {
                log::error!("pwm timer: esp_timer_start_once failed (rc={})", ret);
                return false;
            }
            self.armed = true;
        }

        loop {
            if shared.is_cancelled() {
                self.disarm();
                return false;
            }
            if self.armed && self.signal.due.load(Ordering::Acquire) {
                self.settle();
                return true;
            }
            std::thread::park();
        }
    }

    /// Cancel a pending alarm.  If it already fired, wait for the callback.
    fn disarm(&mut self) {
        if !self.armed {
            return;
        }
        // SAFETY: valid handle; stopping an expired timer only returns
        // ESP_ERR_INVALID_STATE.
        if unsafe { esp_timer_stop(self.handle) } == ESP_OK {
            self.armed = false;
        } else {
            self.settle();
        }
    }

    /// Wait until a dispatched callback has stopped touching `signal`.
    fn settle(&mut self) {
        while !self.signal.done.load(Ordering::Acquire) {
            std::thread::yield_now();
        }
        self.armed = false;
    }
}

#[cfg(target_os = "espidf")]
impl Drop for Alarm {
    fn drop(&mut self) {
        self.disarm();
        // SAFETY: the timer is stopped and no callback is in flight.
        unsafe {
            esp_timer_delete(self.handle);
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Host alarm: Condvar timed wait
// ═══════════════════════════════════════════════════════════════

#[cfg(not(target_os = "espidf"))]
struct Alarm;

#[cfg(not(target_os = "espidf"))]
impl Alarm {
    #[allow(clippy::unnecessary_wraps)]
    fn new() -> std::io::Result<Self> {
        Ok(Self)
    }

    /// Sleep until `target`.  Returns `false` if the timer was cancelled first.
    fn wait_until(&mut self, shared: &Shared, target: Option<Instant>) -> bool {
        let mut cancelled = shared
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            if *cancelled {
                return false;
            }
            match target {
                None => {
                    cancelled = shared
                        .wake
                        .wait(cancelled)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(t) => {
                    let now = Instant::now();
                    if now >= t {
                        return true;
                    }
                    cancelled = shared
                        .wake
                        .wait_timeout(cancelled, t - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
    }
}
