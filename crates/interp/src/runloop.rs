//! The run loop
//!
//! One thread owns the heap and drives it: fire due timers, let the
//! scheduler drain queues, then sleep on a condition variable until either
//! a queue append signals new work or the next timer deadline passes. No
//! polling while idle.

use crate::heap::Heap;
use crate::scheduler;
use crate::timer::{Timer, TimerMode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Wakes the run loop from other threads (queue appends, stop requests).
#[derive(Default)]
pub struct WakeSignal {
    flag: Mutex<bool>,
    cv: Condvar,
}

impl WakeSignal {
    pub fn notify(&self) {
        let mut flag = self.flag.lock().expect("wake signal poisoned");
        *flag = true;
        self.cv.notify_all();
    }

    /// Wait until notified or `timeout` elapses. Returns whether a
    /// notification arrived.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut flag = self.flag.lock().expect("wake signal poisoned");
        let deadline = Instant::now() + timeout;
        while !*flag {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _) = self
                .cv
                .wait_timeout(flag, deadline - now)
                .expect("wake signal poisoned");
            flag = guard;
        }
        std::mem::replace(&mut *flag, false)
    }
}

/// Shared stop flag; timer callbacks and external threads both use it.
#[derive(Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
    signal: Arc<WakeSignal>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.signal.notify();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// What a timer callback may touch while the loop is paused for it.
pub struct LoopCtl<'a> {
    pub heap: &'a mut Heap,
    stop: &'a StopHandle,
}

impl LoopCtl<'_> {
    pub fn stop(&mut self) {
        self.stop.stop();
    }
}

struct ArmedTimer {
    timer: Timer,
    deadline: Instant,
}

pub struct RunLoop {
    heap: Heap,
    timers: Vec<ArmedTimer>,
    signal: Arc<WakeSignal>,
    stop: StopHandle,
}

/// Idle wait when no timer is armed; queue appends cut it short.
const IDLE_WAIT: Duration = Duration::from_millis(100);

impl Default for RunLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl RunLoop {
    pub fn new() -> Self {
        let signal = Arc::new(WakeSignal::default());
        let heap = Heap::with_signal(signal.clone());
        let stop = StopHandle {
            stopped: Arc::new(AtomicBool::new(false)),
            signal: signal.clone(),
        };
        RunLoop {
            heap,
            timers: Vec::new(),
            signal,
            stop,
        }
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Arm a timer; it first fires `interval` from now.
    pub fn add_timer(&mut self, timer: Timer) {
        let deadline = Instant::now() + timer.interval();
        self.timers.push(ArmedTimer { timer, deadline });
        self.signal.notify();
    }

    fn fire_due_timers(&mut self) {
        let now = Instant::now();
        let mut idx = 0;
        while idx < self.timers.len() {
            if self.timers[idx].deadline > now {
                idx += 1;
                continue;
            }
            let rearm = {
                let armed = &mut self.timers[idx];
                armed.timer.fire(&mut LoopCtl {
                    heap: &mut self.heap,
                    stop: &self.stop,
                });
                match armed.timer.mode() {
                    TimerMode::OneShot => false,
                    TimerMode::Interval => {
                        armed.deadline = now + armed.timer.interval();
                        true
                    }
                }
            };
            if rearm {
                idx += 1;
            } else {
                self.timers.remove(idx);
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.timers.iter().map(|t| t.deadline).min()
    }

    /// Drive until `stop()` is requested.
    pub fn run(&mut self) {
        tracing::debug!("run loop entered");
        while !self.stop.is_stopped() {
            self.fire_due_timers();
            if self.stop.is_stopped() {
                break;
            }
            scheduler::dispatch_msg(&mut self.heap);
            if self.stop.is_stopped() {
                break;
            }

            let wait = match self.next_deadline() {
                Some(deadline) => deadline
                    .saturating_duration_since(Instant::now())
                    .min(IDLE_WAIT),
                None => IDLE_WAIT,
            };
            if wait > Duration::ZERO {
                self.signal.wait_timeout(wait);
            }
        }
        tracing::debug!("run loop exited");
    }

    /// Test helper: run dispatch cycles until every queue is empty, without
    /// blocking on the signal.
    pub fn run_until_idle(&mut self) {
        loop {
            self.fire_due_timers();
            scheduler::dispatch_msg(&mut self.heap);
            if !self.heap.any_pending_messages() {
                return;
            }
        }
    }
}
