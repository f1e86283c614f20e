//! Host timers
//!
//! Timers belong to the run loop: arming one records a deadline, and the
//! loop fires the callback on its own thread when the deadline passes.
//! One-shot timers disarm after the first fire; interval timers re-arm.
//! Callbacks get the loop control so they can post events into coroutine
//! queues or stop the loop.

use crate::runloop::LoopCtl;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    OneShot,
    Interval,
}

pub type TimerCallback = Box<dyn FnMut(&str, &mut LoopCtl) + Send>;

pub struct Timer {
    id: String,
    interval: Duration,
    mode: TimerMode,
    callback: TimerCallback,
}

impl Timer {
    pub fn new(
        id: impl Into<String>,
        interval_ms: u64,
        mode: TimerMode,
        callback: TimerCallback,
    ) -> Self {
        Timer {
            id: id.into(),
            interval: Duration::from_millis(interval_ms),
            mode,
            callback,
        }
    }

    /// Fires once, `interval_ms` from arming.
    pub fn one_shot(id: impl Into<String>, interval_ms: u64, callback: TimerCallback) -> Self {
        Timer::new(id, interval_ms, TimerMode::OneShot, callback)
    }

    /// Fires every `interval_ms` until the loop stops.
    pub fn repeating(id: impl Into<String>, interval_ms: u64, callback: TimerCallback) -> Self {
        Timer::new(id, interval_ms, TimerMode::Interval, callback)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn mode(&self) -> TimerMode {
        self.mode
    }

    pub(crate) fn fire(&mut self, ctl: &mut LoopCtl) {
        tracing::trace!(id = %self.id, "timer fired");
        (self.callback)(&self.id, ctl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runloop::RunLoop;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_one_shot_fires_exactly_once_then_loop_stops() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();

        let mut rl = RunLoop::new();
        rl.add_timer(Timer::one_shot(
            "oneShot",
            20,
            Box::new(move |id, ctl| {
                assert_eq!(id, "oneShot");
                fired2.fetch_add(1, Ordering::SeqCst);
                ctl.stop();
            }),
        ));
        rl.run();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_interval_fires_until_stopped() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();

        let mut rl = RunLoop::new();
        rl.add_timer(Timer::repeating(
            "interval",
            10,
            Box::new(move |_, ctl| {
                if fired2.fetch_add(1, Ordering::SeqCst) >= 5 {
                    ctl.stop();
                }
            }),
        ));
        rl.run();
        assert!(fired.load(Ordering::SeqCst) >= 6);
    }

    #[test]
    fn test_timer_posts_into_coroutine_queue() {
        use crate::message::ReduceOpt;
        use crate::scheduler;
        use hvml_variant::Variant;

        let mut rl = RunLoop::new();
        let cid = rl.heap_mut().create_coroutine("timer-target");
        rl.add_timer(Timer::one_shot(
            "tick",
            10,
            Box::new(move |_, ctl| {
                let router = ctl.heap.router();
                scheduler::coroutine_post_event(
                    &router,
                    cid,
                    ReduceOpt::Keep,
                    Variant::Null,
                    "expired",
                    Some("tick"),
                    None,
                )
                .unwrap();
                ctl.stop();
            }),
        ));
        rl.run();
        let msg = rl.heap().get(cid).unwrap().mq.get().unwrap();
        assert_eq!(msg.event_name_str(), Some("expired:tick"));
    }
}
