//! Per-coroutine message queue
//!
//! FIFO with a thread-safe append side and a single-consumer get side (the
//! scheduler thread). Appends wake the run loop through the shared signal
//! so an idle loop never polls.

use crate::message::Message;
use crate::runloop::WakeSignal;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

fn queue_limit_from_env(env_value: Option<String>) -> usize {
    match env_value {
        Some(val) => match val.parse::<usize>() {
            Ok(n) => n,
            Err(_) => {
                tracing::warn!(value = %val, "invalid HVML_MSG_QUEUE_LIMIT, ignoring");
                0
            }
        },
        None => 0,
    }
}

pub struct MessageQueue {
    inner: Mutex<VecDeque<Message>>,
    signal: Option<Arc<WakeSignal>>,
    /// Soft cap: exceeding it logs, it never drops. 0 means unlimited.
    soft_limit: usize,
}

impl MessageQueue {
    pub fn new(signal: Option<Arc<WakeSignal>>) -> Self {
        MessageQueue {
            inner: Mutex::new(VecDeque::new()),
            signal,
            soft_limit: queue_limit_from_env(std::env::var("HVML_MSG_QUEUE_LIMIT").ok()),
        }
    }

    /// Take ownership of `msg` and queue it. Callable from any thread.
    pub fn append(&self, msg: Message) {
        let depth = {
            let mut q = self.inner.lock().expect("message queue poisoned");
            q.push_back(msg);
            q.len()
        };
        if self.soft_limit > 0 && depth > self.soft_limit {
            tracing::warn!(depth, limit = self.soft_limit, "message queue over soft limit");
        }
        if let Some(signal) = &self.signal {
            signal.notify();
        }
    }

    /// Remove and return the head. Scheduler-thread only.
    pub fn get(&self) -> Option<Message> {
        self.inner.lock().expect("message queue poisoned").pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("message queue poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MsgTarget;

    fn ping(n: u64) -> Message {
        Message::event(MsgTarget::Coroutine, n, None, "ping", None)
    }

    #[test]
    fn test_fifo_order() {
        let q = MessageQueue::new(None);
        for n in 0..3 {
            q.append(ping(n));
        }
        assert_eq!(q.len(), 3);
        for n in 0..3 {
            assert_eq!(q.get().unwrap().target_value, n);
        }
        assert!(q.get().is_none());
    }

    #[test]
    fn test_cross_thread_append_single_consumer_get() {
        let q = Arc::new(MessageQueue::new(None));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let q = q.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        q.append(ping(t * 100 + i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let mut count = 0;
        while q.get().is_some() {
            count += 1;
        }
        assert_eq!(count, 100);
    }

    #[test]
    fn test_append_notifies_signal() {
        let signal = Arc::new(WakeSignal::default());
        let q = MessageQueue::new(Some(signal.clone()));
        q.append(ping(1));
        // The notification is pending; a zero-ish wait must see it.
        assert!(signal.wait_timeout(std::time::Duration::from_millis(1)));
    }
}
