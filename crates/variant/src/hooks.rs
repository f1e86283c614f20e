//! Post-change notification hooks for containers
//!
//! Every container payload embeds a `Hooks`. Listener invocation is
//! synchronous; while listeners run, the container is flagged and any
//! mutation attempt through the container API fails with `WRONG_STAGE`.
//! That flag is the borrow guard that keeps the non-re-entrance contract
//! checkable instead of undefined.

use crate::value::Variant;
use hvml_core::errors::{self, ErrorCode};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// What a mutation did to the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Grow,
    Shrink,
    Change,
}

impl ChangeKind {
    /// The event-name text used when forwarding to observers.
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Grow => "grow",
            ChangeKind::Shrink => "shrink",
            ChangeKind::Change => "change",
        }
    }
}

/// Handle for removing a registered listener.
pub type ListenerId = u64;

type ListenerFn = Arc<dyn Fn(&Variant, ChangeKind, &[Variant]) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Hooks {
    listeners: Mutex<Vec<(ListenerId, ListenerFn)>>,
    next_id: AtomicU64,
    notifying: AtomicBool,
}

impl Hooks {
    pub(crate) fn add(
        &self,
        f: impl Fn(&Variant, ChangeKind, &[Variant]) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.listeners
            .lock()
            .expect("listener list poisoned")
            .push((id, Arc::new(f)));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut list = self.listeners.lock().expect("listener list poisoned");
        let before = list.len();
        list.retain(|(lid, _)| *lid != id);
        list.len() != before
    }

    /// Fails with `WRONG_STAGE` when called from inside a listener of the
    /// same container.
    pub(crate) fn mutation_guard(&self, silently: bool) -> Result<(), ErrorCode> {
        if self.notifying.load(Ordering::Acquire) {
            errors::set_last_error_silently(errors::WRONG_STAGE, silently);
            return Err(errors::WRONG_STAGE);
        }
        Ok(())
    }

    /// Invoke listeners synchronously. The data lock must NOT be held by the
    /// caller at this point; listeners may read the container.
    pub(crate) fn emit(&self, source: &Variant, kind: ChangeKind, affected: &[Variant]) {
        let snapshot: Vec<ListenerFn> = {
            let list = self.listeners.lock().expect("listener list poisoned");
            if list.is_empty() {
                return;
            }
            list.iter().map(|(_, f)| f.clone()).collect()
        };

        self.notifying.store(true, Ordering::Release);
        for f in snapshot {
            f(source, kind, affected);
        }
        self.notifying.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_listener_receives_events() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hooks = Hooks::default();
        let h = hits.clone();
        hooks.add(move |_, kind, affected| {
            assert_eq!(kind, ChangeKind::Grow);
            assert_eq!(affected.len(), 1);
            h.fetch_add(1, Ordering::SeqCst);
        });
        let src = Variant::array();
        hooks.emit(&src, ChangeKind::Grow, &[Variant::longint(1)]);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_removed_listener_is_silent() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hooks = Hooks::default();
        let h = hits.clone();
        let id = hooks.add(move |_, _, _| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert!(hooks.remove(id));
        assert!(!hooks.remove(id));
        hooks.emit(&Variant::array(), ChangeKind::Shrink, &[]);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_guard_blocks_reentrant_mutation() {
        // The full container round-trip lives in the container tests; here
        // just check the flag mechanics.
        let hooks = Hooks::default();
        assert!(hooks.mutation_guard(true).is_ok());
        hooks.notifying.store(true, Ordering::Release);
        assert_eq!(hooks.mutation_guard(true), Err(errors::WRONG_STAGE));
        hooks.notifying.store(false, Ordering::Release);
    }
}
