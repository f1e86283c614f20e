//! The coroutine heap and the cross-coroutine router
//!
//! The heap is the scheduler thread's ordered map of live coroutines,
//! keyed by id. The router is the thread-safe half: a registry of queue
//! handles that any thread (timers, the renderer connection) may post
//! through. Broadcast fan-out clones the envelope once per live coroutine
//! and retargets each clone.

use crate::coroutine::{Coroutine, CoroutineId};
use crate::message::{Message, MsgTarget};
use crate::queue::MessageQueue;
use crate::runloop::WakeSignal;
use hvml_core::Atom;
use hvml_core::errors::{self, ErrorCode};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Thread-safe queue registry, keyed by the coroutine id's integer value.
#[derive(Default)]
pub struct Router {
    queues: Mutex<BTreeMap<u64, Arc<MessageQueue>>>,
}

impl Router {
    fn register(&self, cid_value: u64, queue: Arc<MessageQueue>) {
        self.queues
            .lock()
            .expect("router registry poisoned")
            .insert(cid_value, queue);
    }

    fn unregister(&self, cid_value: u64) {
        self.queues
            .lock()
            .expect("router registry poisoned")
            .remove(&cid_value);
    }

    /// Deliver an envelope. Coroutine targets go to one queue; broadcast
    /// targets fan out as retargeted clones.
    pub fn post(&self, msg: Message) -> Result<(), ErrorCode> {
        match msg.target {
            MsgTarget::Coroutine => {
                let queues = self.queues.lock().expect("router registry poisoned");
                match queues.get(&msg.target_value) {
                    Some(q) => {
                        q.append(msg);
                        Ok(())
                    }
                    None => {
                        errors::set_last_error(errors::NOT_EXISTS);
                        Err(errors::NOT_EXISTS)
                    }
                }
            }
            MsgTarget::Broadcast => {
                let queues = self.queues.lock().expect("router registry poisoned");
                for (&cid_value, q) in queues.iter() {
                    q.append(msg.clone_retargeted(cid_value));
                }
                Ok(())
            }
            _ => {
                // Session / workspace / window / dom targets are translated
                // by the connection handler before they reach the router.
                errors::set_last_error(errors::NOT_SUPPORTED);
                Err(errors::NOT_SUPPORTED)
            }
        }
    }
}

/// The ordered collection of live coroutines. Scheduler-thread only.
pub struct Heap {
    coroutines: BTreeMap<CoroutineId, Coroutine>,
    router: Arc<Router>,
    signal: Option<Arc<WakeSignal>>,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Heap {
            coroutines: BTreeMap::new(),
            router: Arc::new(Router::default()),
            signal: None,
        }
    }

    /// A heap whose queues wake the given run-loop signal on append.
    pub fn with_signal(signal: Arc<WakeSignal>) -> Self {
        Heap {
            coroutines: BTreeMap::new(),
            router: Arc::new(Router::default()),
            signal: Some(signal),
        }
    }

    pub fn router(&self) -> Arc<Router> {
        self.router.clone()
    }

    /// Create and register a coroutine; its id is the interned URI.
    pub fn create_coroutine(&mut self, name: &str) -> CoroutineId {
        let uri = format!("hvml://localhost/{name}");
        let cid = Atom::intern(&uri);
        let mq = Arc::new(MessageQueue::new(self.signal.clone()));
        self.router.register(cid.id() as u64, mq.clone());
        let co = Coroutine::new(cid, uri, mq);
        self.coroutines.insert(cid, co);
        tracing::debug!(cid = cid.id(), "coroutine created");
        cid
    }

    pub fn remove_coroutine(&mut self, cid: CoroutineId) -> Option<Coroutine> {
        self.router.unregister(cid.id() as u64);
        self.coroutines.remove(&cid)
    }

    pub fn get(&self, cid: CoroutineId) -> Option<&Coroutine> {
        self.coroutines.get(&cid)
    }

    pub fn get_mut(&mut self, cid: CoroutineId) -> Option<&mut Coroutine> {
        self.coroutines.get_mut(&cid)
    }

    /// Coroutine ids in heap order.
    pub fn cids(&self) -> Vec<CoroutineId> {
        self.coroutines.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.coroutines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coroutines.is_empty()
    }

    pub fn find_by_dom_handle(&self, handle: u64) -> Option<CoroutineId> {
        self.coroutines
            .values()
            .find(|co| co.target_dom_handle == handle)
            .map(|co| co.cid)
    }

    pub fn find_by_page_handle(&self, handle: u64) -> Option<CoroutineId> {
        self.coroutines
            .values()
            .find(|co| co.target_page_handle == handle)
            .map(|co| co.cid)
    }

    pub fn any_pending_messages(&self) -> bool {
        self.coroutines.values().any(|co| !co.mq.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_lookup() {
        let mut heap = Heap::new();
        let a = heap.create_coroutine("heap-a");
        let b = heap.create_coroutine("heap-b");
        assert_ne!(a, b);
        assert_eq!(heap.len(), 2);
        assert!(heap.get(a).is_some());
        assert_eq!(heap.get(b).unwrap().cid, b);
        // Heap order follows id order.
        assert_eq!(heap.cids(), vec![a.min(b), a.max(b)]);
    }

    #[test]
    fn test_post_to_coroutine() {
        let mut heap = Heap::new();
        let cid = heap.create_coroutine("heap-post");
        let router = heap.router();
        router
            .post(Message::event(
                MsgTarget::Coroutine,
                cid.id() as u64,
                None,
                "ping",
                None,
            ))
            .unwrap();
        assert_eq!(heap.get(cid).unwrap().mq.len(), 1);
    }

    #[test]
    fn test_post_to_unknown_coroutine_fails() {
        let heap = Heap::new();
        let r = heap.router().post(Message::event(
            MsgTarget::Coroutine,
            99999,
            None,
            "ping",
            None,
        ));
        assert_eq!(r, Err(errors::NOT_EXISTS));
    }

    #[test]
    fn test_broadcast_fans_out_one_clone_each() {
        let mut heap = Heap::new();
        let a = heap.create_coroutine("heap-bc-a");
        let b = heap.create_coroutine("heap-bc-b");
        heap.router()
            .post(Message::event(MsgTarget::Broadcast, 0, None, "ping", None))
            .unwrap();

        for cid in [a, b] {
            let co = heap.get(cid).unwrap();
            assert_eq!(co.mq.len(), 1);
            let msg = co.mq.get().unwrap();
            assert_eq!(msg.target, MsgTarget::Coroutine);
            assert_eq!(msg.target_value, cid.id() as u64);
        }
    }

    #[test]
    fn test_removed_coroutine_leaves_router() {
        let mut heap = Heap::new();
        let cid = heap.create_coroutine("heap-rm");
        heap.remove_coroutine(cid);
        let r = heap.router().post(Message::event(
            MsgTarget::Coroutine,
            cid.id() as u64,
            None,
            "ping",
            None,
        ));
        assert_eq!(r, Err(errors::NOT_EXISTS));
    }

    #[test]
    fn test_handle_lookup() {
        let mut heap = Heap::new();
        let cid = heap.create_coroutine("heap-handles");
        heap.get_mut(cid).unwrap().target_dom_handle = 0xD0;
        heap.get_mut(cid).unwrap().target_page_handle = 0xF0;
        assert_eq!(heap.find_by_dom_handle(0xD0), Some(cid));
        assert_eq!(heap.find_by_page_handle(0xF0), Some(cid));
        assert_eq!(heap.find_by_dom_handle(0xBAD), None);
    }
}
