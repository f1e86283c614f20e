//! HVML Interp: coroutines, scheduling, and event dispatch
//!
//! The top crate of the workspace. A host embeds it by building a
//! `RunLoop`, creating coroutines in its heap, wiring observers, and
//! feeding envelopes through the router or the connection handler:
//!
//! - `message` / `queue`: the envelope and the per-coroutine FIFO
//! - `coroutine` / `heap`: execution frames and the ordered coroutine map
//! - `observer`: (entity, event-type, sub-pattern) registrations
//! - `scheduler`: queue draining, observer matching, frame push
//! - `runloop` / `timer`: the condvar-driven host loop and its timers
//! - `vdom` / `edom`: the node surface frames walk, and the opaque
//!   entity-DOM handles
//! - `dvobjs`: `$L`, `$SYS`, `$DOC`

pub mod coroutine;
pub mod dvobjs;
pub mod edom;
pub mod heap;
pub mod message;
pub mod observer;
pub mod queue;
pub mod runloop;
pub mod scheduler;
pub mod timer;
pub mod vdom;

pub use coroutine::{Coroutine, CoroutineId, CoroutineState, StackFrame};
pub use heap::{Heap, Router};
pub use message::{Message, MsgTarget, MsgType, ReduceOpt};
pub use observer::Observer;
pub use queue::MessageQueue;
pub use runloop::{RunLoop, StopHandle};
pub use timer::{Timer, TimerMode};

/// Register every error-message segment of the stack. Idempotent; hosts
/// call this once before anything else.
pub fn init_once() {
    hvml_parser::init_once();
}
