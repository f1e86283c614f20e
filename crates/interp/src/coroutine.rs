//! Coroutines: one running HVML program each
//!
//! A coroutine is not a thread; it is a record the scheduler steps. Its
//! execution state is a vector of frames, each pointing at a VDOM node and
//! carrying a scope object plus the frame-local `$?` and `$!` variables.
//! One call to `execute_one_step` advances exactly one node: push a child,
//! pop the finished frame, or yield into the wait state.

use crate::dvobjs;
use crate::edom::{DocumentHandle, ElementHandle};
use crate::message::Message;
use crate::observer::{Observer, is_observer_match};
use crate::queue::MessageQueue;
use crate::vdom::VdomElement;
use hvml_core::Atom;
use hvml_parser::token::AttrValue;
use hvml_variant::{ScopeStack, Variant, vcm};
use std::collections::VecDeque;
use std::sync::Arc;

/// Identity of a coroutine: the interned URI atom.
pub type CoroutineId = Atom;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoroutineState {
    Ready,
    Run,
    Wait,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    AfterPushed,
    SelectChild(usize),
}

/// One execution frame over a VDOM node.
pub struct StackFrame {
    pub pos: Option<Arc<VdomElement>>,
    pub scope: Variant,
    /// Frame-local bindings: `?` ($?), `!` ($!), and evaluated attributes.
    pub locals: Variant,
    pub edom_element: ElementHandle,
    pub silently: bool,
    pub next_step: NextStep,
}

impl StackFrame {
    pub fn new(pos: Option<Arc<VdomElement>>, scope: Variant, edom_element: ElementHandle) -> Self {
        let silently = pos.as_deref().map(VdomElement::is_silently).unwrap_or(false);
        let locals = Variant::object();
        let _ = locals.object_set("!", Variant::object());
        StackFrame {
            pos,
            scope,
            locals,
            edom_element,
            silently,
            next_step: NextStep::AfterPushed,
        }
    }

    /// `$?`: the result (or event payload) visible to this frame.
    pub fn set_question_var(&mut self, value: Variant) {
        let _ = self.locals.object_set("?", value);
    }

    pub fn question_var(&self) -> Option<Variant> {
        self.locals.object_get_ex("?", true)
    }

    /// `$!`: the frame's exclamation object.
    pub fn exclamation_var(&self) -> Variant {
        self.locals
            .object_get_ex("!", true)
            .unwrap_or_else(Variant::object)
    }
}

/// A matched observer queued for frame push.
pub struct ObserverMatch {
    pub pos: Option<Arc<VdomElement>>,
    pub scope: Variant,
    pub edom_element: ElementHandle,
    pub payload: Option<Variant>,
    pub source: Option<Variant>,
    pub event_name: Option<Variant>,
}

pub struct Coroutine {
    pub cid: CoroutineId,
    pub state: CoroutineState,
    pub frames: Vec<StackFrame>,
    pub mq: Arc<MessageQueue>,
    pub observers: Vec<Observer>,
    pub tasks: VecDeque<ObserverMatch>,
    pub vdom: Option<Arc<VdomElement>>,
    pub target_dom_handle: u64,
    pub target_page_handle: u64,
    pub uri: String,
    /// Session-level bindings ($L, $SYS, ...), the outermost scope.
    pub builtins: Variant,
}

impl Coroutine {
    pub fn new(cid: CoroutineId, uri: String, mq: Arc<MessageQueue>) -> Self {
        let builtins = Variant::object();
        let _ = builtins.object_set("L", dvobjs::logical::make_dvobj());
        let _ = builtins.object_set("SYS", dvobjs::system::make_dvobj());
        Coroutine {
            cid,
            state: CoroutineState::Ready,
            frames: Vec::new(),
            mq,
            observers: Vec::new(),
            tasks: VecDeque::new(),
            vdom: None,
            target_dom_handle: 0,
            target_page_handle: 0,
            uri,
            builtins,
        }
    }

    pub fn add_observer(&mut self, observer: Observer) {
        // Native entities learn about their observation; an expression
        // variable uses this to refresh its last_value.
        if let Some(ops) = observer.observed.native_ops() {
            let stack = self.scope_stack();
            vcm::set_current_scope_stack(Some(stack));
            let accepted = ops.on_observe(
                observer.event_type.as_str(),
                observer.sub_type_pattern.as_deref(),
            );
            vcm::set_current_scope_stack(None);
            if !accepted {
                tracing::debug!(
                    event = observer.event_type.as_str(),
                    "native entity declined observation"
                );
            }
        }
        self.observers.push(observer);
    }

    /// Drop every observer for (entity, type); a forget with no sub-type
    /// pattern removes them all.
    pub fn remove_observers(&mut self, observed: &Variant, event_type: Atom) {
        self.observers
            .retain(|o| !(o.event_type == event_type && o.observed.same_identity(observed)));
    }

    /// Observers matching an incoming event, in declaration order.
    pub fn matching_observers(
        &self,
        observed: &Variant,
        event_type: Atom,
        sub_type: Option<&str>,
    ) -> Vec<Observer> {
        self.observers
            .iter()
            .filter(|o| is_observer_match(o, observed, event_type, sub_type))
            .cloned()
            .collect()
    }

    /// The scope chain the evaluator sees: builtins at the bottom, then
    /// each frame's scope and locals, innermost last.
    pub fn scope_stack(&self) -> ScopeStack {
        let mut stack = ScopeStack::new();
        stack.push_scope(self.builtins.clone());
        for frame in &self.frames {
            stack.push_scope(frame.scope.clone());
            stack.push_scope(frame.locals.clone());
        }
        stack
    }

    pub fn push_frame(&mut self, frame: StackFrame) {
        self.frames.push(frame);
    }

    pub fn enqueue(&self, msg: Message) {
        self.mq.append(msg);
    }

    /// Wake a waiting coroutine; the next `execute_ready_steps` resumes the
    /// suspended frame.
    pub fn resume(&mut self) {
        if self.state == CoroutineState::Wait {
            self.state = CoroutineState::Run;
        }
    }

    /// Attach the rendered document: binds `$DOC` and records the handle
    /// the envelope router translates DOM targets through.
    pub fn bind_document(&mut self, doc: DocumentHandle) {
        let _ = self.builtins.object_set("DOC", dvobjs::doc::make_dvobj(doc));
        self.target_dom_handle = doc.0;
    }
}

enum StepAction {
    None,
    PushChild(Arc<VdomElement>),
    Pop,
    Wait,
    Stop,
}

fn compute_step(frame: &mut StackFrame, stack: &ScopeStack) -> StepAction {
    let Some(pos) = frame.pos.clone() else {
        return StepAction::Pop;
    };
    match frame.next_step {
        NextStep::AfterPushed => {
            if pos.name == "exit" {
                return StepAction::Stop;
            }
            if pos.name == "sleep" {
                // Suspend; resumption re-enters at SelectChild, which pops
                // the frame once the children (if any) have run.
                frame.next_step = NextStep::SelectChild(0);
                return StepAction::Wait;
            }
            // Evaluate attribute expressions into the frame locals; this is
            // where embedded eJSON meets the scope chain.
            for attr in &pos.attributes {
                let value = match &attr.value {
                    None => Variant::boolean(true),
                    Some(AttrValue::Literal(text)) => Variant::string(text.clone()),
                    Some(AttrValue::Vcm(node)) => {
                        match vcm::eval(node, stack, frame.silently) {
                            Ok(v) => v,
                            Err(code) => {
                                tracing::debug!(
                                    element = %pos.name,
                                    attr = %attr.name,
                                    code,
                                    "attribute evaluation failed"
                                );
                                Variant::Undefined
                            }
                        }
                    }
                };
                let _ = frame.locals.object_set(attr.name.clone(), value);
            }
            if pos.children.is_empty() {
                StepAction::Pop
            } else {
                frame.next_step = NextStep::SelectChild(0);
                StepAction::None
            }
        }
        NextStep::SelectChild(idx) => match pos.children.get(idx) {
            Some(child) => {
                frame.next_step = NextStep::SelectChild(idx + 1);
                StepAction::PushChild(child.clone())
            }
            None => StepAction::Pop,
        },
    }
}

/// Advance one frame node. May push or pop a frame, or move the coroutine
/// into Wait / Stopped.
pub fn execute_one_step(co: &mut Coroutine) {
    if co.frames.is_empty() {
        co.state = CoroutineState::Ready;
        return;
    }
    let stack = co.scope_stack();
    vcm::set_current_scope_stack(Some(stack.clone()));
    let action = {
        let frame = co.frames.last_mut().expect("checked non-empty");
        compute_step(frame, &stack)
    };
    vcm::set_current_scope_stack(None);

    match action {
        StepAction::None => {}
        StepAction::PushChild(child) => {
            let scope = co
                .frames
                .last()
                .map(|f| f.scope.clone())
                .unwrap_or_else(Variant::object);
            let edom = co
                .frames
                .last()
                .map(|f| f.edom_element)
                .unwrap_or_default();
            co.push_frame(StackFrame::new(Some(child), scope, edom));
        }
        StepAction::Pop => {
            co.frames.pop();
        }
        StepAction::Wait => co.state = CoroutineState::Wait,
        StepAction::Stop => co.state = CoroutineState::Stopped,
    }
}

/// The post-step hook: keep stepping a running coroutine until its frames
/// drain or it yields, then settle the state back to Ready.
pub fn execute_ready_steps(co: &mut Coroutine) {
    while co.state == CoroutineState::Run && !co.frames.is_empty() {
        execute_one_step(co);
    }
    if co.state == CoroutineState::Run {
        co.state = CoroutineState::Ready;
    }
}
