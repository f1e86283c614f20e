//! Event dispatch and the scheduler entry point
//!
//! The host run loop calls `dispatch_msg` each cycle. For every coroutine
//! in heap order that is neither running nor waiting, the queue drains:
//! event envelopes parse their `"type[:subtype]"` name, match observers in
//! declaration order, and each match pushes an execution frame carrying
//! the payload as `$?` and the event identity in `$!`. Request, response,
//! and void envelopes are reserved; receiving one is a logic error.

use crate::coroutine::{
    Coroutine, CoroutineId, CoroutineState, ObserverMatch, StackFrame, execute_ready_steps,
};
use crate::heap::{Heap, Router};
use crate::message::{Message, MsgTarget, MsgType, ReduceOpt, parse_event_name};
use hvml_core::errors::{self, ErrorCode};
use hvml_core::{Atom, AtomBucket};
use hvml_variant::Variant;

const EXCLAMATION_EVENT_NAME: &str = "_eventName";
const EXCLAMATION_EVENT_SOURCE: &str = "_eventSource";

/// Scheduler entry point: drain every eligible coroutine's queue.
pub fn dispatch_msg(heap: &mut Heap) {
    for cid in heap.cids() {
        handle_coroutine_msg(heap, cid);
    }
}

fn handle_coroutine_msg(heap: &mut Heap, cid: CoroutineId) {
    let Some(co) = heap.get_mut(cid) else {
        return;
    };
    if matches!(co.state, CoroutineState::Wait | CoroutineState::Run) {
        return;
    }
    while let Some(msg) = co.mq.get() {
        dispatch_coroutine_msg(co, msg);
        if co.state == CoroutineState::Stopped {
            break;
        }
    }
}

pub fn dispatch_coroutine_msg(co: &mut Coroutine, msg: Message) {
    match msg.msg_type {
        MsgType::Event => process_coroutine_event(co, msg),
        // Reserved envelope types; no way to recover gracefully, fail fast.
        MsgType::Request => unreachable!("request envelope reached a coroutine queue"),
        MsgType::Response => unreachable!("response envelope reached a coroutine queue"),
        MsgType::Void => unreachable!("void envelope reached a coroutine queue"),
    }
}

fn process_coroutine_event(co: &mut Coroutine, msg: Message) {
    let Some(event) = msg.event_name_str().map(str::to_owned) else {
        errors::set_last_error(errors::INVALID_VALUE);
        tracing::warn!("event envelope without a name dropped");
        return;
    };
    let (ty, sub) = parse_event_name(&event);
    let ty_atom = Atom::intern_in(AtomBucket::Msg, ty);
    let observed = msg.element_value.clone().unwrap_or(Variant::Null);

    let matched = co.matching_observers(&observed, ty_atom, sub);
    let handled = !matched.is_empty();
    for obs in matched {
        co.tasks.push_back(ObserverMatch {
            pos: obs.pos,
            scope: obs.scope,
            edom_element: obs.edom_element,
            payload: msg.data.clone(),
            source: msg.source_uri.clone(),
            event_name: msg.event_name.clone(),
        });
    }
    while let Some(task) = co.tasks.pop_front() {
        on_observer_matched(co, task);
    }

    if !handled && ty_atom == Atom::intern_in(AtomBucket::Msg, "close") {
        // A close aimed at the document stops the program.
        tracing::info!(cid = co.cid.id(), "close event, stopping coroutine");
        co.state = CoroutineState::Stopped;
    }
}

/// Push the frame for one matched observer and run the coroutine's ready
/// steps.
fn on_observer_matched(co: &mut Coroutine, task: ObserverMatch) {
    co.state = CoroutineState::Run;

    let mut frame = StackFrame::new(task.pos, task.scope, task.edom_element);
    if let Some(payload) = task.payload {
        frame.set_question_var(payload);
    }
    let exclamation = frame.exclamation_var();
    if let Some(name) = task.event_name {
        let _ = exclamation.object_set(EXCLAMATION_EVENT_NAME, name);
    }
    if let Some(source) = task.source {
        let _ = exclamation.object_set(EXCLAMATION_EVENT_SOURCE, source);
    }

    co.push_frame(frame);
    execute_ready_steps(co);
}

/// Fatal per-coroutine failure: post `exception:<kind>` to the coroutine
/// and stop it.
pub fn report_coroutine_exception(heap: &mut Heap, cid: CoroutineId, kind: &str) {
    let router = heap.router();
    let _ = post_event_by_ctype(
        &router,
        cid.id() as u64,
        ReduceOpt::Keep,
        None,
        Variant::Null,
        "exception",
        Some(kind),
        None,
    );
    if let Some(co) = heap.get_mut(cid) {
        co.state = CoroutineState::Stopped;
    }
}

/// Build an event envelope and hand it to the router.
pub fn post_event(
    router: &Router,
    cid_value: u64,
    reduce_opt: ReduceOpt,
    source_uri: Option<Variant>,
    observed: Variant,
    event_name: Variant,
    data: Option<Variant>,
) -> Result<(), ErrorCode> {
    if event_name.as_str().is_none() {
        errors::set_last_error(errors::INVALID_VALUE);
        return Err(errors::INVALID_VALUE);
    }
    let mut msg = Message::event(MsgTarget::Coroutine, cid_value, Some(observed), "", data);
    msg.reduce_opt = reduce_opt;
    msg.source_uri = source_uri;
    msg.event_name = Some(event_name);
    router.post(msg)
}

/// `post_event` with the name assembled from C-string style parts.
#[allow(clippy::too_many_arguments)]
pub fn post_event_by_ctype(
    router: &Router,
    cid_value: u64,
    reduce_opt: ReduceOpt,
    source_uri: Option<Variant>,
    observed: Variant,
    event_type: &str,
    event_sub_type: Option<&str>,
    data: Option<Variant>,
) -> Result<(), ErrorCode> {
    if event_type.is_empty() {
        errors::set_last_error(errors::INVALID_VALUE);
        return Err(errors::INVALID_VALUE);
    }
    let name = match event_sub_type {
        Some(sub) => format!("{event_type}:{sub}"),
        None => event_type.to_owned(),
    };
    post_event(
        router,
        cid_value,
        reduce_opt,
        source_uri,
        observed,
        Variant::string(name),
        data,
    )
}

/// Post an event on behalf of a coroutine; the source URI is the
/// coroutine's own identity.
pub fn coroutine_post_event(
    router: &Router,
    cid: CoroutineId,
    reduce_opt: ReduceOpt,
    observed: Variant,
    event_type: &str,
    event_sub_type: Option<&str>,
    data: Option<Variant>,
) -> Result<(), ErrorCode> {
    let source_uri = Variant::string(cid.as_str());
    post_event_by_ctype(
        router,
        cid.id() as u64,
        reduce_opt,
        Some(source_uri),
        observed,
        event_type,
        event_sub_type,
        data,
    )
}

/// Broadcast an event to every live coroutine.
pub fn broadcast_event(
    router: &Router,
    observed: Variant,
    event_type: &str,
    event_sub_type: Option<&str>,
    data: Option<Variant>,
) -> Result<(), ErrorCode> {
    let name = match event_sub_type {
        Some(sub) => format!("{event_type}:{sub}"),
        None => event_type.to_owned(),
    };
    router.post(Message::event(
        MsgTarget::Broadcast,
        0,
        Some(observed),
        &name,
        data,
    ))
}

/// Route an envelope arriving from the external channel: coroutine and
/// broadcast targets go straight to the router, window and DOM targets
/// translate through the owning coroutine's handles.
pub fn conn_event_handler(heap: &mut Heap, msg: Message) {
    match msg.target {
        MsgTarget::Coroutine | MsgTarget::Broadcast => {
            let _ = dispatch_move_buffer_event(heap, msg);
        }
        MsgTarget::PlainWindow => {
            match heap.find_by_page_handle(msg.target_value) {
                Some(cid) => repost_translated(heap, cid, msg),
                None => tracing::warn!(
                    handle = msg.target_value,
                    "no coroutine owns the target window"
                ),
            }
        }
        MsgTarget::Dom => match heap.find_by_dom_handle(msg.target_value) {
            Some(cid) => repost_translated(heap, cid, msg),
            None => tracing::warn!(
                handle = msg.target_value,
                "no coroutine owns the target document"
            ),
        },
        MsgTarget::Session | MsgTarget::Workspace | MsgTarget::Widget | MsgTarget::User => {
            tracing::warn!(target = ?msg.target, "unsupported envelope target in this revision");
        }
    }
}

/// Place a coroutine-targeted envelope on its queue; broadcast envelopes
/// fan out through clones.
pub fn dispatch_move_buffer_event(heap: &Heap, msg: Message) -> Result<(), ErrorCode> {
    heap.router().post(msg)
}

fn repost_translated(heap: &mut Heap, cid: CoroutineId, msg: Message) {
    let Some(event_name) = msg.event_name.clone() else {
        errors::set_last_error(errors::INVALID_VALUE);
        return;
    };
    let source_uri = heap
        .get(cid)
        .map(|co| Variant::string(co.uri.clone()));
    let observed = msg.element_value.clone().unwrap_or(Variant::Null);
    let router = heap.router();
    if let Err(code) = post_event(
        &router,
        cid.id() as u64,
        msg.reduce_opt,
        source_uri,
        observed,
        event_name,
        msg.data.clone(),
    ) {
        tracing::warn!(code, "failed to repost translated envelope");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::Observer;

    fn msg_atom(s: &str) -> Atom {
        Atom::intern_in(AtomBucket::Msg, s)
    }

    #[test]
    fn test_event_pushes_frame_for_matching_observer() {
        let mut heap = Heap::new();
        let cid = heap.create_coroutine("sched-match");
        let entity = Variant::string("button");
        {
            let co = heap.get_mut(cid).unwrap();
            co.add_observer(Observer::new(entity.clone(), msg_atom("clicked"), None));
        }

        let router = heap.router();
        coroutine_post_event(
            &router,
            cid,
            ReduceOpt::Keep,
            entity,
            "clicked",
            None,
            Some(Variant::string("payload")),
        )
        .unwrap();

        dispatch_msg(&mut heap);

        // The frame ran to completion and the coroutine settled.
        let co = heap.get(cid).unwrap();
        assert_eq!(co.state, CoroutineState::Ready);
        assert!(co.frames.is_empty());
        assert!(co.mq.is_empty());
    }

    #[test]
    fn test_non_matching_event_is_ignored() {
        let mut heap = Heap::new();
        let cid = heap.create_coroutine("sched-nomatch");
        let entity = Variant::string("button");
        heap.get_mut(cid)
            .unwrap()
            .add_observer(Observer::new(entity, msg_atom("clicked"), None));

        let router = heap.router();
        coroutine_post_event(
            &router,
            cid,
            ReduceOpt::Keep,
            Variant::string("other"),
            "clicked",
            None,
            None,
        )
        .unwrap();
        dispatch_msg(&mut heap);
        assert_eq!(heap.get(cid).unwrap().state, CoroutineState::Ready);
    }

    #[test]
    fn test_close_event_stops_coroutine() {
        let mut heap = Heap::new();
        let cid = heap.create_coroutine("sched-close");
        let router = heap.router();
        coroutine_post_event(
            &router,
            cid,
            ReduceOpt::Keep,
            Variant::Null,
            "close",
            None,
            None,
        )
        .unwrap();
        dispatch_msg(&mut heap);
        assert_eq!(heap.get(cid).unwrap().state, CoroutineState::Stopped);
    }

    #[test]
    fn test_exception_report_stops_and_posts() {
        let mut heap = Heap::new();
        let cid = heap.create_coroutine("sched-exc");
        report_coroutine_exception(&mut heap, cid, "badValue");
        let co = heap.get(cid).unwrap();
        assert_eq!(co.state, CoroutineState::Stopped);
        let msg = co.mq.get().unwrap();
        assert_eq!(msg.event_name_str(), Some("exception:badValue"));
    }

    #[test]
    fn test_conn_handler_translates_dom_target() {
        let mut heap = Heap::new();
        let cid = heap.create_coroutine("sched-conn");
        heap.get_mut(cid).unwrap().target_dom_handle = 0xD00D;

        let mut msg = Message::event(MsgTarget::Dom, 0xD00D, None, "change", None);
        msg.element_type = crate::message::ElementType::Handle;
        conn_event_handler(&mut heap, msg);

        let co = heap.get(cid).unwrap();
        let delivered = co.mq.get().unwrap();
        assert_eq!(delivered.target, MsgTarget::Coroutine);
        assert_eq!(delivered.target_value, cid.id() as u64);
        // The discovered source identity rides along.
        assert_eq!(
            delivered.source_uri.unwrap().as_str(),
            Some(co.uri.as_str())
        );
    }

    #[test]
    #[should_panic(expected = "request envelope")]
    fn test_request_receipt_is_fatal() {
        let mut heap = Heap::new();
        let cid = heap.create_coroutine("sched-req");
        let mut msg = Message::event(MsgTarget::Coroutine, cid.id() as u64, None, "x", None);
        msg.msg_type = MsgType::Request;
        let co = heap.get_mut(cid).unwrap();
        dispatch_coroutine_msg(co, msg);
    }
}
