//! End-to-end dispatch scenarios: broadcast fan-out, observer matching,
//! and the full source-to-execution pipeline.

use hvml_core::errors::ErrorCode;
use hvml_core::{Atom, AtomBucket};
use hvml_interp::observer::Observer;
use hvml_interp::vdom::build_vdom;
use hvml_interp::{CoroutineState, Heap, MsgTarget, ReduceOpt, scheduler};
use hvml_variant::vcm::ev::to_expression_variable;
use hvml_variant::{Variant, VcmNode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn msg_atom(s: &str) -> Atom {
    Atom::intern_in(AtomBucket::Msg, s)
}

fn init() {
    hvml_interp::init_once();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn test_broadcast_reaches_every_coroutine_once() {
    init();
    let mut heap = Heap::new();
    let c1 = heap.create_coroutine("bc-one");
    let c2 = heap.create_coroutine("bc-two");

    scheduler::broadcast_event(&heap.router(), Variant::Null, "ping", None, None).unwrap();

    for cid in [c1, c2] {
        let co = heap.get(cid).unwrap();
        assert_eq!(co.mq.len(), 1, "exactly one clone per coroutine");
        let msg = co.mq.get().unwrap();
        assert_eq!(msg.target, MsgTarget::Coroutine);
        assert_eq!(
            msg.target_value,
            cid.id() as u64,
            "the clone is retargeted to its owner"
        );
        assert_eq!(msg.event_name_str(), Some("ping"));
    }
}

static HITS: AtomicUsize = AtomicUsize::new(0);

fn hit_getter(
    _root: Option<&Variant>,
    _args: &[Variant],
    _silently: bool,
) -> Result<Variant, ErrorCode> {
    HITS.fetch_add(1, Ordering::SeqCst);
    Ok(Variant::boolean(true))
}

#[test]
fn test_observer_matched_runs_position_exactly_once() {
    init();
    HITS.store(0, Ordering::SeqCst);

    let mut heap = Heap::new();
    let cid = heap.create_coroutine("obs-once");

    // The observer's position evaluates $probe.hit when its frame runs.
    let root = build_vdom("<hvml><test on=\"$probe.hit\"/></hvml>");
    let pos = root.children[0].clone();
    let scope = Variant::object();
    let probe = Variant::object();
    probe
        .object_set("hit", Variant::dynamic(hit_getter, None))
        .unwrap();
    scope.object_set("probe", probe).unwrap();

    let entity = Variant::string("the-entity");
    heap.get_mut(cid).unwrap().add_observer(
        Observer::new(entity.clone(), msg_atom("change"), Some("attr*".into()))
            .with_pos(pos)
            .with_scope(scope),
    );

    let router = heap.router();
    scheduler::coroutine_post_event(
        &router,
        cid,
        ReduceOpt::Keep,
        entity.clone(),
        "change",
        Some("attrs"),
        Some(Variant::string("payload")),
    )
    .unwrap();
    scheduler::dispatch_msg(&mut heap);
    assert_eq!(HITS.load(Ordering::SeqCst), 1, "matched exactly once");

    // A sub-type the pattern rejects leaves the counter alone.
    scheduler::coroutine_post_event(
        &router,
        cid,
        ReduceOpt::Keep,
        entity,
        "change",
        Some("content"),
        None,
    )
    .unwrap();
    scheduler::dispatch_msg(&mut heap);
    assert_eq!(HITS.load(Ordering::SeqCst), 1);
    assert_eq!(heap.get(cid).unwrap().state, CoroutineState::Ready);
}

static ORDER: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

fn mark_first(
    _root: Option<&Variant>,
    _args: &[Variant],
    _silently: bool,
) -> Result<Variant, ErrorCode> {
    ORDER.lock().unwrap().push("first");
    Ok(Variant::boolean(true))
}

fn mark_second(
    _root: Option<&Variant>,
    _args: &[Variant],
    _silently: bool,
) -> Result<Variant, ErrorCode> {
    ORDER.lock().unwrap().push("second");
    Ok(Variant::boolean(true))
}

#[test]
fn test_observers_fire_in_declaration_order() {
    init();
    ORDER.lock().unwrap().clear();

    let mut heap = Heap::new();
    let cid = heap.create_coroutine("obs-order");
    let entity = Variant::string("ordered");

    // Two observers on the same (entity, type); each frame evaluates a
    // probe that records which observer ran.
    let root = build_vdom("<hvml><test on=\"$probe.mark\"/></hvml>");
    for marker in [mark_first as hvml_variant::DynMethod, mark_second] {
        let scope = Variant::object();
        let probe = Variant::object();
        probe
            .object_set("mark", Variant::dynamic(marker, None))
            .unwrap();
        scope.object_set("probe", probe).unwrap();
        heap.get_mut(cid).unwrap().add_observer(
            Observer::new(entity.clone(), msg_atom("tick"), None)
                .with_pos(root.children[0].clone())
                .with_scope(scope),
        );
    }

    scheduler::coroutine_post_event(
        &heap.router(),
        cid,
        ReduceOpt::Keep,
        entity,
        "tick",
        None,
        None,
    )
    .unwrap();
    scheduler::dispatch_msg(&mut heap);

    assert_eq!(ORDER.lock().unwrap().as_slice(), ["first", "second"]);
}

#[test]
fn test_expression_variable_refreshes_on_observe() {
    init();
    let mut heap = Heap::new();
    let cid = heap.create_coroutine("obs-ev");

    // Bind x into the coroutine's builtins so the expression variable can
    // see it through the installed scope stack.
    {
        let co = heap.get_mut(cid).unwrap();
        co.builtins
            .object_set("x", Variant::string("fresh"))
            .unwrap();
    }

    let ev = to_expression_variable(Arc::new(VcmNode::VarRef("x".into())));
    heap.get_mut(cid)
        .unwrap()
        .add_observer(Observer::new(ev.clone(), msg_atom("change"), None));

    // Registration ran on_observe, which re-evaluated and stored.
    assert_eq!(
        ev.native_property("last_value", &[], false).unwrap(),
        Variant::string("fresh")
    );
}

#[test]
fn test_pipeline_source_to_execution() {
    init();
    let mut heap = Heap::new();
    let cid = heap.create_coroutine("pipeline");

    let root = build_vdom(
        "<hvml><body><init as=\"greeting\" with=\"hello $who\"/><exit/></body></hvml>",
    );
    {
        let co = heap.get_mut(cid).unwrap();
        co.builtins
            .object_set("who", Variant::string("world"))
            .unwrap();
        co.vdom = Some(root.clone());
        co.state = CoroutineState::Run;
        co.push_frame(hvml_interp::StackFrame::new(
            Some(root),
            Variant::object(),
            Default::default(),
        ));
    }

    let co = heap.get_mut(cid).unwrap();
    hvml_interp::coroutine::execute_ready_steps(co);
    // The exit element stopped the program after the init ran.
    assert_eq!(co.state, CoroutineState::Stopped);
}
