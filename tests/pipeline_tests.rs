//! # Call Pipeline Tests
//!
//! Drives filtered calls end to end on a paused tokio clock: bounded retries,
//! cancellation, message pumping while blocked, and reentrant cross-process
//! callbacks.

#![cfg(not(feature = "loom_test"))]

use callgate::{
    CallFilter, CallKind, CallOutcome, CallRequest, Callee, Disposition, FilterConfig, GateError,
    InterfaceInfo, PendingKind, PendingMessage, RejectKind, ThreadId, Ticks, Transport,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Rejects the first `rejections` attempts, then echoes the payload.
struct FlakyCallee {
    remaining: Mutex<u32>,
    kind: RejectKind,
}

impl FlakyCallee {
    fn new(rejections: u32, kind: RejectKind) -> Arc<Self> {
        Arc::new(Self {
            remaining: Mutex::new(rejections),
            kind,
        })
    }
}

impl Callee for FlakyCallee {
    fn thread(&self) -> ThreadId {
        ThreadId(900)
    }

    fn deliver(&self, request: &CallRequest, _elapsed: Ticks) -> CallOutcome {
        let mut remaining = self.remaining.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return CallOutcome::Rejected(self.kind);
        }
        CallOutcome::Accepted(request.payload.clone())
    }
}

fn config(window_ms: u64, delay_ms: u64) -> FilterConfig {
    FilterConfig {
        max_retry_duration_ms: window_ms,
        retry_delay_ms: delay_ms,
        ..FilterConfig::default()
    }
}

fn request(payload: &[u8]) -> CallRequest {
    CallRequest::new(ThreadId(1), payload.to_vec())
}

/// A callee that is busy for a few attempts is retried until it accepts.
#[tokio::test(start_paused = true)]
async fn test_transient_rejection_is_retried() {
    let transport = Transport::new(ThreadId(1));
    let handle = transport.register(config(5000, 20)).unwrap();
    let (mut pipeline, _tx) = transport.pipeline(FlakyCallee::new(3, RejectKind::Busy));

    let start = tokio::time::Instant::now();
    let reply = pipeline.invoke(request(b"print")).await.unwrap();

    assert_eq!(reply, b"print".to_vec());
    assert!(
        start.elapsed() >= Duration::from_millis(60),
        "three retries wait three delays"
    );
    transport.unregister(handle).unwrap();
}

/// A callee that never accepts is cancelled once the retry window is spent.
#[tokio::test(start_paused = true)]
async fn test_persistent_rejection_exhausts_window() {
    let transport = Transport::new(ThreadId(1));
    let handle = transport.register(config(1000, 50)).unwrap();
    let callee = FlakyCallee::new(u32::MAX, RejectKind::NotResponding);
    let (mut pipeline, _tx) = transport.pipeline(callee);

    let err = pipeline.invoke(request(b"x")).await.unwrap_err();
    match err {
        GateError::RetriesExhausted { elapsed_ms } => {
            assert!(elapsed_ms >= 1000, "cancelled early at {elapsed_ms}ms");
            assert!(elapsed_ms < 1100, "retried past the window: {elapsed_ms}ms");
        }
        other => panic!("unexpected error: {other}"),
    }
    transport.unregister(handle).unwrap();
}

/// With a zero window the first rejection fails the call without waiting.
#[tokio::test(start_paused = true)]
async fn test_zero_window_fails_first_rejection() {
    let transport = Transport::new(ThreadId(1));
    let handle = transport.register(config(0, 50)).unwrap();
    let (mut pipeline, _tx) = transport.pipeline(FlakyCallee::new(1, RejectKind::Busy));

    let start = tokio::time::Instant::now();
    let err = pipeline.invoke(request(b"x")).await.unwrap_err();
    assert!(matches!(err, GateError::RetriesExhausted { elapsed_ms: 0 }));
    assert_eq!(start.elapsed(), Duration::ZERO);
    transport.unregister(handle).unwrap();
}

/// With no filter installed the transport default fails rejected calls immediately.
#[tokio::test(start_paused = true)]
async fn test_unfiltered_transport_does_not_retry() {
    let transport = Transport::new(ThreadId(1));
    let (mut pipeline, _tx) = transport.pipeline(FlakyCallee::new(1, RejectKind::Busy));
    let err = pipeline.invoke(request(b"x")).await.unwrap_err();
    assert!(matches!(err, GateError::RetriesExhausted { .. }));
}

/// Messages queued for the blocked caller are pumped during the retry wait.
#[tokio::test(start_paused = true)]
async fn test_pending_messages_are_pumped_while_waiting() {
    let transport = Transport::new(ThreadId(1));
    let handle = transport.register(config(5000, 50)).unwrap();
    let pumped = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&pumped);
    let (pipeline, tx) = transport.pipeline(FlakyCallee::new(1, RejectKind::Busy));
    let mut pipeline = pipeline.with_pump(move |msg| sink.lock().unwrap().push(msg));

    tx.send(PendingMessage::new(PendingKind::TopLevel, b"paint".to_vec()))
        .unwrap();
    tx.send(PendingMessage::new(PendingKind::Nested, b"input".to_vec()))
        .unwrap();

    let reply = pipeline.invoke(request(b"job")).await.unwrap();
    assert_eq!(reply, b"job".to_vec());

    let pumped = pumped.lock().unwrap();
    assert_eq!(pumped.len(), 2);
    assert_eq!(pumped[0].payload, b"paint".to_vec());
    assert_eq!(pumped[1].payload, b"input".to_vec());
    assert!(pipeline.take_backlog().is_empty());
    transport.unregister(handle).unwrap();
}

/// With pumping disabled, queued messages are held back and handed out afterwards.
#[tokio::test(start_paused = true)]
async fn test_pending_messages_held_when_pumping_disabled() {
    let transport = Transport::new(ThreadId(1));
    let handle = transport
        .register(FilterConfig {
            pump_while_blocked: false,
            ..config(5000, 50)
        })
        .unwrap();
    let (pipeline, tx) = transport.pipeline(FlakyCallee::new(2, RejectKind::Busy));
    let mut pipeline = pipeline.with_pump(|msg| panic!("pumped {msg:?} with pumping disabled"));

    let paint = PendingMessage::new(PendingKind::TopLevel, b"paint".to_vec());
    tx.send(paint.clone()).unwrap();
    pipeline.invoke(request(b"job")).await.unwrap();

    assert_eq!(pipeline.take_backlog(), vec![paint]);
    transport.unregister(handle).unwrap();
}

/// Keeps retrying every 10ms and answers message notifications from a script,
/// falling back to `Allow` once the script runs out.
struct ScriptedPending {
    script: Mutex<VecDeque<Disposition>>,
}

impl ScriptedPending {
    fn new(script: impl IntoIterator<Item = Disposition>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
        })
    }
}

impl CallFilter for ScriptedPending {
    fn on_incoming_call(
        &self,
        _: CallKind,
        _: ThreadId,
        _: Ticks,
        _: Option<InterfaceInfo>,
    ) -> Disposition {
        Disposition::Allow
    }

    fn on_rejected_call(&self, _: ThreadId, _: Ticks, _: RejectKind) -> Disposition {
        Disposition::RetryLater(Duration::from_millis(10))
    }

    fn on_message_pending(&self, _: ThreadId, _: Ticks, _: PendingKind) -> Disposition {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Disposition::Allow)
    }
}

/// A `Cancel` from the message-pending path aborts the call and keeps the message.
#[tokio::test(start_paused = true)]
async fn test_message_pending_cancel_unwinds_call() {
    let filter = ScriptedPending::new([Disposition::Cancel]);
    let (transport, handle) = Transport::with_filter(ThreadId(1), filter).unwrap();
    let callee = FlakyCallee::new(u32::MAX, RejectKind::Busy);
    let (mut pipeline, tx) = transport.pipeline(callee);

    let sender = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(35)).await;
        tx.send(PendingMessage::new(PendingKind::TopLevel, b"quit".to_vec()))
            .unwrap();
        tx
    });

    let err = pipeline.invoke(request(b"x")).await.unwrap_err();
    assert!(matches!(err, GateError::RetriesExhausted { .. }));
    assert_eq!(pipeline.take_backlog().len(), 1);
    let _tx = sender.await.unwrap();
    transport.unregister(handle).unwrap();
}

/// A message the filter held during one wait is offered again at the next wait and
/// pumped once the filter switches to `Allow`.
#[tokio::test(start_paused = true)]
async fn test_held_message_pumped_after_filter_switches_to_allow() {
    let filter = ScriptedPending::new([Disposition::Reject]);
    let (transport, handle) = Transport::with_filter(ThreadId(1), filter).unwrap();
    let pumped = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&pumped);
    let (pipeline, tx) = transport.pipeline(FlakyCallee::new(2, RejectKind::Busy));
    let mut pipeline = pipeline.with_pump(move |msg| sink.lock().unwrap().push(msg));

    let paint = PendingMessage::new(PendingKind::TopLevel, b"paint".to_vec());
    tx.send(paint.clone()).unwrap();

    let reply = pipeline.invoke(request(b"job")).await.unwrap();
    assert_eq!(reply, b"job".to_vec());
    assert_eq!(*pumped.lock().unwrap(), vec![paint]);
    assert!(pipeline.take_backlog().is_empty());
    transport.unregister(handle).unwrap();
}

/// A `Cancel` while re-offering held messages leaves the backlog oldest first.
#[tokio::test(start_paused = true)]
async fn test_cancel_during_reoffer_keeps_backlog_order() {
    let filter = ScriptedPending::new([
        Disposition::Reject,
        Disposition::Reject,
        Disposition::Cancel,
    ]);
    let (transport, handle) = Transport::with_filter(ThreadId(1), filter).unwrap();
    let callee = FlakyCallee::new(u32::MAX, RejectKind::Busy);
    let (mut pipeline, tx) = transport.pipeline(callee);

    let first = PendingMessage::new(PendingKind::TopLevel, b"first".to_vec());
    let second = PendingMessage::new(PendingKind::Nested, b"second".to_vec());
    tx.send(first.clone()).unwrap();
    tx.send(second.clone()).unwrap();

    let err = pipeline.invoke(request(b"x")).await.unwrap_err();
    assert!(matches!(err, GateError::RetriesExhausted { .. }));
    assert_eq!(pipeline.take_backlog(), vec![first, second]);
    transport.unregister(handle).unwrap();
}

/// Process B rejects a nested callback from A while B waits on A; A keeps retrying
/// until B's outgoing call returns, then the callback goes through.
#[tokio::test(start_paused = true)]
async fn test_reentrant_callback_clears_after_outgoing_call() {
    let a = Transport::new(ThreadId(1));
    let a_handle = a.register(config(2000, 25)).unwrap();

    let b = Transport::new(ThreadId(2));
    let b_handle = b
        .register(FilterConfig {
            reject_reentrant_calls: true,
            ..FilterConfig::default()
        })
        .unwrap();
    let b_endpoint = b.endpoint(|req: &CallRequest| {
        let mut reply = b"ok:".to_vec();
        reply.extend_from_slice(&req.payload);
        reply
    });

    let (mut pipeline, _tx) = a.pipeline(Arc::clone(&b_endpoint));
    let guard = b_endpoint.enter_outgoing(ThreadId(1));

    let (reply, _) = tokio::join!(pipeline.invoke(request(b"status")), async move {
        tokio::time::sleep(Duration::from_millis(120)).await;
        drop(guard);
    });

    assert_eq!(reply.unwrap(), b"ok:status".to_vec());
    a.unregister(a_handle).unwrap();
    b.unregister(b_handle).unwrap();
}

/// A pipeline call marks its caller as blocked: B calling back into A while A's call
/// to B is in flight is a nested call, and A's reentrancy policy refuses it.
#[tokio::test(start_paused = true)]
async fn test_callback_during_pipeline_call_is_nested() {
    let a = Transport::new(ThreadId(1));
    let a_handle = a
        .register(FilterConfig {
            reject_reentrant_calls: true,
            ..FilterConfig::default()
        })
        .unwrap();
    let a_endpoint = a.endpoint(|req: &CallRequest| req.payload.clone());

    let b = Transport::new(ThreadId(2));
    let callbacks = Arc::new(Mutex::new(Vec::new()));
    let b_endpoint = {
        let a_endpoint = Arc::clone(&a_endpoint);
        let callbacks = Arc::clone(&callbacks);
        b.endpoint(move |req: &CallRequest| {
            let callback = CallRequest::new(ThreadId(2), b"callback".to_vec());
            callbacks.lock().unwrap().push(a_endpoint.deliver(&callback, 0));
            req.payload.clone()
        })
    };

    let (mut pipeline, _tx) = a.pipeline(b_endpoint);
    assert!(!a.is_blocked());
    let reply = pipeline.invoke(request(b"render")).await.unwrap();
    assert_eq!(reply, b"render".to_vec());
    assert!(!a.is_blocked());

    assert_eq!(
        *callbacks.lock().unwrap(),
        vec![CallOutcome::Rejected(RejectKind::Busy)]
    );
    // Once the call has returned the same callback is a top-level call again.
    let callback = CallRequest::new(ThreadId(2), b"callback".to_vec());
    assert_eq!(
        a_endpoint.deliver(&callback, 0),
        CallOutcome::Accepted(b"callback".to_vec())
    );
    a.unregister(a_handle).unwrap();
}

/// A shutting-down callee is retried only until the window closes.
#[tokio::test(start_paused = true)]
async fn test_shutting_down_callee_is_cancelled() {
    let a = Transport::new(ThreadId(1));
    let handle = a.register(config(300, 100)).unwrap();
    let b = Transport::new(ThreadId(2));
    let endpoint = b.endpoint(|req: &CallRequest| req.payload.clone());
    endpoint.begin_shutdown();

    let (mut pipeline, _tx) = a.pipeline(endpoint);
    let err = pipeline.invoke(request(b"x")).await.unwrap_err();
    assert!(matches!(err, GateError::RetriesExhausted { elapsed_ms } if elapsed_ms >= 300));
    a.unregister(handle).unwrap();
}
