//! Tests for the pending-request registry and reset gating
//!
//! These tests verify:
//! - Capacity limits with timeout, blocking and cancellation
//! - close() waking blocked admissions
//! - FIFO matching and mismatch handling
//! - Reset gate exclusivity and reconnect timing

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel;
use memcast::request::{GetRequest, Request};
use memcast::transport::{
    Admission, CancelSource, MatchError, PendingRequest, PendingRequests, ReconnectSchedule,
    ResetGate,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn entry(opaque: u32, key: &str) -> PendingRequest {
    let request: Arc<dyn Request> = Arc::new(GetRequest::new(key.to_string(), |_| {}));
    PendingRequest { opaque, request }
}

/// Admit on another thread, reporting the outcome on the returned channel
fn admit_in_background(
    registry: &Arc<PendingRequests>,
    pending: PendingRequest,
    cancel: Option<memcast::transport::CancelToken>,
) -> mpsc::Receiver<Admission> {
    let (tx, rx) = mpsc::channel();
    let registry = Arc::clone(registry);
    thread::spawn(move || {
        let outcome = registry.admit(pending, cancel.as_ref());
        let _ = tx.send(outcome);
    });
    rx
}

// =============================================================================
// Capacity Tests
// =============================================================================

#[test]
fn test_admit_until_full_then_timeout() {
    let registry = PendingRequests::new(2, Some(Duration::from_millis(50)));

    assert_eq!(registry.admit(entry(1, "a"), None), Admission::Admitted);
    assert_eq!(registry.admit(entry(2, "b"), None), Admission::Admitted);

    let start = Instant::now();
    assert_eq!(registry.admit(entry(3, "c"), None), Admission::TimedOut);
    assert!(start.elapsed() >= Duration::from_millis(50));
    assert_eq!(registry.len(), 2);
}

#[test]
fn test_blocked_admission_proceeds_when_slot_frees() {
    let registry = Arc::new(PendingRequests::new(1, None));
    assert!(registry.admit(entry(1, "a"), None).is_admitted());

    let outcome = admit_in_background(&registry, entry(2, "b"), None);
    assert!(outcome.recv_timeout(Duration::from_millis(100)).is_err());

    registry.try_match(1).unwrap();
    assert_eq!(
        outcome.recv_timeout(Duration::from_secs(5)).unwrap(),
        Admission::Admitted
    );
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_cancelled_admission() {
    let registry = Arc::new(PendingRequests::new(1, None));
    assert!(registry.admit(entry(1, "a"), None).is_admitted());

    let source = CancelSource::new();
    let outcome = admit_in_background(&registry, entry(2, "b"), Some(source.token()));
    thread::sleep(Duration::from_millis(20));
    source.cancel();

    assert_eq!(
        outcome.recv_timeout(Duration::from_secs(5)).unwrap(),
        Admission::Cancelled
    );
    assert!(source.token().is_cancelled());
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_close_wakes_blocked_admission() {
    let registry = Arc::new(PendingRequests::new(1, None));
    assert!(registry.admit(entry(1, "a"), None).is_admitted());

    let outcome = admit_in_background(&registry, entry(2, "b"), None);
    thread::sleep(Duration::from_millis(20));
    registry.close();

    assert_eq!(
        outcome.recv_timeout(Duration::from_secs(5)).unwrap(),
        Admission::Closed
    );
    assert!(registry.is_closed());
}

#[test]
fn test_admit_after_close_refused() {
    let registry = PendingRequests::new(0, None);
    registry.close();

    assert_eq!(registry.admit(entry(1, "a"), None), Admission::Closed);
    assert!(registry.is_empty());
}

#[test]
fn test_unbounded_registry() {
    let registry = PendingRequests::new(0, Some(Duration::from_millis(1)));
    for opaque in 0..5000 {
        assert!(registry.admit(entry(opaque, "k"), None).is_admitted());
    }
    assert_eq!(registry.capacity(), None);
    assert_eq!(registry.len(), 5000);
}

#[test]
fn test_capacity_reported() {
    let registry = PendingRequests::new(16, None);
    assert_eq!(registry.capacity(), Some(16));
}

// =============================================================================
// Matching Tests
// =============================================================================

#[test]
fn test_match_in_fifo_order() {
    let registry = PendingRequests::new(8, None);
    for (opaque, key) in [(10, "a"), (11, "b"), (12, "c")] {
        registry.admit(entry(opaque, key), None);
    }

    assert_eq!(registry.try_match(10).unwrap().key(), b"a");
    assert_eq!(registry.try_match(11).unwrap().key(), b"b");
    assert_eq!(registry.try_match(12).unwrap().key(), b"c");
    assert!(registry.is_empty());
}

#[test]
fn test_mismatch_removes_head() {
    let registry = PendingRequests::new(8, None);
    registry.admit(entry(1, "first"), None);
    registry.admit(entry(2, "second"), None);

    match registry.try_match(2) {
        Err(MatchError::Mismatch {
            expected,
            received,
            request,
        }) => {
            assert_eq!(expected, 1);
            assert_eq!(received, 2);
            assert_eq!(request.key(), b"first");
        }
        other => panic!("expected a mismatch, got {:?}", other.map(|r| r.key().to_vec())),
    }
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_match_on_empty_registry() {
    let registry = PendingRequests::new(8, None);

    let err = registry.try_match(5).unwrap_err();
    assert!(matches!(err, MatchError::Empty { received: 5 }));

    let (error, request) = err.into_parts();
    assert!(error.is_protocol());
    assert!(request.is_none());
}

#[test]
fn test_match_frees_slot() {
    let registry = PendingRequests::new(1, Some(Duration::from_millis(10)));
    registry.admit(entry(1, "a"), None);
    registry.try_match(1).unwrap();

    assert!(registry.admit(entry(2, "b"), None).is_admitted());
}

#[test]
fn test_drain_all_oldest_first() {
    let registry = PendingRequests::new(2, Some(Duration::from_millis(10)));
    registry.admit(entry(1, "a"), None);
    registry.admit(entry(2, "b"), None);
    registry.close();

    let drained: Vec<Vec<u8>> = registry
        .drain_all()
        .iter()
        .map(|request| request.key().to_vec())
        .collect();
    assert_eq!(drained, vec![b"a".to_vec(), b"b".to_vec()]);
    assert!(registry.is_empty());
}

// =============================================================================
// Reset Gate Tests
// =============================================================================

#[test]
fn test_gate_single_holder() {
    let gate = ResetGate::new();

    assert!(gate.try_begin());
    assert!(!gate.try_begin());
    assert!(gate.is_resetting());

    gate.finish();
    assert!(gate.try_begin());
}

#[test]
fn test_gate_stays_shut_after_close() {
    let gate = ResetGate::new();

    assert!(gate.close());
    assert!(!gate.close());
    assert!(gate.is_disposed());

    gate.finish();
    assert!(!gate.try_begin());
}

#[test]
fn test_reconnect_schedule_delays() {
    let schedule = ReconnectSchedule::new(Duration::from_millis(10), Duration::from_millis(50));

    assert_eq!(schedule.delay_for(0), Duration::from_millis(10));
    assert_eq!(schedule.delay_for(1), Duration::from_millis(50));
    assert_eq!(schedule.delay_for(7), Duration::from_millis(50));
}

#[test]
fn test_reconnect_wait_interrupted_by_dispose() {
    let schedule = ReconnectSchedule::new(Duration::from_secs(30), Duration::from_secs(30));
    let (stop, stopped) = channel::bounded::<()>(0);

    let waiter = thread::spawn(move || schedule.wait(0, &stopped));
    thread::sleep(Duration::from_millis(20));
    drop(stop);

    assert!(!waiter.join().unwrap());
}
