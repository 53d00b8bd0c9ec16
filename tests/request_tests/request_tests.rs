//! Tests for request variants
//!
//! These tests verify:
//! - Call-once completion under concurrent responses and failures
//! - GET flag validation
//! - Store extras per mode
//! - Failure paths (fail, dispatched with no acceptance)

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use bytes::Bytes;
use memcast::protocol::{read_request, Opcode, Response, ResponseHeader, Status};
use memcast::request::{
    Completion, DeleteRequest, GetRequest, GetResult, NoOpRequest, Request, StoreMode,
    StoreRequest, StoreResult,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn response(opcode: Opcode, status: Status, extra: &'static [u8], value: &'static [u8]) -> Response {
    let mut header = ResponseHeader::new(opcode, status);
    header.extra_length = extra.len() as u8;
    header.total_body_length = (extra.len() + value.len()) as u32;
    Response {
        header,
        extra: Bytes::from_static(extra),
        key: Bytes::new(),
        value: Bytes::from_static(value),
    }
}

fn capture<T: Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl FnOnce(T) + Send + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |value| sink.lock().unwrap().push(value))
}

// =============================================================================
// Completion Tests
// =============================================================================

#[test]
fn test_completion_fires_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let completion = Completion::new(move |_: u32| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert!(completion.complete(1));
    assert!(!completion.complete(2));
    assert!(completion.is_complete());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_completion_single_winner() {
    for _ in 0..50 {
        let (seen, callback) = capture::<GetResult>();
        let request = Arc::new(GetRequest::new("race", callback));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let request = Arc::clone(&request);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    if i % 2 == 0 {
                        request.handle_response(&response(
                            Opcode::Get,
                            Status::NoError,
                            &[0, 0, 0, 1],
                            b"v",
                        ));
                    } else {
                        request.fail();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}

#[test]
fn test_record_send_counts() {
    let request = GetRequest::new("k", |_| {});
    request.record_send();
    request.record_send();
    assert_eq!(request.sends(), 2);
}

// =============================================================================
// GET Tests
// =============================================================================

#[test]
fn test_get_hit() {
    let (seen, callback) = capture::<GetResult>();
    let request = GetRequest::new("user", callback);

    request.handle_response(&response(Opcode::Get, Status::NoError, &[0, 0, 1, 0], b"alice"));

    let results = seen.lock().unwrap();
    assert_eq!(results[0].status, Status::NoError);
    assert_eq!(results[0].flags, 256);
    assert_eq!(results[0].value.as_deref(), Some(&b"alice"[..]));
    assert_eq!(&results[0].key[..], b"user");
}

#[test]
fn test_get_miss_has_no_value() {
    let (seen, callback) = capture::<GetResult>();
    let request = GetRequest::new("user", callback);

    request.handle_response(&response(Opcode::Get, Status::KeyNotFound, &[], b"Not found"));

    let results = seen.lock().unwrap();
    assert_eq!(results[0].status, Status::KeyNotFound);
    assert_eq!(results[0].value, None);
}

#[test]
fn test_get_success_without_flags_is_internal_error() {
    let (seen, callback) = capture::<GetResult>();
    let request = GetRequest::new("user", callback);

    request.handle_response(&response(Opcode::Get, Status::NoError, &[0, 0], b"alice"));

    let results = seen.lock().unwrap();
    assert_eq!(results[0].status, Status::InternalError);
    assert_eq!(results[0].value, None);
}

#[test]
fn test_get_encode_carries_opaque() {
    let request = GetRequest::new("abc", |_| {});
    let packet = request.encode(77).unwrap();

    let (header, extra, key, value) = read_request(&mut Cursor::new(&packet[..])).unwrap();
    assert_eq!(header.opcode, Opcode::Get);
    assert_eq!(header.opaque, 77);
    assert!(extra.is_empty());
    assert_eq!(&key[..], b"abc");
    assert!(value.is_empty());
}

// =============================================================================
// Store Tests
// =============================================================================

#[test]
fn test_set_encodes_flags_and_expiration() {
    let request = StoreRequest::new(StoreMode::Set, "k", "v", |_| {})
        .flags(0x01020304)
        .expiration(60)
        .cas(9);
    let packet = request.encode(5).unwrap();

    let (header, extra, key, value) = read_request(&mut Cursor::new(&packet[..])).unwrap();
    assert_eq!(header.opcode, Opcode::Set);
    assert_eq!(header.cas, 9);
    assert_eq!(&extra[..], &[1, 2, 3, 4, 0, 0, 0, 60]);
    assert_eq!(&key[..], b"k");
    assert_eq!(&value[..], b"v");
}

#[test]
fn test_append_has_no_extra() {
    let request = StoreRequest::new(StoreMode::Append, "k", "tail", |_| {}).flags(7);
    let packet = request.encode(1).unwrap();

    let (header, extra, _, value) = read_request(&mut Cursor::new(&packet[..])).unwrap();
    assert_eq!(header.opcode, Opcode::Append);
    assert!(extra.is_empty());
    assert_eq!(&value[..], b"tail");
}

#[test]
fn test_store_reports_status_and_cas() {
    let (seen, callback) = capture::<StoreResult>();
    let request = StoreRequest::new(StoreMode::Add, "k", "v", callback);

    let mut reply = response(Opcode::Add, Status::KeyExists, &[], &[]);
    reply.header.cas = 12;
    request.handle_response(&reply);

    assert_eq!(
        seen.lock().unwrap()[0],
        StoreResult {
            status: Status::KeyExists,
            cas: 12
        }
    );
}

// =============================================================================
// Failure Path Tests
// =============================================================================

#[test]
fn test_delete_fail_reports_internal_error() {
    let (seen, callback) = capture::<Status>();
    let request = DeleteRequest::new("gone", callback);

    request.fail();
    request.handle_response(&response(Opcode::Delete, Status::NoError, &[], &[]));

    assert_eq!(*seen.lock().unwrap(), vec![Status::InternalError]);
}

#[test]
fn test_dispatched_to_nobody_fails() {
    let (seen, callback) = capture::<GetResult>();
    let request = GetRequest::new("k", callback);

    request.dispatched(0);

    let results = seen.lock().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, Status::InternalError);
}

#[test]
fn test_dispatched_to_some_waits() {
    let (seen, callback) = capture::<GetResult>();
    let request = GetRequest::new("k", callback);

    request.dispatched(2);

    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn test_noop_failure_echoes_last_opaque() {
    let (seen, callback) = capture::<ResponseHeader>();
    let request = NoOpRequest::new(callback);

    request.encode(41).unwrap();
    request.fail();

    let headers = seen.lock().unwrap();
    assert_eq!(headers[0].opcode, Opcode::NoOp);
    assert_eq!(headers[0].status, Status::InternalError);
    assert_eq!(headers[0].opaque, 41);
}
