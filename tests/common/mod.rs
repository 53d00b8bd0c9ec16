//! In-process memcache server for tests
//!
//! Speaks the binary protocol through the crate's own codec. Each accepted
//! connection gets an index so a handler can misbehave on the first
//! connection and answer normally after the client reconnects.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use memcast::protocol::{
    encode_response, read_request, Opcode, RequestHeader, ResponseHeader, Status,
};

/// A request as seen by the server
#[derive(Debug, Clone)]
pub struct Incoming {
    /// Index of the connection it arrived on, from 0
    pub connection: usize,
    pub header: RequestHeader,
    pub extra: Bytes,
    pub key: Bytes,
    pub value: Bytes,
}

/// What the server does with a request
pub enum Reply {
    /// Write these bytes back
    Respond(Bytes),
    /// Say nothing and keep reading
    Hold,
    /// Drop the connection
    Close,
}

type Handler = dyn Fn(&Incoming) -> Reply + Send + Sync;

pub struct MockServer {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<Incoming>>>,
    connections: Arc<AtomicUsize>,
    streams: Arc<Mutex<Vec<TcpStream>>>,
    stopped: Arc<AtomicBool>,
}

impl MockServer {
    /// Start a server answering with `handler`
    pub fn start<H>(handler: H) -> Self
    where
        H: Fn(&Incoming) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = MockServer {
            addr,
            received: Arc::new(Mutex::new(Vec::new())),
            connections: Arc::new(AtomicUsize::new(0)),
            streams: Arc::new(Mutex::new(Vec::new())),
            stopped: Arc::new(AtomicBool::new(false)),
        };

        let handler: Arc<Handler> = Arc::new(handler);
        let received = Arc::clone(&server.received);
        let connections = Arc::clone(&server.connections);
        let streams = Arc::clone(&server.streams);
        let stopped = Arc::clone(&server.stopped);

        thread::spawn(move || {
            for stream in listener.incoming() {
                if stopped.load(Ordering::SeqCst) {
                    break;
                }
                let Ok(stream) = stream else { continue };
                let index = connections.fetch_add(1, Ordering::SeqCst);
                streams.lock().unwrap().push(stream.try_clone().unwrap());

                let handler = Arc::clone(&handler);
                let received = Arc::clone(&received);
                thread::spawn(move || serve(stream, index, handler, received));
            }
        });

        server
    }

    /// A server with plain get/set/delete/noop semantics
    pub fn memcached() -> Self {
        let store = Store::default();
        Self::start(move |incoming| store.reply(incoming))
    }

    pub fn endpoint(&self) -> String {
        self.addr.to_string()
    }

    /// Connections accepted so far
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<Incoming> {
        self.received.lock().unwrap().clone()
    }

    /// Wait until `predicate` holds for the received requests
    pub fn wait_for<F>(&self, timeout: Duration, predicate: F) -> bool
    where
        F: Fn(&[Incoming]) -> bool,
    {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if predicate(&self.received.lock().unwrap()) {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        for stream in self.streams.lock().unwrap().drain(..) {
            let _ = stream.shutdown(Shutdown::Both);
        }
        // Unblock the accept loop
        let _ = TcpStream::connect(self.addr);
    }
}

fn serve(
    mut stream: TcpStream,
    connection: usize,
    handler: Arc<Handler>,
    received: Arc<Mutex<Vec<Incoming>>>,
) {
    let mut reader = stream.try_clone().unwrap();
    loop {
        let Ok((header, extra, key, value)) = read_request(&mut reader) else {
            return;
        };
        let incoming = Incoming {
            connection,
            header,
            extra,
            key,
            value,
        };
        received.lock().unwrap().push(incoming.clone());

        match handler(&incoming) {
            Reply::Respond(bytes) => {
                if stream.write_all(&bytes).is_err() {
                    return;
                }
            }
            Reply::Hold => {}
            Reply::Close => {
                let _ = stream.shutdown(Shutdown::Both);
                return;
            }
        }
    }
}

// =============================================================================
// Response Helpers
// =============================================================================

/// Response echoing the opcode and opaque of `incoming`
pub fn respond(incoming: &Incoming, status: Status, extra: &[u8], value: &[u8]) -> Bytes {
    let mut header = ResponseHeader::new(incoming.header.opcode, status);
    header.opaque = incoming.header.opaque;
    encode_response(header, extra, &[], value).expect("encodable response")
}

/// Successful GET response carrying `flags`
pub fn get_hit(incoming: &Incoming, flags: u32, value: &[u8]) -> Bytes {
    respond(incoming, Status::NoError, &flags.to_be_bytes(), value)
}

/// Plain NoError answer
pub fn ok(incoming: &Incoming) -> Reply {
    Reply::Respond(respond(incoming, Status::NoError, &[], &[]))
}

#[derive(Default, Clone)]
struct Store {
    items: Arc<Mutex<HashMap<Bytes, (u32, Bytes)>>>,
}

impl Store {
    fn reply(&self, incoming: &Incoming) -> Reply {
        let mut items = self.items.lock().unwrap();
        let bytes = match incoming.header.opcode {
            Opcode::Get => match items.get(&incoming.key) {
                Some((flags, value)) => get_hit(incoming, *flags, value),
                None => respond(incoming, Status::KeyNotFound, &[], b"Not found"),
            },
            Opcode::Set => {
                let flags = if incoming.extra.len() >= 4 {
                    u32::from_be_bytes([
                        incoming.extra[0],
                        incoming.extra[1],
                        incoming.extra[2],
                        incoming.extra[3],
                    ])
                } else {
                    0
                };
                items.insert(incoming.key.clone(), (flags, incoming.value.clone()));
                respond(incoming, Status::NoError, &[], &[])
            }
            Opcode::Delete => match items.remove(&incoming.key) {
                Some(_) => respond(incoming, Status::NoError, &[], &[]),
                None => respond(incoming, Status::KeyNotFound, &[], &[]),
            },
            Opcode::NoOp | Opcode::SaslAuth => respond(incoming, Status::NoError, &[], &[]),
            _ => respond(incoming, Status::UnknownCommand, &[], &[]),
        };
        Reply::Respond(bytes)
    }
}
