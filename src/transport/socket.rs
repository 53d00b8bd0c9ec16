//! TCP transport
//!
//! Blocking sockets driven by two threads per connection.

use std::io::BufReader;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

use crossbeam::channel::{self, select, Receiver, Sender};
use parking_lot::Mutex;

use super::{
    Admission, PendingRequest, PendingRequests, ResetGate, Transport, TransportOwner,
    TransportSettings, TransportState,
};
use crate::auth::Authenticator;
use crate::config::RequeuePolicy;
use crate::error::{MemcastError, Result};
use crate::events::TransportObservers;
use crate::protocol::{
    encode_request, read_response, write_request, Opcode, RequestHeader, Response, Status,
};
use crate::request::Request;

/// Transport over a blocking `TcpStream`
pub struct SocketTransport {
    shared: Arc<Shared>,
}

/// A live connection and the handles needed to stop its loops
struct Connection {
    stream: TcpStream,

    /// Dropped to stop the send loop
    stop: Sender<()>,

    pending: Arc<PendingRequests>,
}

impl Connection {
    /// Unblocks both loops: the socket read/write fail, admission is
    /// refused and the send loop sees `stop` disconnect.
    fn shutdown(self) {
        let _ = self.stream.shutdown(Shutdown::Both);
        self.pending.close();
        drop(self.stop);
    }
}

/// Result of one teardown-and-connect attempt
enum Restart {
    Connected,
    /// A reconnect thread now holds the reset gate
    Retrying,
    Abandoned,
}

struct Shared {
    endpoint: String,
    settings: TransportSettings,

    /// Node queue, shared with the node's other transports
    requests: Receiver<Arc<dyn Request>>,

    owner: Weak<dyn TransportOwner>,
    authenticator: Option<Arc<dyn Authenticator>>,
    observers: Arc<TransportObservers>,

    state: Mutex<TransportState>,
    connection: Mutex<Option<Connection>>,

    /// Registry of the current connection, swapped on reset
    pending: Mutex<Arc<PendingRequests>>,

    /// Registries retired by resets, drained after the next connect
    orphans: Mutex<Vec<Arc<PendingRequests>>>,

    gate: ResetGate,

    /// Incremented for every installed connection
    epoch: AtomicU64,

    /// Highest epoch whose connection failed
    faulted: AtomicU64,

    next_opaque: AtomicU32,

    /// Dropped on dispose to interrupt reconnect waits
    disposer: Mutex<Option<Sender<()>>>,
    disposed: Receiver<()>,
}

impl SocketTransport {
    /// Create a transport; nothing is connected until `start()`
    pub fn new(
        endpoint: impl Into<String>,
        settings: TransportSettings,
        requests: Receiver<Arc<dyn Request>>,
        owner: Weak<dyn TransportOwner>,
        authenticator: Option<Arc<dyn Authenticator>>,
        observers: Arc<TransportObservers>,
    ) -> Self {
        let (disposer, disposed) = channel::bounded(0);
        let pending = Arc::new(PendingRequests::new(
            settings.queue_capacity,
            settings.queue_timeout,
        ));

        Self {
            shared: Arc::new(Shared {
                endpoint: endpoint.into(),
                settings,
                requests,
                owner,
                authenticator,
                observers,
                state: Mutex::new(TransportState::Disconnected),
                connection: Mutex::new(None),
                pending: Mutex::new(pending),
                orphans: Mutex::new(Vec::new()),
                gate: ResetGate::new(),
                epoch: AtomicU64::new(0),
                faulted: AtomicU64::new(0),
                next_opaque: AtomicU32::new(1),
                disposer: Mutex::new(Some(disposer)),
                disposed,
            }),
        }
    }

    /// Requests retired by resets and not yet redispatched
    pub fn orphaned_count(&self) -> usize {
        self.shared
            .orphans
            .lock()
            .iter()
            .map(|registry| registry.len())
            .sum()
    }
}

impl Transport for SocketTransport {
    fn endpoint(&self) -> &str {
        &self.shared.endpoint
    }

    fn state(&self) -> TransportState {
        *self.shared.state.lock()
    }

    fn start(&self) {
        let shared = &self.shared;
        if !shared.needs_recovery() || !shared.gate.try_begin() {
            return;
        }

        // Connecting and authenticating stay off the caller's thread
        let worker = Arc::clone(shared);
        let spawned = thread::Builder::new()
            .name(format!("memcast-connect-{}", shared.endpoint))
            .spawn(move || worker.recover_holding_gate());
        if let Err(e) = spawned {
            tracing::error!("Cannot start connecting to {}: {}", shared.endpoint, e);
            shared.recover_holding_gate();
        }
    }

    fn pending_count(&self) -> usize {
        self.shared.pending.lock().len()
    }

    fn dispose(&self) {
        self.shared.dispose();
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        self.shared.dispose();
    }
}

impl Shared {
    // =========================================================================
    // Reset State Machine
    // =========================================================================

    /// The current connection is missing or has failed
    fn needs_recovery(&self) -> bool {
        !self.gate.is_disposed()
            && self.faulted.load(Ordering::SeqCst) >= self.epoch.load(Ordering::SeqCst)
    }

    /// Rebuild the connection if needed
    ///
    /// Safe to call from any thread at any time. Only the gate holder
    /// works; a fault recorded while the gate is held is picked up by the
    /// holder's re-check after releasing it.
    fn recover(self: &Arc<Self>) {
        while self.needs_recovery() && self.gate.try_begin() {
            if !self.recover_step() {
                return;
            }
        }
    }

    /// `recover` for a caller that already took the gate
    fn recover_holding_gate(self: &Arc<Self>) {
        if self.recover_step() {
            self.recover();
        }
    }

    /// One reset under the gate; false once the gate is handed to a
    /// reconnect thread or the transport is gone
    fn recover_step(self: &Arc<Self>) -> bool {
        if !self.needs_recovery() {
            self.gate.finish();
            return true;
        }

        match self.restart() {
            Restart::Connected => {
                self.gate.finish();
                self.drain_orphans();
                true
            }
            Restart::Retrying => false,
            Restart::Abandoned => {
                self.gate.finish();
                false
            }
        }
    }

    /// Record a loop failure and reset the connection of `epoch`
    fn fault(self: &Arc<Self>, epoch: u64, error: MemcastError) {
        if self.gate.is_disposed() {
            return;
        }
        let previous = self.faulted.fetch_max(epoch, Ordering::SeqCst);
        if previous >= epoch {
            // Torn down already, this is the other loop noticing.
            return;
        }

        tracing::warn!("Transport to {} failed: {}", self.endpoint, error);
        self.report_error(&error);
        self.recover();
    }

    /// Tear down, retire the registry, then connect once
    fn restart(self: &Arc<Self>) -> Restart {
        let previous = self.connection.lock().take();
        if let Some(connection) = previous {
            self.set_state(TransportState::Resetting);
            connection.shutdown();
            self.notify_owner(|owner| owner.transport_failed(&self.endpoint));
        }

        let fresh = Arc::new(PendingRequests::new(
            self.settings.queue_capacity,
            self.settings.queue_timeout,
        ));
        let retired = std::mem::replace(&mut *self.pending.lock(), fresh);
        retired.close();
        if self.settings.dead_policy == RequeuePolicy::Requeue {
            // Requeued requests need a live transport to pick them up
            if !retired.is_empty() {
                tracing::debug!(
                    "Retiring {} in-flight requests of {}",
                    retired.len(),
                    self.endpoint
                );
                self.orphans.lock().push(retired);
            }
        } else {
            let failed = retired.drain_all();
            if !failed.is_empty() {
                tracing::debug!(
                    "Failing {} in-flight requests of {}",
                    failed.len(),
                    self.endpoint
                );
            }
            for request in failed {
                request.fail();
            }
        }
        self.set_state(TransportState::Disconnected);

        if self.gate.is_disposed() {
            self.fail_orphans();
            return Restart::Abandoned;
        }

        match self.connect() {
            Ok(()) => Restart::Connected,
            Err(MemcastError::Disposed) => Restart::Abandoned,
            Err(e) => {
                tracing::warn!("Cannot connect to {}: {}", self.endpoint, e);
                self.report_error(&e);
                self.notify_owner(|owner| owner.transport_failed(&self.endpoint));
                self.spawn_reconnect()
            }
        }
    }

    fn spawn_reconnect(self: &Arc<Self>) -> Restart {
        let shared = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("memcast-reconnect-{}", self.endpoint))
            .spawn(move || shared.reconnect_loop());

        match spawned {
            Ok(_) => Restart::Retrying,
            Err(e) => {
                tracing::error!(
                    "Cannot schedule reconnection to {}: {}",
                    self.endpoint,
                    e
                );
                Restart::Abandoned
            }
        }
    }

    /// Timed retries; runs while holding the reset gate
    fn reconnect_loop(self: Arc<Self>) {
        let mut attempt = 0;
        loop {
            if !self.settings.reconnect.wait(attempt, &self.disposed) {
                return;
            }
            attempt += 1;

            match self.connect() {
                Ok(()) => {
                    tracing::info!(
                        "Reconnected to {} after {} attempts",
                        self.endpoint,
                        attempt
                    );
                    self.gate.finish();
                    self.drain_orphans();
                    self.recover();
                    return;
                }
                Err(MemcastError::Disposed) => return,
                Err(e) => {
                    tracing::debug!(
                        "Reconnect attempt {} to {} failed: {}",
                        attempt,
                        self.endpoint,
                        e
                    );
                    self.report_error(&e);
                }
            }
        }
    }

    // =========================================================================
    // Connection Establishment
    // =========================================================================

    fn connect(self: &Arc<Self>) -> Result<()> {
        self.set_state(TransportState::Connecting);

        let result = self
            .open_stream()
            .and_then(|stream| {
                self.authenticate(&stream)?;
                Ok(stream)
            })
            .and_then(|stream| self.install(stream));

        if result.is_err() {
            self.set_state(TransportState::Disconnected);
        }
        result
    }

    fn open_stream(&self) -> Result<TcpStream> {
        let addrs = self.endpoint.to_socket_addrs().map_err(|e| {
            MemcastError::Transport(format!("Invalid address '{}': {}", self.endpoint, e))
        })?;

        // Try each resolved address until one succeeds
        let mut last_err = None;
        for addr in addrs {
            let attempt = match self.settings.socket_timeout {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => {
                    // Disable Nagle's algorithm, requests are small and pipelined
                    stream.set_nodelay(true)?;
                    stream.set_write_timeout(self.settings.socket_timeout)?;
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(MemcastError::Transport(format!(
            "Failed to connect to {}: {}",
            self.endpoint,
            last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no address resolved".to_string())
        )))
    }

    /// One SASL round trip before the loops start
    fn authenticate(&self, stream: &TcpStream) -> Result<()> {
        let Some(authenticator) = &self.authenticator else {
            return Ok(());
        };

        let token = authenticator.create_token()?;
        let packet = encode_request(
            RequestHeader::new(Opcode::SaslAuth),
            &[],
            token.mechanism.as_bytes(),
            &token.payload,
        )?;

        let mut io = stream;
        write_request(&mut io, &packet)?;
        stream.set_read_timeout(self.settings.socket_timeout)?;
        let response = read_response(&mut io)?;
        stream.set_read_timeout(None)?;

        match response.header.status {
            Status::NoError => {
                tracing::debug!(
                    "Authenticated to {} with {}",
                    self.endpoint,
                    token.mechanism
                );
                Ok(())
            }
            status => Err(MemcastError::Authentication(format!(
                "{} rejected {} authentication: {:?}",
                self.endpoint, token.mechanism, status
            ))),
        }
    }

    /// Start the loops on a connected stream
    fn install(self: &Arc<Self>, stream: TcpStream) -> Result<()> {
        let mut slot = self.connection.lock();
        if self.gate.is_disposed() {
            let _ = stream.shutdown(Shutdown::Both);
            return Err(MemcastError::Disposed);
        }

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let pending = Arc::clone(&*self.pending.lock());
        let (stop, stopped) = channel::bounded::<()>(0);

        let writer = stream.try_clone()?;
        let reader = stream.try_clone()?;

        let shared = Arc::clone(self);
        let registry = Arc::clone(&pending);
        thread::Builder::new()
            .name(format!("memcast-send-{}", self.endpoint))
            .spawn(move || shared.send_loop(writer, registry, stopped, epoch))?;

        let shared = Arc::clone(self);
        let registry = Arc::clone(&pending);
        thread::Builder::new()
            .name(format!("memcast-recv-{}", self.endpoint))
            .spawn(move || shared.receive_loop(reader, registry, epoch))?;

        *slot = Some(Connection {
            stream,
            stop,
            pending,
        });
        drop(slot);

        self.set_state(TransportState::Running);
        tracing::debug!("Connected to {} (epoch {})", self.endpoint, epoch);
        self.notify_owner(|owner| owner.transport_ready(&self.endpoint));
        Ok(())
    }

    // =========================================================================
    // Loops
    // =========================================================================

    fn send_loop(
        self: Arc<Self>,
        mut writer: TcpStream,
        pending: Arc<PendingRequests>,
        stopped: Receiver<()>,
        epoch: u64,
    ) {
        loop {
            let request = select! {
                recv(self.requests) -> request => match request {
                    Ok(request) => request,
                    Err(_) => {
                        tracing::debug!("Request queue of {} closed", self.endpoint);
                        return;
                    }
                },
                recv(stopped) -> _ => return,
            };

            let opaque = self.next_opaque.fetch_add(1, Ordering::Relaxed);
            let packet = match request.encode(opaque) {
                Ok(packet) => packet,
                Err(e) => {
                    tracing::warn!("Cannot encode {:?}: {}", request, e);
                    request.fail();
                    continue;
                }
            };

            // Tracked before it is on the wire, so a response can always be matched
            let entry = PendingRequest {
                opaque,
                request: Arc::clone(&request),
            };
            match pending.admit(entry, None) {
                Admission::Admitted => {}
                Admission::Closed => {
                    self.redispatch(request);
                    return;
                }
                rejected => {
                    tracing::warn!(
                        "{} rejected {:?}: {:?}",
                        self.endpoint,
                        request.opcode(),
                        rejected
                    );
                    request.fail();
                    continue;
                }
            }

            if let Err(e) = write_request(&mut writer, &packet) {
                self.fault(epoch, e);
                return;
            }
            request.record_send();
            tracing::trace!(
                "Sent {:?} (opaque {}) to {}",
                request.opcode(),
                opaque,
                self.endpoint
            );
        }
    }

    fn receive_loop(self: Arc<Self>, stream: TcpStream, pending: Arc<PendingRequests>, epoch: u64) {
        let mut reader = BufReader::new(stream);
        loop {
            let result =
                read_response(&mut reader).and_then(|response| self.dispatch(&pending, response));
            if let Err(e) = result {
                self.fault(epoch, e);
                return;
            }
        }
    }

    /// Hand a response to the request at the head of the registry
    fn dispatch(&self, pending: &PendingRequests, response: Response) -> Result<()> {
        let header = response.header;
        if header.opcode.is_quiet() {
            return Err(MemcastError::Protocol(format!(
                "Received a response for quiet opcode {:?}",
                header.opcode
            )));
        }

        let request = match pending.try_match(header.opaque) {
            Ok(request) => request,
            Err(unmatched) => {
                let (error, request) = unmatched.into_parts();
                if let Some(request) = request {
                    request.fail();
                }
                return Err(error);
            }
        };

        tracing::trace!(
            "Received {:?} {:?} (opaque {}) from {}",
            header.opcode,
            header.status,
            header.opaque,
            self.endpoint
        );
        request.handle_response(&response);

        self.observers
            .notify(|observer| observer.on_response(&self.endpoint, &header));
        if header.status != Status::NoError {
            self.observers
                .notify(|observer| observer.on_memcache_error(&self.endpoint, &header));
        }
        Ok(())
    }

    // =========================================================================
    // Request Disposal
    // =========================================================================

    /// Apply the dead-node policy to a request this transport gave up on
    fn redispatch(&self, request: Arc<dyn Request>) {
        if self.settings.dead_policy == RequeuePolicy::Requeue && !self.gate.is_disposed() {
            if let Some(owner) = self.owner.upgrade() {
                if owner.requeue(Arc::clone(&request)) {
                    return;
                }
            }
        }
        request.fail();
    }

    fn drain_orphans(&self) {
        let orphans = std::mem::take(&mut *self.orphans.lock());
        for registry in orphans {
            let requests = registry.drain_all();
            if !requests.is_empty() {
                tracing::debug!(
                    "Redispatching {} requests orphaned on {}",
                    requests.len(),
                    self.endpoint
                );
            }
            for request in requests {
                self.redispatch(request);
            }
        }
    }

    fn fail_orphans(&self) {
        let orphans = std::mem::take(&mut *self.orphans.lock());
        for registry in orphans {
            for request in registry.drain_all() {
                request.fail();
            }
        }
    }

    fn dispose(&self) {
        if !self.gate.close() {
            return;
        }
        self.disposer.lock().take();

        let connection = self.connection.lock().take();
        if let Some(connection) = connection {
            connection.shutdown();
        }
        self.set_state(TransportState::Disposed);

        let current = Arc::clone(&*self.pending.lock());
        current.close();
        let failed = current.drain_all();
        if !failed.is_empty() {
            tracing::debug!(
                "Failing {} pending requests of disposed transport {}",
                failed.len(),
                self.endpoint
            );
        }
        for request in failed {
            request.fail();
        }
        self.fail_orphans();

        tracing::debug!("Transport to {} disposed", self.endpoint);
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn set_state(&self, next: TransportState) {
        let mut state = self.state.lock();
        if *state != TransportState::Disposed {
            *state = next;
        }
    }

    fn report_error(&self, error: &MemcastError) {
        self.observers
            .notify(|observer| observer.on_transport_error(&self.endpoint, error));
    }

    fn notify_owner<F>(&self, f: F)
    where
        F: FnOnce(&dyn TransportOwner),
    {
        if let Some(owner) = self.owner.upgrade() {
            f(owner.as_ref());
        }
    }
}
