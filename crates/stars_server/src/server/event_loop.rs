//! Single-task cooperative adapter.
//!
//! One task multiplexes the listener, pending peer admissions and the
//! readiness of every connection. The [`Router`] is owned by that task, so
//! no state is ever locked. Each socket is touched only through
//! `try_read`/`try_write` after a readiness wait, and library files are read
//! on the blocking pool, which keeps the loop free of blocking calls.
//!
//! A connection whose line needs a resource lookup stops reading until the
//! lookup returns; lines that arrived behind it are held so they reach the
//! router in order.

use futures::future::{AbortHandle, Abortable, Aborted, BoxFuture};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, trace, warn};

use crate::connection::{CloseMode, ConnectionId, LineBuffer, OutboundQueue, PeerHost, ReadOutcome};
use crate::messaging::{Effect, Outbox, Prefetched, Router};
use crate::server::resolver::{resolve_peer, screen_peer};
use crate::server::SessionSettings;
use crate::shutdown::ShutdownState;

/// Completion of one of the per-connection waits.
enum IoEvent {
    Readable(ConnectionId, io::Result<()>),
    Writable(ConnectionId, io::Result<()>),
    Prefetched(ConnectionId, String, Prefetched),
    DrainExpired(ConnectionId),
}

type IoFuture = Abortable<BoxFuture<'static, IoEvent>>;

/// A peer that passed resolution and the host check, ready for the router.
struct Admission {
    stream: TcpStream,
    addr: SocketAddr,
    peer: PeerHost,
    admitted: bool,
}

/// Socket-side state of one connection.
struct Session {
    stream: Arc<TcpStream>,
    lines: LineBuffer,
    /// Lines read but not yet handed to the router
    held: VecDeque<String>,
    outbound: OutboundQueue,
    read_wait: Option<AbortHandle>,
    write_wait: Option<AbortHandle>,
    lookup: Option<AbortHandle>,
    drain_deadline: Option<AbortHandle>,
    /// Set by a graceful close: stop reading, close once `outbound` drains.
    closing: bool,
}

impl Session {
    fn cancel_waits(&mut self) {
        for handle in [
            self.read_wait.take(),
            self.write_wait.take(),
            self.lookup.take(),
            self.drain_deadline.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}

pub(crate) struct EventLoop {
    router: Router,
    sessions: HashMap<ConnectionId, Session>,
    io: FuturesUnordered<IoFuture>,
    admitting: FuturesUnordered<BoxFuture<'static, Admission>>,
    read_buffer: Vec<u8>,
    settings: SessionSettings,
}

impl EventLoop {
    pub(crate) fn new(router: Router, settings: SessionSettings) -> Self {
        Self {
            router,
            sessions: HashMap::new(),
            io: FuturesUnordered::new(),
            admitting: FuturesUnordered::new(),
            read_buffer: vec![0; settings.read_buffer_size],
            settings,
        }
    }

    /// Runs until `shutdown` is initiated.
    pub(crate) async fn run(mut self, listener: TcpListener, shutdown: ShutdownState) {
        info!("🔁 Event loop running");
        loop {
            tokio::select! {
                _ = shutdown.wait_for_shutdown() => {
                    info!("🛑 Event loop stopping - shutdown initiated");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => self.screen(stream, addr),
                    Err(e) => error!("Failed to accept connection: {}", e),
                },
                Some(admission) = self.admitting.next(), if !self.admitting.is_empty() => {
                    self.admit(admission);
                }
                Some(event) = self.io.next(), if !self.io.is_empty() => match event {
                    Ok(IoEvent::Readable(connection, ready)) => self.on_readable(connection, ready),
                    Ok(IoEvent::Writable(connection, ready)) => self.on_writable(connection, ready),
                    Ok(IoEvent::Prefetched(connection, line, prefetched)) => {
                        self.on_prefetched(connection, line, prefetched)
                    }
                    Ok(IoEvent::DrainExpired(connection)) => self.on_drain_expired(connection),
                    Err(Aborted) => {}
                },
            }
        }

        let dropped = self.sessions.len();
        for session in self.sessions.values_mut() {
            session.cancel_waits();
        }
        self.sessions.clear();
        info!("🧹 Dropped {} connection(s)", dropped);
    }

    /// Resolves and checks a fresh peer off the loop.
    fn screen(&self, stream: TcpStream, addr: SocketAddr) {
        let resolve = self.settings.resolve_hostnames;
        let resources = self.router.resources();
        self.admitting.push(
            async move {
                let peer = resolve_peer(addr, resolve).await;
                let admitted = screen_peer(resources, &peer).await;
                Admission {
                    stream,
                    addr,
                    peer,
                    admitted,
                }
            }
            .boxed(),
        );
    }

    fn admit(&mut self, admission: Admission) {
        let mut out = Outbox::new();
        let connection =
            self.router
                .accept_screened(admission.addr, admission.peer, admission.admitted, &mut out);
        let mut session = Session {
            stream: Arc::new(admission.stream),
            lines: LineBuffer::with_limit(self.settings.max_line_length),
            held: VecDeque::new(),
            outbound: OutboundQueue::new(),
            read_wait: None,
            write_wait: None,
            lookup: None,
            drain_deadline: None,
            closing: false,
        };
        self.arm_read(connection, &mut session);
        self.sessions.insert(connection, session);
        self.apply(out);
    }

    fn arm_read(&self, connection: ConnectionId, session: &mut Session) {
        let stream = session.stream.clone();
        let (handle, registration) = AbortHandle::new_pair();
        let wait = async move { IoEvent::Readable(connection, stream.readable().await) }.boxed();
        self.io.push(Abortable::new(wait, registration));
        session.read_wait = Some(handle);
    }

    fn arm_write(&self, connection: ConnectionId, session: &mut Session) {
        if session.write_wait.is_some() {
            return;
        }
        let stream = session.stream.clone();
        let (handle, registration) = AbortHandle::new_pair();
        let wait = async move { IoEvent::Writable(connection, stream.writable().await) }.boxed();
        self.io.push(Abortable::new(wait, registration));
        session.write_wait = Some(handle);
    }

    fn on_readable(&mut self, connection: ConnectionId, ready: io::Result<()>) {
        let Some(session) = self.sessions.get_mut(&connection) else {
            return;
        };
        session.read_wait = None;

        let outcome = match ready {
            Ok(()) => {
                let result = session.stream.try_read(&mut self.read_buffer);
                ReadOutcome::classify(result, &self.read_buffer)
            }
            Err(e) => ReadOutcome::Fatal(e),
        };

        match outcome {
            ReadOutcome::Data(data) => match session.lines.push(&data) {
                Ok(lines) => session.held.extend(lines),
                Err(e) => {
                    warn!("⚠️ Dropping connection {}: {}", connection, e);
                    let mut out = Outbox::new();
                    out.close(connection, CloseMode::Abort);
                    self.apply(out);
                    return;
                }
            },
            ReadOutcome::WouldBlock => {}
            ReadOutcome::Eof => {
                debug!("Connection {} closed by peer", connection);
                let mut out = Outbox::new();
                out.close(connection, CloseMode::Graceful);
                self.apply(out);
                return;
            }
            ReadOutcome::Fatal(e) => {
                warn!("⚠️ Read failed on connection {}: {}", connection, e);
                let mut out = Outbox::new();
                out.close(connection, CloseMode::Abort);
                self.apply(out);
                return;
            }
        }

        self.dispatch(connection);
    }

    fn on_prefetched(&mut self, connection: ConnectionId, line: String, prefetched: Prefetched) {
        let Some(session) = self.sessions.get_mut(&connection) else {
            return;
        };
        session.lookup = None;

        let mut out = Outbox::new();
        self.router
            .handle_prefetched(connection, &line, Some(prefetched), &mut out);
        self.apply(out);
        self.dispatch(connection);
    }

    /// Hands held lines to the router until one needs a lookup, then waits
    /// for more input if the connection is still reading.
    fn dispatch(&mut self, connection: ConnectionId) {
        let mut out = Outbox::new();
        while let Some(session) = self.sessions.get_mut(&connection) {
            if session.closing || session.lookup.is_some() {
                break;
            }
            let Some(line) = session.held.pop_front() else {
                break;
            };
            trace!("📥 {}: {}", connection, line);

            match self.router.lookup_for(connection, &line) {
                Some(lookup) => {
                    trace!("📚 Connection {} waits for {:?}", connection, lookup);
                    let resources = self.router.resources();
                    let (handle, registration) = AbortHandle::new_pair();
                    let fetch = async move {
                        let prefetched = lookup.run_blocking(resources).await;
                        IoEvent::Prefetched(connection, line, prefetched)
                    }
                    .boxed();
                    self.io.push(Abortable::new(fetch, registration));
                    session.lookup = Some(handle);
                }
                None => self
                    .router
                    .handle_prefetched(connection, &line, None, &mut out),
            }
        }
        self.apply(out);

        // A line may have closed the connection.
        if let Some(mut session) = self.sessions.remove(&connection) {
            if !session.closing && session.lookup.is_none() && session.read_wait.is_none() {
                self.arm_read(connection, &mut session);
            }
            self.sessions.insert(connection, session);
        }
    }

    fn on_writable(&mut self, connection: ConnectionId, ready: io::Result<()>) {
        let Some(session) = self.sessions.get_mut(&connection) else {
            return;
        };
        session.write_wait = None;

        let written = ready.and_then(|()| session.stream.try_write(session.outbound.pending()));
        match written {
            Ok(n) => session.outbound.consume(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => {
                warn!("⚠️ Write failed on connection {}: {}", connection, e);
                let mut out = Outbox::new();
                out.close(connection, CloseMode::Abort);
                self.apply(out);
                return;
            }
        }

        if !session.outbound.is_empty() {
            let mut session = match self.sessions.remove(&connection) {
                Some(session) => session,
                None => return,
            };
            self.arm_write(connection, &mut session);
            self.sessions.insert(connection, session);
        } else if session.closing {
            self.finish(connection);
        }
    }

    fn on_drain_expired(&mut self, connection: ConnectionId) {
        if let Some(session) = self.sessions.get(&connection) {
            warn!(
                "⏱️ Connection {} did not take {} queued byte(s) in {}ms, dropping it",
                connection,
                session.outbound.len(),
                self.settings.drain_timeout.as_millis()
            );
            self.finish(connection);
        }
    }

    /// Carries out router effects, including the notifications produced by
    /// purging closed connections.
    fn apply(&mut self, mut out: Outbox) {
        while !out.is_empty() {
            let effects: Vec<Effect> = out.drain().collect();
            for effect in effects {
                match effect {
                    Effect::Send { to, data } => self.queue(to, &data),
                    Effect::Close { connection, mode } => self.close(connection, mode, &mut out),
                }
            }
        }
    }

    fn queue(&mut self, connection: ConnectionId, data: &str) {
        let Some(mut session) = self.sessions.remove(&connection) else {
            trace!("Dropping output for closed connection {}", connection);
            return;
        };
        if !session.closing {
            session.outbound.push(data);
            self.arm_write(connection, &mut session);
        }
        self.sessions.insert(connection, session);
    }

    fn close(&mut self, connection: ConnectionId, mode: CloseMode, out: &mut Outbox) {
        self.router.disconnect(connection, out);
        let drain_timeout = self.settings.drain_timeout;
        let Some(session) = self.sessions.get_mut(&connection) else {
            return;
        };
        match mode {
            CloseMode::Graceful if !session.outbound.is_empty() => {
                if session.closing {
                    return;
                }
                session.closing = true;
                session.held.clear();
                for handle in [session.read_wait.take(), session.lookup.take()]
                    .into_iter()
                    .flatten()
                {
                    handle.abort();
                }

                let (handle, registration) = AbortHandle::new_pair();
                let deadline = async move {
                    tokio::time::sleep(drain_timeout).await;
                    IoEvent::DrainExpired(connection)
                }
                .boxed();
                self.io.push(Abortable::new(deadline, registration));
                session.drain_deadline = Some(handle);
            }
            _ => self.finish(connection),
        }
    }

    fn finish(&mut self, connection: ConnectionId) {
        if let Some(mut session) = self.sessions.remove(&connection) {
            session.cancel_waits();
            debug!("❌ Connection {} closed", connection);
        }
    }
}
