//! Task-per-connection adapter.
//!
//! Every connection gets a reader task and a writer task. Readers push
//! complete lines onto one queue consumed by the router task; the router
//! answers through each connection's private writer channel. Router state
//! and the worker table sit behind a single mutex, taken once per inbound
//! line, per accept and per supervisor sweep.
//!
//! A supervisor wakes every `supervisor_interval_ms` and reaps connections
//! whose tasks have ended, purging whatever the router still holds for
//! them. A writer told to close gracefully gets `drain_timeout` to flush;
//! after that it is aborted.
//!
//! The router task runs resource lookups on the blocking pool before taking
//! the lock, so file reads never hold up other connections.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, trace, warn};

use crate::connection::{CloseMode, ConnectionId, LineBuffer, PeerHost, ReadOutcome};
use crate::messaging::{Effect, Outbox, Router};
use crate::server::resolver::{resolve_peer, screen_peer};
use crate::server::SessionSettings;
use crate::shutdown::ShutdownState;

/// Messages from reader (and failed writer) tasks to the router task.
#[derive(Debug)]
enum Inbound {
    Line(ConnectionId, String),
    Closed(ConnectionId, CloseMode),
}

/// Items on a connection's writer channel.
#[derive(Debug)]
enum Outbound {
    Data(String),
    /// Flush what came before, then shut the socket down.
    Close,
}

struct WorkerHandle {
    outbound: mpsc::UnboundedSender<Outbound>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl WorkerHandle {
    fn is_finished(&self) -> bool {
        self.reader.is_finished() || self.writer.is_finished()
    }

    fn abort(&self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// Everything the single mutex guards.
struct Shared {
    router: Router,
    workers: HashMap<ConnectionId, WorkerHandle>,
    drain_timeout: Duration,
}

impl Shared {
    /// Carries out router effects, including the notifications produced by
    /// purging closed connections.
    fn apply(&mut self, mut out: Outbox) {
        while !out.is_empty() {
            let effects: Vec<Effect> = out.drain().collect();
            for effect in effects {
                match effect {
                    Effect::Send { to, data } => match self.workers.get(&to) {
                        Some(worker) => {
                            let _ = worker.outbound.send(Outbound::Data(data));
                        }
                        None => trace!("Dropping output for closed connection {}", to),
                    },
                    Effect::Close { connection, mode } => self.close(connection, mode, &mut out),
                }
            }
        }
    }

    fn close(&mut self, connection: ConnectionId, mode: CloseMode, out: &mut Outbox) {
        self.router.disconnect(connection, out);
        let Some(worker) = self.workers.remove(&connection) else {
            return;
        };
        worker.reader.abort();
        match mode {
            // The writer task drains its channel, then shuts the socket down.
            CloseMode::Graceful => {
                let _ = worker.outbound.send(Outbound::Close);
                tokio::spawn(watch_drain(connection, worker.writer, self.drain_timeout));
            }
            CloseMode::Abort => worker.writer.abort(),
        }
        debug!("❌ Connection {} closing ({:?})", connection, mode);
    }

    /// Purges connections whose reader or writer has ended on its own.
    fn reap(&mut self) -> usize {
        let finished: Vec<ConnectionId> = self
            .workers
            .iter()
            .filter(|(_, worker)| worker.is_finished())
            .map(|(&id, _)| id)
            .collect();

        let mut out = Outbox::new();
        for connection in &finished {
            if let Some(worker) = self.workers.remove(connection) {
                worker.abort();
            }
            self.router.disconnect(*connection, &mut out);
        }
        self.apply(out);
        finished.len()
    }
}

/// Worker-mode server state shared by the accept loop, the router task and
/// the supervisor.
pub(crate) struct Workers {
    shared: Arc<Mutex<Shared>>,
    inbound: mpsc::UnboundedSender<Inbound>,
    settings: SessionSettings,
}

impl Workers {
    /// Runs until `shutdown` is initiated.
    pub(crate) async fn run(
        router: Router,
        listener: TcpListener,
        shutdown: ShutdownState,
        settings: SessionSettings,
        supervisor_interval: Duration,
    ) {
        let resources = router.resources();
        let shared = Arc::new(Mutex::new(Shared {
            router,
            workers: HashMap::new(),
            drain_timeout: settings.drain_timeout,
        }));
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let workers = Arc::new(Workers {
            shared: shared.clone(),
            inbound: inbound_tx,
            settings,
        });

        let router_task = tokio::spawn(route_inbound(shared.clone(), inbound_rx));
        let supervisor_task = tokio::spawn(supervise(shared.clone(), supervisor_interval));
        info!(
            "🧵 Worker mode running (supervisor every {}ms)",
            supervisor_interval.as_millis()
        );

        loop {
            tokio::select! {
                _ = shutdown.wait_for_shutdown() => {
                    info!("🛑 Accept loop stopping - shutdown initiated");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let workers = workers.clone();
                        let resources = resources.clone();
                        tokio::spawn(async move {
                            let peer = resolve_peer(addr, settings.resolve_hostnames).await;
                            let admitted = screen_peer(resources, &peer).await;
                            workers.admit(stream, addr, peer, admitted).await;
                        });
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                },
            }
        }

        router_task.abort();
        supervisor_task.abort();
        let mut shared = shared.lock().await;
        let dropped = shared.workers.len();
        for worker in shared.workers.values() {
            worker.abort();
        }
        shared.workers.clear();
        info!("🧹 Dropped {} connection(s)", dropped);
    }

    async fn admit(&self, stream: TcpStream, addr: SocketAddr, peer: PeerHost, admitted: bool) {
        let (read_half, write_half) = stream.into_split();
        let mut shared = self.shared.lock().await;

        let mut out = Outbox::new();
        let connection = shared.router.accept_screened(addr, peer, admitted, &mut out);

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_lines(
            connection,
            read_half,
            self.inbound.clone(),
            self.settings,
        ));
        let writer = tokio::spawn(write_lines(
            connection,
            write_half,
            outbound_rx,
            self.inbound.clone(),
        ));
        shared.workers.insert(
            connection,
            WorkerHandle {
                outbound: outbound_tx,
                reader,
                writer,
            },
        );
        shared.apply(out);
    }
}

/// Router task: applies inbound lines and closures in arrival order.
async fn route_inbound(shared: Arc<Mutex<Shared>>, mut inbound: mpsc::UnboundedReceiver<Inbound>) {
    while let Some(message) = inbound.recv().await {
        let mut out = Outbox::new();
        match message {
            Inbound::Line(connection, line) => {
                trace!("📥 {}: {}", connection, line);
                let (lookup, resources) = {
                    let shared = shared.lock().await;
                    (shared.router.lookup_for(connection, &line), shared.router.resources())
                };
                // Lines reach the router only through this task, so nothing
                // can change what this one needs while the lock is released.
                let prefetched = match lookup {
                    Some(lookup) => Some(lookup.run_blocking(resources).await),
                    None => None,
                };
                let mut shared = shared.lock().await;
                shared
                    .router
                    .handle_prefetched(connection, &line, prefetched, &mut out);
                shared.apply(out);
            }
            Inbound::Closed(connection, mode) => {
                out.close(connection, mode);
                shared.lock().await.apply(out);
            }
        }
    }
}

/// Aborts a gracefully closed writer that has not finished within `timeout`.
async fn watch_drain(connection: ConnectionId, mut writer: JoinHandle<()>, timeout: Duration) {
    if tokio::time::timeout(timeout, &mut writer).await.is_err() {
        warn!(
            "⏱️ Connection {} did not take its queued output in {}ms, dropping it",
            connection,
            timeout.as_millis()
        );
        writer.abort();
    }
}

async fn supervise(shared: Arc<Mutex<Shared>>, period: Duration) {
    let mut ticker = interval(period);
    loop {
        ticker.tick().await;
        let reaped = shared.lock().await.reap();
        if reaped > 0 {
            info!("🧹 Supervisor reaped {} connection(s)", reaped);
        }
    }
}

async fn read_lines(
    connection: ConnectionId,
    stream: OwnedReadHalf,
    inbound: mpsc::UnboundedSender<Inbound>,
    settings: SessionSettings,
) {
    let mut lines = LineBuffer::with_limit(settings.max_line_length);
    let mut buffer = vec![0; settings.read_buffer_size];
    loop {
        let outcome = match stream.readable().await {
            Ok(()) => ReadOutcome::classify(stream.try_read(&mut buffer), &buffer),
            Err(e) => ReadOutcome::Fatal(e),
        };
        match outcome {
            ReadOutcome::Data(data) => match lines.push(&data) {
                Ok(complete) => {
                    for line in complete {
                        if inbound.send(Inbound::Line(connection, line)).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!("⚠️ Dropping connection {}: {}", connection, e);
                    let _ = inbound.send(Inbound::Closed(connection, CloseMode::Abort));
                    return;
                }
            },
            ReadOutcome::WouldBlock => {}
            ReadOutcome::Eof => {
                debug!("Connection {} closed by peer", connection);
                let _ = inbound.send(Inbound::Closed(connection, CloseMode::Graceful));
                return;
            }
            ReadOutcome::Fatal(e) => {
                warn!("⚠️ Read failed on connection {}: {}", connection, e);
                let _ = inbound.send(Inbound::Closed(connection, CloseMode::Abort));
                return;
            }
        }
    }
}

async fn write_lines(
    connection: ConnectionId,
    mut stream: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    inbound: mpsc::UnboundedSender<Inbound>,
) {
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Data(data) => {
                if let Err(e) = stream.write_all(data.as_bytes()).await {
                    warn!("⚠️ Write failed on connection {}: {}", connection, e);
                    let _ = inbound.send(Inbound::Closed(connection, CloseMode::Abort));
                    return;
                }
            }
            Outbound::Close => {
                let _ = stream.shutdown().await;
                return;
            }
        }
    }
}
