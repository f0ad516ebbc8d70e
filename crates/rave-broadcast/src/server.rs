//! TCP server that fans each beat out to every connected fixture.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rave_beat::Tick;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Notify};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::registry::{ClientConnection, ClientId, ClientRegistry};
use crate::wire::{self, InboundLine};

/// Port the fixtures connect to unless told otherwise.
pub const DEFAULT_PORT: u16 = 6000;

/// How long one client may take to accept a frame.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(250);

/// Longest inbound line kept in one piece for logging.
pub const DEFAULT_MAX_LINE_LEN: usize = 1024;

/// Configuration for a [`BroadcastServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Per-client write timeout.
    pub send_timeout: Duration,
    /// Refuse connections beyond this many clients.
    pub max_clients: Option<usize>,
    pub max_line_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            send_timeout: DEFAULT_SEND_TIMEOUT,
            max_clients: None,
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

/// Summary returned once the tick stream ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServeReport {
    /// Ticks broadcast.
    pub ticks: u64,
    /// Client drops caused by failed or slow writes.
    pub dropped: u64,
}

/// Accepts fixture connections and broadcasts ticks to them.
///
/// Fixtures are accepted from the moment the server is bound, so they can
/// join while the clock is still idle. Dropping the server stops accepting
/// and closes the listener.
pub struct BroadcastServer {
    local_addr: SocketAddr,
    registry: Arc<ClientRegistry>,
    accept: JoinHandle<()>,
}

impl BroadcastServer {
    /// Bind the listening socket and start accepting. A bind failure is
    /// returned immediately.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.listen_addr)
            .await
            .map_err(|source| Error::Bind {
                addr: config.listen_addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!("Broadcast server listening on {}", local_addr);

        let registry = Arc::new(ClientRegistry::new(config.send_timeout));
        let accept = tokio::spawn(accept_loop(listener, Arc::clone(&registry), config));

        Ok(Self {
            local_addr,
            registry,
            accept,
        })
    }

    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.local_addr)
    }

    pub fn registry(&self) -> Arc<ClientRegistry> {
        Arc::clone(&self.registry)
    }

    /// Serve until `ticks` closes.
    ///
    /// Accepting and per-client reads run in their own tasks; this task only
    /// encodes and broadcasts, one tick at a time, in arrival order. When the
    /// tick stream ends (the clock has finished) the accept task and every
    /// read task are stopped, the listener is released and all clients are
    /// dropped.
    pub async fn serve(mut self, mut ticks: mpsc::Receiver<Tick>) -> Result<ServeReport> {
        let registry = Arc::clone(&self.registry);

        let mut report = ServeReport {
            ticks: 0,
            dropped: 0,
        };
        while let Some(tick) = ticks.recv().await {
            let frame = match wire::encode_line(&tick.command) {
                Ok(frame) => frame,
                Err(e) => {
                    error!("Failed to encode {}: {}", tick.command.name, e);
                    continue;
                }
            };
            let sent = registry.broadcast(&frame).await;
            report.ticks += 1;
            report.dropped += sent.dropped.len() as u64;
            debug!(
                name = %tick.command.name,
                clients = sent.delivered,
                "Beat {} sent",
                tick.state.total_beats
            );
        }

        info!("Tick stream closed, shutting down broadcast server");
        self.accept.abort();
        let _ = (&mut self.accept).await;
        registry.clear().await;
        Ok(report)
    }
}

impl Drop for BroadcastServer {
    fn drop(&mut self) {
        self.accept.abort();
    }
}

/// Accept connections until aborted. Read tasks live in a `JoinSet` owned by
/// this task, so aborting it tears them all down.
async fn accept_loop(listener: TcpListener, registry: Arc<ClientRegistry>, config: ServerConfig) {
    let mut readers = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    if let Some(max) = config.max_clients {
                        if registry.len().await >= max {
                            warn!("Refusing {}: {} clients already connected", addr, max);
                            continue;
                        }
                    }
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("Could not set TCP_NODELAY for {}: {}", addr, e);
                    }

                    let (reader, writer) = stream.into_split();
                    let conn = ClientConnection::new(addr, writer);
                    let closed = conn.close_signal();
                    let id = registry.add(conn).await;
                    info!("{} connected from {} ({} active)", id, addr, registry.len().await);

                    readers.spawn(read_loop(
                        id,
                        addr,
                        reader,
                        closed,
                        Arc::clone(&registry),
                        config.max_line_len,
                    ));
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            },
            Some(_) = readers.join_next(), if !readers.is_empty() => {}
        }
    }
}

/// Read a client's lines until it goes away or the registry drops it, then
/// unregister it.
///
/// Content is only logged; fixtures cannot steer the show.
async fn read_loop<R>(
    id: ClientId,
    addr: SocketAddr,
    reader: R,
    closed: Arc<Notify>,
    registry: Arc<ClientRegistry>,
    max_line_len: usize,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::with_capacity(256);

    loop {
        line.clear();
        let mut limited = (&mut reader).take(max_line_len as u64);
        let read = tokio::select! {
            read = limited.read_until(b'\n', &mut line) => read,
            _ = closed.notified() => {
                debug!("{} ({}) dropped by the registry, closing reader", id, addr);
                break;
            }
        };
        match read {
            Ok(0) => {
                info!("{} ({}) disconnected", id, addr);
                break;
            }
            Ok(_) => match wire::decode_line(&line) {
                InboundLine::Empty => {}
                InboundLine::Json(value) => debug!("Received from {} ({}): {}", id, addr, value),
                InboundLine::Malformed(text) => {
                    warn!("Malformed line from {} ({}): {}", id, addr, text)
                }
            },
            Err(e) => {
                warn!("Read error from {} ({}): {}", id, addr, e);
                break;
            }
        }
    }

    registry.remove(id).await;
}
