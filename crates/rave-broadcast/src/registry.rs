//! Registry of connected fixture clients.
//!
//! The membership map is the only state shared between the accept task, the
//! per-client read tasks and the broadcast path. Broadcasts work on a
//! snapshot so the map lock is never held across a network write.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Write half of a client stream.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// An open client stream and where it came from.
#[derive(Clone)]
pub struct ClientConnection {
    id: ClientId,
    addr: SocketAddr,
    writer: Arc<Mutex<BoxedWriter>>,
    closed: Arc<Notify>,
}

impl ClientConnection {
    pub fn new<W>(addr: SocketAddr, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            id: ClientId(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed)),
            addr,
            writer: Arc::new(Mutex::new(Box::new(writer))),
            closed: Arc::new(Notify::new()),
        }
    }

    /// Fires once when the registry lets go of this connection. Whoever
    /// reads the other half of the stream waits on it to shut down too.
    pub fn close_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.closed)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Write one frame, giving up after `timeout`.
    async fn send(&self, frame: &[u8], timeout: Duration) -> Result<()> {
        let write = async {
            let mut writer = self.writer.lock().await;
            writer.write_all(frame).await?;
            writer.flush().await
        };
        match tokio::time::timeout(timeout, write).await {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::WriteTimeout(timeout)),
        }
    }
}

impl fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Clients that took the whole frame.
    pub delivered: usize,
    /// Clients that failed and were removed.
    pub dropped: Vec<ClientId>,
}

/// Concurrency-safe set of connected clients.
pub struct ClientRegistry {
    clients: Mutex<HashMap<ClientId, ClientConnection>>,
    send_timeout: Duration,
}

impl ClientRegistry {
    /// Empty registry whose sends give up after `send_timeout`.
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            send_timeout,
        }
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    /// Register a connection. Returns its id.
    pub async fn add(&self, conn: ClientConnection) -> ClientId {
        let id = conn.id;
        self.clients.lock().await.insert(id, conn);
        id
    }

    /// Drop a connection and signal its reader. Removing an unknown id is a
    /// no-op.
    pub async fn remove(&self, id: ClientId) -> bool {
        match self.clients.lock().await.remove(&id) {
            Some(conn) => {
                conn.closed.notify_one();
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.lock().await.is_empty()
    }

    pub async fn contains(&self, id: ClientId) -> bool {
        self.clients.lock().await.contains_key(&id)
    }

    /// Ids and peer addresses of everyone connected.
    pub async fn addrs(&self) -> Vec<(ClientId, SocketAddr)> {
        let mut addrs: Vec<_> = self
            .clients
            .lock()
            .await
            .values()
            .map(|c| (c.id, c.addr))
            .collect();
        addrs.sort();
        addrs
    }

    /// Drop every connection.
    pub async fn clear(&self) {
        for (_, conn) in self.clients.lock().await.drain() {
            conn.closed.notify_one();
        }
    }

    /// Send `frame` to every current client.
    ///
    /// Writes run concurrently, each bounded by the send timeout. Clients
    /// whose write fails or times out are removed; the rest still get the
    /// frame. Never returns an error.
    pub async fn broadcast(&self, frame: &[u8]) -> BroadcastReport {
        let snapshot: Vec<ClientConnection> =
            self.clients.lock().await.values().cloned().collect();
        let timeout = self.send_timeout;

        let results = join_all(snapshot.iter().map(|conn| async move {
            (conn, conn.send(frame, timeout).await)
        }))
        .await;

        let mut report = BroadcastReport::default();
        for (conn, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("Dropping {} ({}): {}", conn.id, conn.addr, e);
                    self.remove(conn.id).await;
                    report.dropped.push(conn.id);
                }
            }
        }
        debug!(
            delivered = report.delivered,
            dropped = report.dropped.len(),
            bytes = frame.len(),
            "Broadcast"
        );
        report
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new(crate::server::DEFAULT_SEND_TIMEOUT)
    }
}
