//! Connection manager: listeners, accept loops and the live-connection registry.
//!
//! # Life of a connection (for beginners)
//!
//! ```text
//! TcpListener::accept ──► registry.register()  ── limit reached ──► drop socket
//!                              │
//!                              ▼  (ConnectionGuard)
//!                         tokio::spawn(run_session)
//!                              │
//!                              ▼  any exit path
//!                         guard dropped → entry removed
//! ```
//!
//! Each listener serves exactly one [`FrameVariant`]; the variant is fixed by
//! the port a console connects to.  The accept loop waits at most 200 ms per
//! `accept()` so it notices the shared `running` flag promptly on shutdown.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};
use std::time::{Duration, Instant};

use anyhow::Context;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use wms_core::FrameVariant;

use crate::application::dispatch::FrameHandler;
use crate::infrastructure::network::session::{run_session, SessionEnd};
use crate::infrastructure::storage::config::ServerSettings;

const ACCEPT_POLL: Duration = Duration::from_millis(200);

/// Error type for listener and registry operations.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("connection limit of {limit} reached")]
    TooManyConnections { limit: usize },
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Point-in-time view of one live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: Uuid,
    pub peer: SocketAddr,
    pub variant: FrameVariant,
    pub connected_at: Instant,
    pub frames_handled: u64,
}

#[derive(Debug)]
struct Entry {
    peer: SocketAddr,
    variant: FrameVariant,
    connected_at: Instant,
    frames: Arc<AtomicU64>,
}

/// Live connections across every listener, bounded by `max_connections`.
#[derive(Debug)]
pub struct ConnectionRegistry {
    entries: Mutex<HashMap<Uuid, Entry>>,
    max_connections: usize,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_connections,
        }
    }

    // Entries are plain data inserted and removed in single statements, so a
    // poisoned lock still guards a consistent map.
    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a connection; the returned guard removes it again when dropped.
    ///
    /// # Errors
    ///
    /// [`NetworkError::TooManyConnections`] when the registry is full.
    pub fn register(
        self: &Arc<Self>,
        peer: SocketAddr,
        variant: FrameVariant,
    ) -> Result<ConnectionGuard, NetworkError> {
        let mut entries = self.lock();
        if entries.len() >= self.max_connections {
            return Err(NetworkError::TooManyConnections {
                limit: self.max_connections,
            });
        }

        let id = Uuid::new_v4();
        let frames = Arc::new(AtomicU64::new(0));
        entries.insert(
            id,
            Entry {
                peer,
                variant,
                connected_at: Instant::now(),
                frames: Arc::clone(&frames),
            },
        );
        Ok(ConnectionGuard {
            id,
            frames,
            registry: Arc::clone(self),
        })
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<ConnectionInfo> {
        self.lock()
            .iter()
            .map(|(id, e)| ConnectionInfo {
                id: *id,
                peer: e.peer,
                variant: e.variant,
                connected_at: e.connected_at,
                frames_handled: e.frames.load(Ordering::Relaxed),
            })
            .collect()
    }

    fn remove(&self, id: &Uuid) -> Option<Entry> {
        self.lock().remove(id)
    }
}

/// Registry membership of one connection.  Dropping it deregisters.
#[derive(Debug)]
pub struct ConnectionGuard {
    id: Uuid,
    frames: Arc<AtomicU64>,
    registry: Arc<ConnectionRegistry>,
}

impl ConnectionGuard {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Counter the session increments once per answered frame.
    pub fn frames(&self) -> &AtomicU64 {
        &self.frames
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if let Some(entry) = self.registry.remove(&self.id) {
            info!(
                id = %self.id,
                peer = %entry.peer,
                frames = entry.frames.load(Ordering::Relaxed),
                "connection deregistered"
            );
        }
    }
}

// ── Shared listener context ───────────────────────────────────────────────────

/// Everything a connection task needs, shared by all listeners.
pub struct ServerContext {
    pub handler: Arc<dyn FrameHandler>,
    pub registry: Arc<ConnectionRegistry>,
    pub idle_timeout: Duration,
}

impl ServerContext {
    pub fn new(handler: Arc<dyn FrameHandler>, max_connections: usize, idle_timeout: Duration) -> Self {
        Self {
            handler,
            registry: Arc::new(ConnectionRegistry::new(max_connections)),
            idle_timeout,
        }
    }
}

// ── Listeners ─────────────────────────────────────────────────────────────────

/// Binds a TCP listener.
///
/// # Errors
///
/// [`NetworkError::BindFailed`] if the address is in use or not permitted.
pub async fn bind_listener(addr: SocketAddr) -> Result<TcpListener, NetworkError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| NetworkError::BindFailed { addr, source })
}

/// Binds every enabled listener and serves until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the settings are invalid or a listener cannot be bound.
pub async fn serve(
    settings: &ServerSettings,
    handler: Arc<dyn FrameHandler>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    settings.validate().context("invalid server settings")?;

    let ctx = Arc::new(ServerContext::new(
        handler,
        settings.server.max_connections,
        settings.idle_timeout(),
    ));

    let mut listeners = Vec::new();
    for (variant, addr) in settings.listen_addrs()? {
        let listener = bind_listener(addr)
            .await
            .with_context(|| format!("failed to bind {variant} listener on {addr}"))?;
        listeners.push((variant, listener));
    }

    let tasks: Vec<_> = listeners
        .into_iter()
        .map(|(variant, listener)| {
            let ctx = Arc::clone(&ctx);
            let running = Arc::clone(&running);
            tokio::spawn(async move { run_listener(listener, variant, ctx, running).await })
        })
        .collect();

    for task in tasks {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("listener stopped with error: {e:#}"),
            Err(e) => error!("listener task panicked: {e}"),
        }
    }

    info!(
        open = ctx.registry.len(),
        "all listeners stopped; open connections end on their idle timeout"
    );
    Ok(())
}

/// Runs one accept loop until `running` is set to `false`.
///
/// # Errors
///
/// Returns an error if the listener's local address cannot be read.
pub async fn run_listener(
    listener: TcpListener,
    variant: FrameVariant,
    ctx: Arc<ServerContext>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let local = listener
        .local_addr()
        .context("listener has no local address")?;
    info!("{variant} listener on {local}");

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping {variant} accept loop");
            break;
        }

        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer))) => {
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    handle_connection(stream, peer, variant, ctx).await;
                });
            }
            Ok(Err(e)) => {
                error!("accept error on {local}: {e}");
            }
            Err(_) => {
                // No connection within the poll window; re-check the flag.
            }
        }
    }

    Ok(())
}

// ── Per-connection task ───────────────────────────────────────────────────────

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    variant: FrameVariant,
    ctx: Arc<ServerContext>,
) {
    let guard = match ctx.registry.register(peer, variant) {
        Ok(guard) => guard,
        Err(e) => {
            warn!("rejecting {variant} connection from {peer}: {e}");
            return;
        }
    };
    info!(id = %guard.id(), "new {variant} connection from {peer}");

    match run_connection(stream, variant, &ctx, &guard).await {
        Ok(SessionEnd::PeerClosed) => info!("connection {peer} closed normally"),
        Ok(SessionEnd::IdleTimeout) => info!("connection {peer} closed after idle timeout"),
        Ok(SessionEnd::IncompleteFrame { received }) => {
            warn!("connection {peer} closed mid-frame after {received} bytes")
        }
        Err(e) => warn!("connection {peer} closed with error: {e:#}"),
    }
}

async fn run_connection(
    mut stream: TcpStream,
    variant: FrameVariant,
    ctx: &ServerContext,
    guard: &ConnectionGuard,
) -> anyhow::Result<SessionEnd> {
    stream.set_nodelay(true).context("failed to set TCP_NODELAY")?;
    let end = run_session(
        &mut stream,
        variant,
        ctx.idle_timeout,
        ctx.handler.as_ref(),
        guard.frames(),
    )
    .await
    .context("session I/O failed")?;
    Ok(end)
}
