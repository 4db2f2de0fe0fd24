//! Relay server listener
//!
//! Handles the TCP accept loop and spawns a task per connection. TLS is
//! negotiated inside that task so a slow client never stalls accepting.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_native_tls::{TlsAcceptor, TlsStream};

use crate::dispatch::{Consumer, FanOut};
use crate::error::Result;
use crate::registry::ChannelRegistry;
use crate::server::config::{ServerConfig, MAX_ADDRESSABLE_CHANNEL};
use crate::server::connection::{Connection, RelayState};
use crate::server::tls;
use crate::stats::ServerStats;

/// Relay server
pub struct RelayServer {
    config: ServerConfig,
    tls: Option<TlsAcceptor>,
    state: Arc<RelayState>,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl RelayServer {
    /// Create a server over a fixed set of consumers
    ///
    /// Connections are accepted as plain TCP until TLS is configured with
    /// [`with_tls`](Self::with_tls) or [`load_tls`](Self::load_tls).
    pub fn new(config: ServerConfig, consumers: Vec<Consumer>) -> Result<Self> {
        config.validate()?;

        if config.has_unaddressable_channels() {
            tracing::warn!(
                max_channels = config.max_channels,
                addressable = MAX_ADDRESSABLE_CHANNEL,
                "Handshake carries a single digit; channels above 9 can never be claimed"
            );
        }
        if consumers.is_empty() {
            tracing::warn!("No consumers configured; stream data will be discarded");
        }

        let registry = Arc::new(ChannelRegistry::new(config.max_channels));
        let state = RelayState::new(&config, registry, FanOut::new(consumers));

        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Ok(Self {
            config,
            tls: None,
            state: Arc::new(state),
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
        })
    }

    /// Terminate TLS with the given acceptor
    pub fn with_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }

    /// Load the TLS identity from the configured certificate directory
    pub fn load_tls(self) -> Result<Self> {
        match self.config.cert_dir.clone() {
            Some(dir) => {
                let acceptor = tls::load_acceptor(&dir)?;
                Ok(self.with_tls(acceptor))
            }
            None => Err(crate::error::Error::Config(
                "no certificate directory configured".into(),
            )),
        }
    }

    /// Whether connections are TLS-terminated
    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Get a reference to the channel registry
    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        self.state.registry()
    }

    /// Snapshot of server statistics
    pub fn stats(&self) -> ServerStats {
        self.state.counters().snapshot()
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Bind the configured address
    ///
    /// Failing to bind is the only fatal server error.
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(
            addr = %listener.local_addr()?,
            tls = self.is_tls(),
            max_channels = self.config.max_channels,
            consumers = self.state.fanout().len(),
            "Server ready and listening"
        );
        Ok(listener)
    }

    /// Run the server
    ///
    /// This method runs until the process exits.
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.accept_loop(&listener).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }

    /// Accept on an already bound listener until `shutdown` completes
    ///
    /// Connections that are already running are left to finish on their own.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        }
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "An error occurred when accepting a connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = match self.connection_semaphore {
            Some(ref sem) => match Arc::clone(sem).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            },
            None => None,
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            session_id = session_id,
            peer = %peer_addr,
            "New connection"
        );

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::warn!(session_id = session_id, error = %e, "Failed to configure socket");
            }
        }

        let state = Arc::clone(&self.state);
        let tls = self.tls.clone();

        tokio::spawn(async move {
            state.counters().connection_opened();

            match tls {
                Some(acceptor) => {
                    match accept_tls(&acceptor, socket, session_id, peer_addr, &state).await {
                        Some(stream) => {
                            serve_stream(session_id, stream, peer_addr, &state, permit).await
                        }
                        None => {
                            // Slot is free before the counters report the close
                            drop(permit);
                            state.counters().connection_closed(&Default::default());
                        }
                    }
                }
                None => serve_stream(session_id, socket, peer_addr, &state, permit).await,
            }

            tracing::debug!(session_id = session_id, "Connection closed");
        });
    }
}

/// Negotiate TLS within the handshake deadline
///
/// Clients that never send a hello are dropped once the deadline passes,
/// releasing their connection slot.
async fn accept_tls(
    acceptor: &TlsAcceptor,
    socket: TcpStream,
    session_id: u64,
    peer_addr: SocketAddr,
    state: &RelayState,
) -> Option<TlsStream<TcpStream>> {
    let accept = acceptor.accept(socket);
    let result = match state.handshake_timeout() {
        Some(limit) => match tokio::time::timeout(limit, accept).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    session_id = session_id,
                    peer = %peer_addr,
                    timeout_ms = limit.as_millis() as u64,
                    "TLS handshake timed out"
                );
                return None;
            }
        },
        None => accept.await,
    };

    match result {
        Ok(stream) => Some(stream),
        Err(e) => {
            tracing::warn!(
                session_id = session_id,
                peer = %peer_addr,
                error = %e,
                "TLS handshake failed"
            );
            None
        }
    }
}

async fn serve_stream<S>(
    session_id: u64,
    stream: S,
    peer_addr: SocketAddr,
    state: &Arc<RelayState>,
    permit: Option<OwnedSemaphorePermit>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let stats = Connection::new(session_id, stream, peer_addr, Arc::clone(state))
        .run()
        .await;

    tracing::debug!(
        session_id = session_id,
        bytes = stats.bytes_received,
        chunks = stats.chunks,
        duration_ms = stats.duration.as_millis() as u64,
        bitrate = stats.bitrate,
        "Session stats"
    );
    drop(permit);
    state.counters().connection_closed(&stats);
}
