//! Per-connection handling
//!
//! A connection moves through three phases:
//!
//! ```text
//!  handshake ──► respond ──► stream ──► cleanup
//!      │            │                      ▲
//!      └── reject ──┴──────────────────────┘
//! ```
//!
//! The channel is claimed between the handshake and the response, so the
//! single status code a client receives already reflects the claim. The
//! [`ChannelClaim`] guard lives for the rest of the connection and releases
//! the channel on every exit path.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::auth::{AuthOutcome, Authenticator};
use crate::dispatch::{FanOut, StreamChunk};
use crate::registry::{ChannelClaim, ChannelRegistry};
use crate::server::config::ServerConfig;
use crate::stats::{ServerCounters, SessionStats};

/// State shared by every connection of one server
#[derive(Debug)]
pub struct RelayState {
    authenticator: Authenticator,
    fanout: FanOut,
    counters: ServerCounters,
    read_buffer_size: usize,
    handshake_timeout: Option<Duration>,
}

impl RelayState {
    /// Build shared state from a config, registry and consumer set
    pub fn new(config: &ServerConfig, registry: Arc<ChannelRegistry>, fanout: FanOut) -> Self {
        let authenticator = Authenticator::new(config.secret.as_bytes(), registry)
            .max_line_len(config.max_handshake_len);

        Self {
            authenticator,
            fanout,
            counters: ServerCounters::new(),
            read_buffer_size: config.read_buffer_size.max(1),
            handshake_timeout: config.handshake_timeout,
        }
    }

    /// Channel registry
    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        self.authenticator.registry()
    }

    /// Consumer dispatcher
    pub fn fanout(&self) -> &FanOut {
        &self.fanout
    }

    /// Server-wide counters
    pub fn counters(&self) -> &ServerCounters {
        &self.counters
    }

    /// Deadline for the TLS accept and for the handshake line, each
    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout
    }
}

/// One accepted source connection
pub struct Connection<S> {
    session_id: u64,
    peer_addr: SocketAddr,
    stream: BufReader<S>,
    state: Arc<RelayState>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an accepted (already TLS-terminated) stream
    pub fn new(session_id: u64, stream: S, peer_addr: SocketAddr, state: Arc<RelayState>) -> Self {
        Self {
            session_id,
            peer_addr,
            stream: BufReader::new(stream),
            state,
        }
    }

    /// Run the connection to completion
    ///
    /// Returns once the source disconnects, a read fails, or the handshake
    /// is rejected. The channel, if one was claimed, is free again when this
    /// returns.
    pub async fn run(mut self) -> SessionStats {
        let mut stats = SessionStats::new();

        let (outcome, claim) = self.handshake().await;
        let code = outcome.response_code();

        tracing::info!(
            session_id = self.session_id,
            peer = %self.peer_addr,
            channel = ?outcome.channel(),
            code = %String::from_utf8_lossy(code),
            "Auth status: {}",
            outcome
        );

        self.state.counters.record_auth(claim.is_some());

        if let Err(e) = self.send_response(code).await {
            tracing::warn!(
                session_id = self.session_id,
                peer = %self.peer_addr,
                error = %e,
                "Unable to write response to client"
            );
        }

        if let Some(claim) = claim {
            self.stream_loop(&claim, &mut stats).await;
            drop(claim);
        }

        self.close().await;
        stats.finish();
        stats
    }

    /// Authenticate and, on success, claim the requested channel
    async fn handshake(&mut self) -> (AuthOutcome, Option<ChannelClaim>) {
        let auth = self.state.authenticator.authenticate(&mut self.stream);

        let outcome = match self.state.handshake_timeout {
            Some(limit) => match tokio::time::timeout(limit, auth).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!(
                        session_id = self.session_id,
                        peer = %self.peer_addr,
                        timeout_ms = limit.as_millis() as u64,
                        "Handshake timed out"
                    );
                    AuthOutcome::MalformedMessage
                }
            },
            None => auth.await,
        };

        let channel = match outcome {
            AuthOutcome::Success(channel) => channel,
            other => return (other, None),
        };

        // Time has passed since the authenticator looked at the registry
        match self.state.registry().try_claim(channel, self.session_id) {
            Ok(claim) => (outcome, Some(claim)),
            Err(e) => {
                tracing::warn!(
                    session_id = self.session_id,
                    peer = %self.peer_addr,
                    error = %e,
                    "Channel claim failed after authentication"
                );
                (AuthOutcome::from(e), None)
            }
        }
    }

    async fn send_response(&mut self, code: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(code).await?;
        self.stream.flush().await
    }

    /// Forward everything the source sends until it disconnects
    async fn stream_loop(&mut self, claim: &ChannelClaim, stats: &mut SessionStats) {
        let channel = claim.channel();
        let size = self.state.read_buffer_size;
        let mut buf = BytesMut::with_capacity(size);

        loop {
            buf.reserve(size);

            let read = {
                let mut limited = (&mut buf).limit(size);
                self.stream.read_buf(&mut limited).await
            };

            match read {
                Ok(0) => {
                    tracing::debug!(
                        session_id = self.session_id,
                        channel = %channel,
                        "Source closed stream"
                    );
                    break;
                }
                Ok(_) => {
                    let data = buf.split().freeze();
                    let len = data.len();
                    let delivered = self
                        .state
                        .fanout
                        .dispatch(StreamChunk::new(channel, data))
                        .await;
                    stats.record_chunk(len, delivered);
                }
                Err(e) => {
                    tracing::warn!(
                        session_id = self.session_id,
                        peer = %self.peer_addr,
                        channel = %channel,
                        error = %e,
                        "An error occurred while reading stream"
                    );
                    break;
                }
            }
        }

        tracing::info!(
            session_id = self.session_id,
            channel = %channel,
            bytes = stats.bytes_received,
            chunks = stats.chunks,
            "Stream ended"
        );
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!(session_id = self.session_id, error = %e, "Shutdown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use tokio::sync::mpsc;
    use tokio_test::io::Builder;

    use super::*;
    use crate::dispatch::Consumer;
    use crate::registry::ChannelNumber;

    const SECRET: &str = "correctsecret";

    fn peer() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40000)
    }

    fn state(max_channels: u16) -> (Arc<RelayState>, mpsc::Receiver<StreamChunk>) {
        let config = ServerConfig::default()
            .secret(SECRET)
            .max_channels(max_channels)
            .handshake_timeout(Duration::from_millis(200));
        let (consumer, rx) = Consumer::channel(16);
        let registry = Arc::new(ChannelRegistry::new(max_channels));
        let state = RelayState::new(&config, registry, FanOut::new(vec![consumer]));
        (Arc::new(state), rx)
    }

    #[tokio::test]
    async fn test_authenticated_stream_is_forwarded() {
        let (state, mut rx) = state(9);
        let mock = Builder::new()
            .read(b"3correctsecret\n")
            .write(b"200")
            .read(&[0x01, 0x02, 0x03])
            .build();

        let stats = Connection::new(1, mock, peer(), Arc::clone(&state)).run().await;

        let chunk = rx.recv().await.unwrap();
        assert_eq!(chunk.channel, ChannelNumber::new(3));
        assert_eq!(&chunk.data[..], &[0x01, 0x02, 0x03]);
        assert!(rx.try_recv().is_err());

        assert_eq!(stats.bytes_received, 3);
        assert_eq!(stats.chunks, 1);
        // Released on disconnect
        assert!(!state.registry().contains(ChannelNumber::new(3)));
        assert_eq!(state.counters().snapshot().authenticated, 1);
    }

    #[tokio::test]
    async fn test_bytes_sent_with_handshake_are_kept() {
        let (state, mut rx) = state(9);
        let mock = Builder::new()
            .read(b"5correctsecret\n\x01\x02")
            .write(b"200")
            .read(b"\x03")
            .build();

        Connection::new(1, mock, peer(), state).run().await;

        assert_eq!(&rx.recv().await.unwrap().data[..], &[0x01, 0x02]);
        assert_eq!(&rx.recv().await.unwrap().data[..], &[0x03]);
    }

    #[tokio::test]
    async fn test_wrong_secret_rejected() {
        let (state, mut rx) = state(9);
        let mock = Builder::new().read(b"3wrongsecret\n").write(b"403").build();

        let stats = Connection::new(1, mock, peer(), Arc::clone(&state)).run().await;

        assert_eq!(stats.chunks, 0);
        assert_eq!(state.registry().occupancy(), 0);
        assert_eq!(state.counters().snapshot().rejected, 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_busy_channel_rejected() {
        let (state, _rx) = state(9);
        let _claim = state
            .registry()
            .try_claim(ChannelNumber::new(3), 99)
            .unwrap();
        let mock = Builder::new().read(b"3correctsecret\n").write(b"409").build();

        Connection::new(1, mock, peer(), Arc::clone(&state)).run().await;

        // Existing owner is untouched
        assert_eq!(state.registry().owner(ChannelNumber::new(3)), Some(99));
    }

    #[tokio::test]
    async fn test_malformed_handshake_rejected() {
        let (state, _rx) = state(9);
        let mock = Builder::new().read(b"3\n").write(b"400").build();

        Connection::new(1, mock, peer(), Arc::clone(&state)).run().await;
        assert_eq!(state.registry().occupancy(), 0);
    }

    #[tokio::test]
    async fn test_read_error_releases_channel() {
        let (state, mut rx) = state(9);
        let mock = Builder::new()
            .read(b"4correctsecret\n")
            .write(b"200")
            .read(b"abc")
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset by peer",
            ))
            .build();

        let stats = Connection::new(1, mock, peer(), Arc::clone(&state)).run().await;

        assert_eq!(&rx.recv().await.unwrap().data[..], b"abc");
        assert_eq!(stats.bytes_received, 3);
        assert!(!state.registry().contains(ChannelNumber::new(4)));
    }

    #[tokio::test]
    async fn test_chunks_bounded_by_read_buffer_size() {
        let config = ServerConfig::default()
            .secret(SECRET)
            .read_buffer_size(4);
        let (consumer, mut rx) = Consumer::channel(16);
        let registry = Arc::new(ChannelRegistry::new(9));
        let state = Arc::new(RelayState::new(
            &config,
            registry,
            FanOut::new(vec![consumer]),
        ));
        let mock = Builder::new()
            .read(b"1correctsecret\n")
            .write(b"200")
            .read(b"0123456789")
            .build();

        Connection::new(1, mock, peer(), state).run().await;

        let mut received = Vec::new();
        while let Ok(chunk) = rx.try_recv() {
            assert!(chunk.len() <= 4);
            received.extend_from_slice(&chunk.data);
        }
        assert_eq!(received, b"0123456789");
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        let (state, _rx) = state(9);
        let (server, mut client) = tokio::io::duplex(64);

        let handle = tokio::spawn(Connection::new(1, server, peer(), Arc::clone(&state)).run());

        // Never send the handshake line
        let mut response = [0u8; 3];
        client.read_exact(&mut response).await.unwrap();
        assert_eq!(&response, b"400");

        handle.await.unwrap();
        assert_eq!(state.registry().occupancy(), 0);
        client.shutdown().await.unwrap();
    }
}
