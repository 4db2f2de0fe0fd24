//! Handshake line parsing and validation
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. a complete line was read
//! 2. the line is at least 3 bytes (digit, one secret byte, `\n`)
//! 3. the channel digit parses, the registry has a free slot, and the
//!    channel is within `1..=max_channels`
//! 4. the channel is not already claimed
//! 5. the secret matches
//!
//! The authenticator only inspects the registry. Claiming is left to the
//! connection, which also owns the release.

use std::sync::Arc;

use subtle::ConstantTimeEq;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use super::outcome::AuthOutcome;
use crate::registry::{ChannelNumber, ChannelRegistry};

/// Upper bound on the handshake line, terminator included
pub const DEFAULT_MAX_HANDSHAKE_LEN: usize = 1024;

/// Minimum handshake: channel digit, one secret byte, line feed
const MIN_HANDSHAKE_LEN: usize = 3;

/// Validates handshake lines against the shared secret and channel registry
pub struct Authenticator {
    secret: Box<[u8]>,
    registry: Arc<ChannelRegistry>,
    max_line_len: usize,
}

impl Authenticator {
    /// Create an authenticator for the given shared secret
    pub fn new(secret: impl Into<Vec<u8>>, registry: Arc<ChannelRegistry>) -> Self {
        Self {
            secret: secret.into().into_boxed_slice(),
            registry,
            max_line_len: DEFAULT_MAX_HANDSHAKE_LEN,
        }
    }

    /// Set the maximum accepted handshake line length
    pub fn max_line_len(mut self, len: usize) -> Self {
        self.max_line_len = len.max(MIN_HANDSHAKE_LEN);
        self
    }

    /// Registry consulted for channel availability
    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Read one handshake line from `reader` and validate it
    ///
    /// Only the handshake line is consumed; any bytes the client sent after
    /// the line feed stay buffered in `reader`.
    pub async fn authenticate<R>(&self, reader: &mut R) -> AuthOutcome
    where
        R: AsyncBufRead + Unpin,
    {
        let mut line = Vec::with_capacity(64);
        let limit = self.max_line_len as u64;

        match (&mut *reader).take(limit).read_until(b'\n', &mut line).await {
            Ok(_) if line.last() == Some(&b'\n') => self.check_line(&line),
            Ok(n) => {
                tracing::warn!(
                    bytes = n,
                    max = self.max_line_len,
                    "Unable to retrieve authentication message: no line terminator"
                );
                AuthOutcome::MalformedMessage
            }
            Err(e) => {
                tracing::warn!(error = %e, "Unable to retrieve authentication message");
                AuthOutcome::MalformedMessage
            }
        }
    }

    /// Validate a complete handshake line, terminator included
    pub fn check_line(&self, line: &[u8]) -> AuthOutcome {
        if line.len() < MIN_HANDSHAKE_LEN {
            tracing::warn!(len = line.len(), "Invalid authentication message length");
            return AuthOutcome::MalformedMessage;
        }

        let max_channels = self.registry.max_channels();

        let channel = match ChannelNumber::from_ascii_digit(line[0]) {
            Some(channel) => channel,
            None => {
                tracing::warn!(max_channels = max_channels, "Channel is not a digit");
                return AuthOutcome::InvalidChannel;
            }
        };

        if self.registry.is_full() {
            tracing::warn!(max_channels = max_channels, "No free channel slots");
            return AuthOutcome::InvalidChannel;
        }

        if !channel.in_range(max_channels) {
            tracing::warn!(
                channel = %channel,
                max_channels = max_channels,
                "Channel out of range"
            );
            return AuthOutcome::InvalidChannel;
        }

        if self.registry.contains(channel) {
            tracing::warn!(channel = %channel, "Channel is currently receiving a stream");
            return AuthOutcome::ChannelBusy;
        }

        let rest = &line[1..];
        let secret = rest.strip_suffix(b"\n").unwrap_or(rest);
        if !bool::from(secret.ct_eq(&self.secret)) {
            tracing::warn!(channel = %channel, "Secret mismatch");
            return AuthOutcome::FailedAuth;
        }

        AuthOutcome::Success(channel)
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("secret", &"<redacted>")
            .field("max_line_len", &self.max_line_len)
            .finish()
    }
}
