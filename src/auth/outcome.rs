//! Handshake results and their wire codes

use crate::registry::{ChannelNumber, RegistryError};

/// Authenticated; stream may follow
pub const SUCCESSFUL_AUTH: &[u8; 3] = b"200";
/// Wrong secret
pub const FAILED_AUTH: &[u8; 3] = b"403";
/// Malformed handshake, bad channel or no free slot
pub const INVALID_CHANNEL: &[u8; 3] = b"400";
/// Channel already has a live source
pub const CHANNEL_BUSY: &[u8; 3] = b"409";

/// Result of processing a handshake line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Channel and secret accepted
    Success(ChannelNumber),
    /// Secret did not match
    FailedAuth,
    /// Channel not a digit, out of range, or registry full
    InvalidChannel,
    /// Channel already claimed
    ChannelBusy,
    /// Line missing, unterminated or too short
    MalformedMessage,
}

impl AuthOutcome {
    /// Status code sent back to the client (no terminator)
    pub fn response_code(&self) -> &'static [u8; 3] {
        match self {
            AuthOutcome::Success(_) => SUCCESSFUL_AUTH,
            AuthOutcome::FailedAuth => FAILED_AUTH,
            AuthOutcome::InvalidChannel | AuthOutcome::MalformedMessage => INVALID_CHANNEL,
            AuthOutcome::ChannelBusy => CHANNEL_BUSY,
        }
    }

    /// Check if the outcome allows streaming
    pub fn is_success(&self) -> bool {
        matches!(self, AuthOutcome::Success(_))
    }

    /// Authenticated channel, if any
    pub fn channel(&self) -> Option<ChannelNumber> {
        match self {
            AuthOutcome::Success(channel) => Some(*channel),
            _ => None,
        }
    }
}

impl From<RegistryError> for AuthOutcome {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::Busy(_) => AuthOutcome::ChannelBusy,
            RegistryError::OutOfRange { .. } | RegistryError::Full { .. } => {
                AuthOutcome::InvalidChannel
            }
        }
    }
}

impl std::fmt::Display for AuthOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthOutcome::Success(channel) => write!(f, "authenticated on channel {}", channel),
            AuthOutcome::FailedAuth => write!(f, "failed authentication"),
            AuthOutcome::InvalidChannel => write!(f, "invalid channel"),
            AuthOutcome::ChannelBusy => write!(f, "channel in use"),
            AuthOutcome::MalformedMessage => write!(f, "malformed handshake"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_codes() {
        let ch = ChannelNumber::new(1);
        assert_eq!(AuthOutcome::Success(ch).response_code(), b"200");
        assert_eq!(AuthOutcome::FailedAuth.response_code(), b"403");
        assert_eq!(AuthOutcome::InvalidChannel.response_code(), b"400");
        assert_eq!(AuthOutcome::MalformedMessage.response_code(), b"400");
        assert_eq!(AuthOutcome::ChannelBusy.response_code(), b"409");
    }

    #[test]
    fn test_from_registry_error() {
        let ch = ChannelNumber::new(2);
        assert_eq!(
            AuthOutcome::from(RegistryError::Busy(ch)),
            AuthOutcome::ChannelBusy
        );
        assert_eq!(
            AuthOutcome::from(RegistryError::Full { max_channels: 2 }),
            AuthOutcome::InvalidChannel
        );
        assert_eq!(
            AuthOutcome::from(RegistryError::OutOfRange {
                channel: ch,
                max_channels: 1
            }),
            AuthOutcome::InvalidChannel
        );
    }
}
