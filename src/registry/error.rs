//! Registry error types
//!
//! Reasons a channel claim can be refused.

use super::channel::ChannelNumber;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Channel number is outside `1..=max_channels`
    OutOfRange {
        channel: ChannelNumber,
        max_channels: u16,
    },
    /// Every channel slot is already taken
    Full { max_channels: u16 },
    /// Channel already has a live source
    Busy(ChannelNumber),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::OutOfRange {
                channel,
                max_channels,
            } => write!(
                f,
                "Channel {} is out of range (1..={})",
                channel, max_channels
            ),
            RegistryError::Full { max_channels } => {
                write!(f, "All {} channels are in use", max_channels)
            }
            RegistryError::Busy(channel) => {
                write!(f, "Channel {} is currently receiving a stream", channel)
            }
        }
    }
}

impl std::error::Error for RegistryError {}
