//! Channel identifiers

/// Identifier of one exclusive stream slot
///
/// Valid channels are `1..=max_channels`; the registry enforces the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelNumber(u16);

impl ChannelNumber {
    /// Create a channel number
    pub const fn new(n: u16) -> Self {
        Self(n)
    }

    /// Parse a single ASCII decimal digit, as sent in the handshake
    ///
    /// Only channels 0-9 can be expressed this way.
    pub fn from_ascii_digit(b: u8) -> Option<Self> {
        if b.is_ascii_digit() {
            Some(Self(u16::from(b - b'0')))
        } else {
            None
        }
    }

    /// Numeric value
    pub const fn get(self) -> u16 {
        self.0
    }

    /// Check the channel against the configured upper bound
    pub fn in_range(self, max_channels: u16) -> bool {
        self.0 >= 1 && self.0 <= max_channels
    }
}

impl From<u16> for ChannelNumber {
    fn from(n: u16) -> Self {
        Self(n)
    }
}

impl std::fmt::Display for ChannelNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
