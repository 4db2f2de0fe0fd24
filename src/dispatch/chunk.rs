//! Stream chunk type

use bytes::Bytes;

use crate::registry::ChannelNumber;

/// One read's worth of data from a channel's source connection
///
/// Cheap to clone due to `Bytes` reference counting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    /// Channel the data arrived on
    pub channel: ChannelNumber,
    /// Raw bytes, exactly as read from the connection
    pub data: Bytes,
}

impl StreamChunk {
    /// Create a new chunk
    pub fn new(channel: ChannelNumber, data: impl Into<Bytes>) -> Self {
        Self {
            channel,
            data: data.into(),
        }
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
