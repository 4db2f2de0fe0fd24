//! Scoped channel ownership

use std::sync::Arc;

use super::channel::ChannelNumber;
use super::store::ChannelRegistry;

/// Ownership of a claimed channel
///
/// Returned by [`ChannelRegistry::try_claim`]. The channel stays claimed for
/// as long as this guard is alive and is released when it is dropped,
/// including during panic unwinding.
#[must_use = "dropping the claim releases the channel immediately"]
pub struct ChannelClaim {
    registry: Arc<ChannelRegistry>,
    channel: ChannelNumber,
    session_id: u64,
}

impl ChannelClaim {
    pub(super) fn new(registry: Arc<ChannelRegistry>, channel: ChannelNumber, session_id: u64) -> Self {
        Self {
            registry,
            channel,
            session_id,
        }
    }

    /// The claimed channel
    pub fn channel(&self) -> ChannelNumber {
        self.channel
    }

    /// Session that owns the claim
    pub fn session_id(&self) -> u64 {
        self.session_id
    }
}

impl std::fmt::Debug for ChannelClaim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelClaim")
            .field("channel", &self.channel)
            .field("session_id", &self.session_id)
            .finish()
    }
}

impl Drop for ChannelClaim {
    fn drop(&mut self) {
        self.registry.release_owned(self.channel, self.session_id);
    }
}
