//! Channel registry implementation
//!
//! Check-and-insert happens under one lock, so two connections can never
//! both observe a channel as free and both claim it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::channel::ChannelNumber;
use super::claim::ChannelClaim;
use super::error::RegistryError;

/// Set of channels that currently have a live source
///
/// Each entry records the session that claimed it. The lock is never held
/// across an `.await`, and a synchronous mutex lets [`ChannelClaim`] release
/// from `Drop`.
pub struct ChannelRegistry {
    /// Claimed channel -> owning session ID
    claims: Mutex<HashMap<ChannelNumber, u64>>,

    /// Highest valid channel number, also the occupancy limit
    max_channels: u16,
}

impl ChannelRegistry {
    /// Create an empty registry accepting channels `1..=max_channels`
    pub fn new(max_channels: u16) -> Self {
        Self {
            claims: Mutex::new(HashMap::with_capacity(usize::from(max_channels))),
            max_channels,
        }
    }

    /// Highest valid channel number
    pub fn max_channels(&self) -> u16 {
        self.max_channels
    }

    // A panic while holding the lock cannot leave the map half-updated
    // (every critical section is a single insert or remove).
    fn lock(&self) -> MutexGuard<'_, HashMap<ChannelNumber, u64>> {
        self.claims.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomically claim a channel for a session
    ///
    /// Succeeds only if the channel is in range, the registry is below its
    /// occupancy limit and the channel is not already claimed. On failure
    /// nothing is mutated.
    pub fn try_claim(
        self: &Arc<Self>,
        channel: ChannelNumber,
        session_id: u64,
    ) -> Result<ChannelClaim, RegistryError> {
        let mut claims = self.lock();

        if !channel.in_range(self.max_channels) {
            return Err(RegistryError::OutOfRange {
                channel,
                max_channels: self.max_channels,
            });
        }
        if claims.len() >= usize::from(self.max_channels) {
            return Err(RegistryError::Full {
                max_channels: self.max_channels,
            });
        }
        if claims.contains_key(&channel) {
            return Err(RegistryError::Busy(channel));
        }

        claims.insert(channel, session_id);
        let occupancy = claims.len();
        drop(claims);

        tracing::info!(
            channel = %channel,
            session_id = session_id,
            occupancy = occupancy,
            "Channel claimed"
        );

        Ok(ChannelClaim::new(Arc::clone(self), channel, session_id))
    }

    /// Release a channel regardless of owner
    ///
    /// Idempotent: releasing a channel that is not claimed is a no-op.
    /// Returns whether a claim was removed.
    pub fn release(&self, channel: ChannelNumber) -> bool {
        let removed = self.lock().remove(&channel);

        if let Some(session_id) = removed {
            tracing::info!(channel = %channel, session_id = session_id, "Channel released");
        }
        removed.is_some()
    }

    /// Release a channel only if `session_id` still owns it
    pub(super) fn release_owned(&self, channel: ChannelNumber, session_id: u64) -> bool {
        let mut claims = self.lock();

        match claims.get(&channel) {
            Some(&owner) if owner == session_id => {
                claims.remove(&channel);
                drop(claims);
                tracing::info!(channel = %channel, session_id = session_id, "Channel released");
                true
            }
            Some(&owner) => {
                tracing::warn!(
                    channel = %channel,
                    expected = owner,
                    actual = session_id,
                    "Channel release owner mismatch"
                );
                false
            }
            None => false,
        }
    }

    /// Check whether a channel is currently claimed
    pub fn contains(&self, channel: ChannelNumber) -> bool {
        self.lock().contains_key(&channel)
    }

    /// Session currently owning a channel
    pub fn owner(&self, channel: ChannelNumber) -> Option<u64> {
        self.lock().get(&channel).copied()
    }

    /// Number of claimed channels
    pub fn occupancy(&self) -> usize {
        self.lock().len()
    }

    /// Check whether every channel slot is taken
    pub fn is_full(&self) -> bool {
        self.occupancy() >= usize::from(self.max_channels)
    }

    /// Claimed channels in ascending order
    pub fn active_channels(&self) -> Vec<ChannelNumber> {
        let mut channels: Vec<ChannelNumber> = self.lock().keys().copied().collect();
        channels.sort_unstable();
        channels
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("max_channels", &self.max_channels)
            .field("active", &self.active_channels())
            .finish()
    }
}
