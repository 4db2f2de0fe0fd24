//! Channel registry for exclusive stream ownership
//!
//! The registry tracks which channel numbers currently have a live source
//! connection. A connection may only stream once it holds the claim for its
//! channel, and at most one connection can hold a given channel at a time.
//!
//! # Architecture
//!
//! ```text
//!                     Arc<ChannelRegistry>
//!                 ┌──────────────────────────┐
//!                 │ claims: Mutex<HashMap<   │
//!                 │   ChannelNumber,         │
//!                 │   session_id,            │
//!                 │ >>                       │
//!                 └────────────┬─────────────┘
//!                              │
//!         ┌────────────────────┼────────────────────┐
//!         │                    │                    │
//!         ▼                    ▼                    ▼
//!   [Connection 1]       [Connection 2]       [Connection 3]
//!   try_claim(3) ✓       try_claim(3) ✗ Busy  try_claim(5) ✓
//!         │                                         │
//!   drop(ChannelClaim) ──► release(3)               ...
//! ```
//!
//! Claims are handed out as [`ChannelClaim`] guards. Dropping the guard
//! releases the channel, so every exit path of a connection (return, error,
//! panic) frees its channel exactly once.

pub mod channel;
pub mod claim;
pub mod error;
pub mod store;

pub use channel::ChannelNumber;
pub use claim::ChannelClaim;
pub use error::RegistryError;
pub use store::ChannelRegistry;
