//! Handshake authentication
//!
//! A source opens a connection by sending a single line:
//!
//! ```text
//! +-------+----------------------+----+
//! | digit |  shared secret ...   | \n |
//! +-------+----------------------+----+
//!   1 B        1..n B              1 B
//! ```
//!
//! The digit selects the channel, so only channels 1-9 are addressable on the
//! wire. The server answers with a three-byte status code and, on `200`, the
//! rest of the connection is the raw stream.

pub mod handshake;
pub mod outcome;

pub use handshake::{Authenticator, DEFAULT_MAX_HANDSHAKE_LEN};
pub use outcome::{
    AuthOutcome, CHANNEL_BUSY, FAILED_AUTH, INVALID_CHANNEL, SUCCESSFUL_AUTH,
};
