//! Authenticated channel relay
//!
//! Accepts TLS connections from stream sources (cameras, encoders), binds each
//! connection to an exclusive numbered channel after a one-line handshake, and
//! fans the raw byte stream out to every registered consumer.
//!
//! # Wire protocol
//!
//! ```text
//! Client                                   Server
//!   |                                        |
//!   |------- "<digit><secret>\n" ---------->|
//!   |<------ "200" | "400" | "403" | "409" --|
//!   |                                        |
//!   |------- raw stream bytes ... --------->|  (only after "200")
//! ```
//!
//! # Example
//!
//! ```no_run
//! use chanrelay::{Consumer, RelayServer, ServerConfig};
//!
//! # async fn example() -> chanrelay::error::Result<()> {
//! let config = ServerConfig::default()
//!     .secret("hunter2")
//!     .max_channels(4);
//!
//! let (consumer, mut chunks) = Consumer::channel(config.consumer_capacity);
//! tokio::spawn(async move {
//!     while let Some(chunk) = chunks.recv().await {
//!         println!("channel {} sent {} bytes", chunk.channel, chunk.data.len());
//!     }
//! });
//!
//! let server = RelayServer::new(config, vec![consumer])?;
//! server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await
//! # }
//! ```

pub mod auth;
pub mod dispatch;
pub mod error;
pub mod registry;
pub mod server;
pub mod stats;

pub use auth::{AuthOutcome, Authenticator};
pub use dispatch::{Consumer, FanOut, StreamChunk};
pub use registry::{ChannelClaim, ChannelNumber, ChannelRegistry, RegistryError};
pub use server::{RelayServer, ServerConfig};
