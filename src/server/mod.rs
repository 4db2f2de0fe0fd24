//! Relay server
//!
//! Accepts source connections and drives each through authentication and
//! streaming.

pub mod config;
pub mod connection;
pub mod listener;
pub mod tls;

pub use config::ServerConfig;
pub use connection::{Connection, RelayState};
pub use listener::RelayServer;
