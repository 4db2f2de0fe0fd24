//! Relay server configuration

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::DEFAULT_MAX_HANDSHAKE_LEN;
use crate::dispatch::DEFAULT_CONSUMER_CAPACITY;
use crate::error::{Error, Result};

/// Default listening port
pub const DEFAULT_PORT: u16 = 8443;

/// Highest channel the single-digit handshake can address
pub const MAX_ADDRESSABLE_CHANNEL: u16 = 9;

/// Server configuration options
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Directory holding `server.pem` and `server.key`
    pub cert_dir: Option<PathBuf>,

    /// Shared secret every source must present
    pub secret: String,

    /// Highest channel number, also the limit on concurrent sources
    pub max_channels: u16,

    /// Upper bound on a single read from a source, in bytes
    pub read_buffer_size: usize,

    /// Time allowed for the handshake line (None = wait forever)
    pub handshake_timeout: Option<Duration>,

    /// Maximum handshake line length, line feed included
    pub max_handshake_len: usize,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Enable TCP_NODELAY
    pub tcp_nodelay: bool,

    /// Queue capacity for consumers created from this config
    pub consumer_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            cert_dir: None,
            secret: String::new(),
            max_channels: MAX_ADDRESSABLE_CHANNEL,
            read_buffer_size: 64 * 1024, // 64KB
            handshake_timeout: Some(Duration::from_secs(10)),
            max_handshake_len: DEFAULT_MAX_HANDSHAKE_LEN,
            max_connections: 0, // Unlimited
            tcp_nodelay: true,
            consumer_capacity: DEFAULT_CONSUMER_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the TLS certificate directory
    pub fn cert_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cert_dir = Some(dir.into());
        self
    }

    /// Set the shared secret
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = secret.into();
        self
    }

    /// Set the highest channel number
    pub fn max_channels(mut self, max: u16) -> Self {
        self.max_channels = max;
        self
    }

    /// Set the read buffer size
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set the handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = Some(timeout);
        self
    }

    /// Wait indefinitely for the handshake line
    pub fn no_handshake_timeout(mut self) -> Self {
        self.handshake_timeout = None;
        self
    }

    /// Set the maximum handshake line length
    pub fn max_handshake_len(mut self, len: usize) -> Self {
        self.max_handshake_len = len;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set consumer queue capacity
    pub fn consumer_capacity(mut self, capacity: usize) -> Self {
        self.consumer_capacity = capacity;
        self
    }

    /// Check the configuration for values the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.secret.is_empty() {
            return Err(Error::Config("shared secret must not be empty".into()));
        }
        if self.secret.contains('\n') {
            return Err(Error::Config(
                "shared secret must not contain a line feed".into(),
            ));
        }
        if self.max_channels == 0 {
            return Err(Error::Config("max_channels must be at least 1".into()));
        }
        if self.read_buffer_size == 0 {
            return Err(Error::Config("read_buffer_size must be non-zero".into()));
        }
        Ok(())
    }

    /// Channels above 9 exist in the registry but cannot be requested
    pub fn has_unaddressable_channels(&self) -> bool {
        self.max_channels > MAX_ADDRESSABLE_CHANNEL
    }

    /// Load configuration from `RELAY_*` environment variables
    ///
    /// `RELAY_SECRET` is required; everything else falls back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("RELAY_BIND_ADDR") {
            config.bind_addr = parse_var("RELAY_BIND_ADDR", &addr)?;
        }
        if let Some(dir) = lookup("RELAY_CERT_DIR") {
            config.cert_dir = Some(PathBuf::from(dir));
        }
        config.secret = lookup("RELAY_SECRET")
            .ok_or_else(|| Error::Config("RELAY_SECRET is not set".into()))?;
        if let Some(max) = lookup("RELAY_MAX_CHANNELS") {
            config.max_channels = parse_var("RELAY_MAX_CHANNELS", &max)?;
        }
        if let Some(size) = lookup("RELAY_READ_BUFFER_SIZE") {
            config.read_buffer_size = parse_var("RELAY_READ_BUFFER_SIZE", &size)?;
        }
        if let Some(secs) = lookup("RELAY_HANDSHAKE_TIMEOUT_SECS") {
            let secs: u64 = parse_var("RELAY_HANDSHAKE_TIMEOUT_SECS", &secs)?;
            config.handshake_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(max) = lookup("RELAY_MAX_CONNECTIONS") {
            config.max_connections = parse_var("RELAY_MAX_CONNECTIONS", &max)?;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("invalid {} {:?}: {}", key, value, e)))
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("cert_dir", &self.cert_dir)
            .field("secret", &"<redacted>")
            .field("max_channels", &self.max_channels)
            .field("read_buffer_size", &self.read_buffer_size)
            .field("handshake_timeout", &self.handshake_timeout)
            .field("max_handshake_len", &self.max_handshake_len)
            .field("max_connections", &self.max_connections)
            .field("tcp_nodelay", &self.tcp_nodelay)
            .field("consumer_capacity", &self.consumer_capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), DEFAULT_PORT);
        assert_eq!(config.max_channels, 9);
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.handshake_timeout, Some(Duration::from_secs(10)));
        assert!(config.cert_dir.is_none());
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .cert_dir("/etc/relay/certs")
            .secret("s3cret")
            .max_channels(4)
            .read_buffer_size(4096)
            .handshake_timeout(Duration::from_secs(2))
            .max_connections(50);

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.cert_dir, Some(PathBuf::from("/etc/relay/certs")));
        assert_eq!(config.secret, "s3cret");
        assert_eq!(config.max_channels, 4);
        assert_eq!(config.read_buffer_size, 4096);
        assert_eq!(config.handshake_timeout, Some(Duration::from_secs(2)));
        assert_eq!(config.max_connections, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(ServerConfig::default().validate().is_err());
        assert!(ServerConfig::default().secret("a\nb").validate().is_err());
        assert!(ServerConfig::default()
            .secret("x")
            .max_channels(0)
            .validate()
            .is_err());
        assert!(ServerConfig::default()
            .secret("x")
            .read_buffer_size(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_unaddressable_channels() {
        assert!(!ServerConfig::default().has_unaddressable_channels());
        assert!(ServerConfig::default()
            .max_channels(12)
            .has_unaddressable_channels());
    }

    #[test]
    fn test_from_lookup() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("RELAY_BIND_ADDR", "127.0.0.1:7000"),
            ("RELAY_CERT_DIR", "/certs"),
            ("RELAY_SECRET", "hunter2"),
            ("RELAY_MAX_CHANNELS", "4"),
            ("RELAY_READ_BUFFER_SIZE", "8192"),
            ("RELAY_HANDSHAKE_TIMEOUT_SECS", "0"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr.port(), 7000);
        assert_eq!(config.cert_dir, Some(PathBuf::from("/certs")));
        assert_eq!(config.secret, "hunter2");
        assert_eq!(config.max_channels, 4);
        assert_eq!(config.read_buffer_size, 8192);
        assert_eq!(config.handshake_timeout, None);
    }

    #[test]
    fn test_from_lookup_requires_secret() {
        let err = ServerConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("RELAY_SECRET"));
    }

    #[test]
    fn test_from_lookup_invalid_number() {
        let err = ServerConfig::from_lookup(lookup(&[
            ("RELAY_SECRET", "x"),
            ("RELAY_MAX_CHANNELS", "many"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("RELAY_MAX_CHANNELS"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = ServerConfig::default().secret("hunter2");
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
