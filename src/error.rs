//! Error types
//!
//! Per-connection protocol failures never surface here: they are reported to
//! the client as response codes (see [`crate::auth::AuthOutcome`]). These
//! errors cover transport, TLS setup and configuration.

use crate::registry::RegistryError;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Socket or file I/O failure
    Io(std::io::Error),
    /// TLS identity or handshake failure
    Tls(native_tls::Error),
    /// Invalid or missing configuration
    Config(String),
    /// Channel claim rejected by the registry
    Registry(RegistryError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Tls(e) => write!(f, "TLS error: {}", e),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Registry(e) => write!(f, "Registry error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Tls(e) => Some(e),
            Error::Config(_) => None,
            Error::Registry(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<native_tls::Error> for Error {
    fn from(e: native_tls::Error) -> Self {
        Error::Tls(e)
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Error::Registry(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ChannelNumber;

    #[test]
    fn test_error_display() {
        let io = Error::from(std::io::Error::new(
            std::io::ErrorKind::AddrInUse,
            "port in use",
        ));
        assert!(io.to_string().contains("port in use"));

        let config = Error::Config("missing RELAY_SECRET".into());
        assert_eq!(
            config.to_string(),
            "Configuration error: missing RELAY_SECRET"
        );

        let registry = Error::from(RegistryError::Busy(ChannelNumber::new(3)));
        assert!(registry.to_string().contains("Channel 3"));
    }

    #[test]
    fn test_error_source() {
        use std::error::Error as _;

        let io = Error::from(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert!(io.source().is_some());
        assert!(Error::Config("x".into()).source().is_none());
    }
}
