//! TLS identity loading
//!
//! The certificate directory must contain `server.pem` (certificate chain)
//! and `server.key` (PKCS#8 private key), both PEM encoded.

use std::path::Path;

use tokio_native_tls::TlsAcceptor;

use crate::error::{Error, Result};

/// Certificate chain file name inside the certificate directory
pub const CERT_FILE: &str = "server.pem";
/// Private key file name inside the certificate directory
pub const KEY_FILE: &str = "server.key";

/// Build a TLS acceptor from a certificate directory
pub fn load_acceptor(cert_dir: &Path) -> Result<TlsAcceptor> {
    load_acceptor_from(&cert_dir.join(CERT_FILE), &cert_dir.join(KEY_FILE))
}

/// Build a TLS acceptor from explicit certificate and key paths
pub fn load_acceptor_from(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor> {
    let cert = read_pem(cert_path)?;
    let key = read_pem(key_path)?;

    let identity = native_tls::Identity::from_pkcs8(&cert, &key)?;
    let acceptor = native_tls::TlsAcceptor::new(identity)?;

    tracing::debug!(cert = %cert_path.display(), "Loaded server key pair");
    Ok(TlsAcceptor::from(acceptor))
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        Error::Config(format!(
            "unable to load server key pair from {}: {}",
            path.display(),
            e
        ))
    })
}
