//! Relay server binary
//!
//! Configured through `RELAY_*` environment variables (see
//! [`ServerConfig::from_env`]). Logging is controlled with `RUST_LOG`.
//!
//! ```text
//! RELAY_SECRET=hunter2 RELAY_CERT_DIR=./certs RUST_LOG=info chanrelay
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use chanrelay::{ChannelNumber, Consumer, RelayServer, ServerConfig, StreamChunk};

const REPORT_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;
    tracing::debug!(config = ?config, "Loaded configuration");

    let (consumer, chunks) = Consumer::named("throughput", config.consumer_capacity);
    tokio::spawn(report_throughput(chunks));

    let tls_enabled = config.cert_dir.is_some();
    let mut server = RelayServer::new(config, vec![consumer])?;
    if tls_enabled {
        server = server.load_tls()?;
    } else {
        tracing::warn!("RELAY_CERT_DIR not set, accepting plaintext connections");
    }

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Unable to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    let stats = server.stats();
    tracing::info!(
        total_connections = stats.total_connections,
        authenticated = stats.authenticated,
        rejected = stats.rejected,
        bytes = stats.total_bytes_received,
        "Server stopped"
    );
    Ok(())
}

/// Periodically log how much data each channel delivered
async fn report_throughput(mut chunks: mpsc::Receiver<StreamChunk>) {
    let mut bytes: BTreeMap<ChannelNumber, u64> = BTreeMap::new();
    let mut ticker = tokio::time::interval(REPORT_INTERVAL);

    loop {
        tokio::select! {
            chunk = chunks.recv() => match chunk {
                Some(chunk) => *bytes.entry(chunk.channel).or_default() += chunk.len() as u64,
                None => break,
            },
            _ = ticker.tick() => {
                for (channel, count) in std::mem::take(&mut bytes) {
                    tracing::info!(
                        channel = %channel,
                        bytes = count,
                        bitrate = count * 8 / REPORT_INTERVAL.as_secs(),
                        "Channel throughput"
                    );
                }
            }
        }
    }
}
