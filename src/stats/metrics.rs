//! Statistics for relay connections

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Per-connection statistics
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// Total stream bytes received after authentication
    pub bytes_received: u64,
    /// Number of chunks dispatched
    pub chunks: u64,
    /// Chunks that reached no consumer
    pub undelivered_chunks: u64,
    /// Connection duration
    pub duration: Duration,
    /// Average bitrate (bits/sec)
    pub bitrate: u64,
    started_at: Instant,
}

impl SessionStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self {
            bytes_received: 0,
            chunks: 0,
            undelivered_chunks: 0,
            duration: Duration::ZERO,
            bitrate: 0,
            started_at: Instant::now(),
        }
    }

    /// Record one dispatched chunk
    pub fn record_chunk(&mut self, len: usize, delivered_to: usize) {
        self.bytes_received += len as u64;
        self.chunks += 1;
        if delivered_to == 0 {
            self.undelivered_chunks += 1;
        }
    }

    /// Update duration and bitrate from the start time
    pub fn finish(&mut self) {
        self.duration = self.started_at.elapsed();
        self.calculate_bitrate();
    }

    /// Calculate bitrate from bytes and duration
    pub fn calculate_bitrate(&mut self) {
        let secs = self.duration.as_secs();
        if secs > 0 {
            self.bitrate = (self.bytes_received * 8) / secs;
        }
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Server-wide statistics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Total connections ever accepted
    pub total_connections: u64,
    /// Connections currently being handled
    pub active_connections: u64,
    /// Handshakes that ended with a claimed channel
    pub authenticated: u64,
    /// Handshakes answered with an error code
    pub rejected: u64,
    /// Total stream bytes received
    pub total_bytes_received: u64,
    /// Server uptime
    pub uptime: Duration,
}

/// Live counters behind [`ServerStats`]
#[derive(Debug)]
pub struct ServerCounters {
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    authenticated: AtomicU64,
    rejected: AtomicU64,
    total_bytes_received: AtomicU64,
    started_at: Instant,
}

impl ServerCounters {
    /// Create zeroed counters, starting the uptime clock
    pub fn new() -> Self {
        Self {
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            authenticated: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            total_bytes_received: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Count a newly accepted connection
    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold a finished session into the totals
    pub fn connection_closed(&self, session: &SessionStats) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
        self.total_bytes_received
            .fetch_add(session.bytes_received, Ordering::Relaxed);
    }

    /// Count a handshake as authenticated or rejected
    pub fn record_auth(&self, success: bool) {
        if success {
            self.authenticated.fetch_add(1, Ordering::Relaxed);
        } else {
            self.rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Take a snapshot of the current values
    pub fn snapshot(&self) -> ServerStats {
        ServerStats {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            authenticated: self.authenticated.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            total_bytes_received: self.total_bytes_received.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }
}

impl Default for ServerCounters {
    fn default() -> Self {
        Self::new()
    }
}
