//! Fan-out of stream data to consumers
//!
//! Every chunk read from an authenticated connection is tagged with its
//! channel and handed to each configured consumer through that consumer's
//! bounded queue.
//!
//! # Zero-Copy Design
//!
//! `bytes::Bytes` is reference counted, so all consumers share the same
//! allocation. Cloning a [`StreamChunk`] for each consumer only bumps the
//! reference count.
//!
//! # Backpressure
//!
//! Delivery awaits queue capacity. A stalled consumer therefore slows the
//! connections feeding it, each of which waits independently; other
//! connections keep running.

pub mod chunk;
pub mod fanout;

pub use chunk::StreamChunk;
pub use fanout::{Consumer, FanOut, DEFAULT_CONSUMER_CAPACITY};
