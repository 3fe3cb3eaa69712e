//! Image payload handling: caching, loading and decoding.
//!
//! These are the leaf building blocks the pipeline schedules onto its worker
//! pools. None of them know about tasks or requesters.

mod cache;
mod decode;
mod loader;

pub use cache::{CacheStats, DEFAULT_CAPACITY_BYTES, MemoryCache, Payload};
pub use decode::{PixelBuffer, decode};
pub use loader::{Fetcher, HttpFetcher, Loaded, PayloadLoader, Provenance, read_cancellable};

#[cfg(test)]
pub(crate) use decode::tests::png as test_png;
