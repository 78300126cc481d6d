//! richscan-http: REST client for Blockbook-style block indexers.
//!
//! Features:
//! - Height, block (inline or by-reference transactions) and transaction fetches
//! - Paged block responses followed to the last page
//! - Retry with exponential backoff on transient conditions
//!   (timeouts, 408, 413, 429, 5xx, connection errors)
//! - Timeout and retry budget taken from the active `ScannerProfile`

pub mod client;
pub mod error;
pub mod retry;
pub mod wire;

pub use client::{HttpClientConfig, HttpIndexerClient};
pub use error::ClientError;
pub use retry::{RetryConfig, RetryPolicy};
