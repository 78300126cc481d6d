//! richscan-server: read-only HTTP API over the published rich-list snapshot.
//!
//! Routes:
//! - `GET /health`
//! - `GET /rich-list`
//! - `GET /rich-list/metadata`
//! - `GET /rich-list/paginated?page=N&pageSize=M`
//!
//! The server never triggers a scan; it only reads whatever the scan engine
//! last published to the [`SnapshotStore`](richscan_core::SnapshotStore).

pub mod error;
pub mod routes;
pub mod server;

pub use error::{ApiError, ServerError};
pub use routes::router;
pub use server::SnapshotServer;
