//! Listener lifecycle for the snapshot API.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use richscan_core::SnapshotStore;

use crate::error::ServerError;
use crate::routes::router;

/// Serves the snapshot API until its shutdown token is cancelled.
pub struct SnapshotServer {
    bind_addr: SocketAddr,
    store: Arc<dyn SnapshotStore>,
    shutdown_token: CancellationToken,
}

impl SnapshotServer {
    pub fn new(bind_addr: SocketAddr, store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            bind_addr,
            store,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Share an existing token so one cancel stops the server and its siblings.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown_token = token;
        self
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    #[instrument(name = "snapshot_server::run", skip(self), fields(bind_addr = %self.bind_addr))]
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.bind_addr).await.map_err(|e| {
            error!(bind_addr = %self.bind_addr, error = ?e, "failed to bind snapshot server");
            ServerError::BindAddress {
                addr: self.bind_addr,
                source: e,
            }
        })?;
        self.serve(listener).await
    }

    /// Serve on an already-bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let addr = listener.local_addr().unwrap_or(self.bind_addr);
        info!(%addr, "snapshot server listening");

        let shutdown = self.shutdown_token.clone();
        axum::serve(listener, router(self.store.clone()))
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| {
                error!(error = ?e, "snapshot server failed");
                ServerError::Serve { addr, source: e }
            })?;

        info!(%addr, "snapshot server stopped");
        Ok(())
    }

    pub fn stop(&self) {
        info!("stopping snapshot server");
        self.shutdown_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use richscan_core::MemorySnapshotStore;
    use std::time::Duration;

    #[tokio::test]
    async fn stops_on_cancel() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = Arc::new(SnapshotServer::new(
            listener.local_addr().unwrap(),
            Arc::new(MemorySnapshotStore::new()),
        ));

        let task = {
            let server = server.clone();
            tokio::spawn(async move { server.serve(listener).await })
        };
        server.stop();

        let res = tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
        assert!(res.is_ok());
    }

    #[tokio::test]
    async fn reports_bind_failure() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = SnapshotServer::new(taken.local_addr().unwrap(), Arc::new(MemorySnapshotStore::new()));
        assert!(matches!(server.run().await, Err(ServerError::BindAddress { .. })));
    }
}
