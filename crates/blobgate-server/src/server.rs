use std::sync::Arc;

use blobgate_store::{BlobStore, InMemoryBlobStore, RemoteBlobStore};
use tokio::net::TcpListener;
use tokio::runtime::Handle;

use crate::config::{GatewayConfig, StorageBackend};
use crate::error::{ServerError, ServerResult};
use crate::router::build_router;
use crate::state::AppState;

/// Blobgate HTTP gateway.
pub struct GatewayServer {
    state: AppState,
}

impl GatewayServer {
    /// Connect the configured storage backend.
    ///
    /// Must be called from within a tokio runtime; the S3 backend keeps a
    /// handle to it.
    pub fn new(config: GatewayConfig) -> ServerResult<Self> {
        let store = connect_store(&config)?;
        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: GatewayConfig, store: Arc<dyn BlobStore>) -> Self {
        Self {
            state: AppState::new(config, store),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.state.config
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Serve requests until interrupted.
    pub async fn serve(self) -> ServerResult<()> {
        let addr = self.state.config.bind_addr;
        let app = self.router();
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(
            %addr,
            bucket = self.state.store.bucket(),
            "blobgate listening"
        );
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

fn connect_store(config: &GatewayConfig) -> ServerResult<Arc<dyn BlobStore>> {
    let bucket = config.storage.bucket.clone();
    match config.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!(%bucket, "using in-memory storage; objects are lost on exit");
            Ok(Arc::new(
                InMemoryBlobStore::new(bucket).with_page_size(config.list_page_size),
            ))
        }
        StorageBackend::S3 => {
            let settings = config.storage.s3_settings()?;
            let handle = Handle::try_current()
                .map_err(|e| ServerError::Config(format!("no async runtime: {e}")))?;
            let store = RemoteBlobStore::s3(&settings, handle)
                .map_err(|e| ServerError::Config(e.to_string()))?
                .with_page_size(config.list_page_size);
            tracing::info!(endpoint = %settings.endpoint, %bucket, "connected to object storage");
            Ok(Arc::new(store))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.storage.backend = StorageBackend::Memory;
        config.storage.bucket = "scratch".into();
        config
    }

    #[test]
    fn memory_backend_construction() {
        let server = GatewayServer::new(memory_config()).unwrap();
        assert_eq!(server.config().bind_addr.port(), 8081);
        assert_eq!(server.state.store.bucket(), "scratch");
    }

    #[test]
    fn s3_backend_needs_credentials() {
        let mut config = memory_config();
        config.storage.backend = StorageBackend::S3;
        assert!(matches!(
            GatewayServer::new(config),
            Err(ServerError::Config(_))
        ));
    }

    #[tokio::test]
    async fn s3_backend_connects_lazily() {
        let mut config = memory_config();
        config.storage.backend = StorageBackend::S3;
        config.storage.account_id = Some("acct".into());
        config.storage.access_key = Some("key".into());
        config.storage.secret_key = Some("secret".into());
        let server = GatewayServer::new(config).unwrap();
        assert_eq!(server.state.store.bucket(), "scratch");
    }

    #[test]
    fn router_builds() {
        let server = GatewayServer::new(memory_config()).unwrap();
        let _router = server.router();
    }
}
