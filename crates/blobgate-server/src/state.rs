use std::sync::Arc;

use blobgate_store::BlobStore;

use crate::auth::{AuthProvider, HeaderAuth};
use crate::config::GatewayConfig;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub store: Arc<dyn BlobStore>,
    pub auth: Arc<dyn AuthProvider>,
}

impl AppState {
    pub fn new(config: GatewayConfig, store: Arc<dyn BlobStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
            auth: Arc::new(HeaderAuth),
        }
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = auth;
        self
    }
}
