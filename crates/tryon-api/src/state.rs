//! Application state.

use std::sync::Arc;

use crate::auth::JwtKeys;
use crate::config::ApiConfig;
use crate::services::{InMemoryUserStore, UploadService, UserService, UserStore};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub users: UserService,
    pub uploads: Arc<UploadService>,
    pub keys: Arc<JwtKeys>,
}

impl AppState {
    /// State backed by an in-memory account store.
    pub fn new(config: ApiConfig) -> Self {
        Self::with_store(config, Arc::new(InMemoryUserStore::new()))
    }

    /// State over a caller-provided account store.
    pub fn with_store(config: ApiConfig, store: Arc<dyn UserStore>) -> Self {
        let keys = Arc::new(JwtKeys::new(&config.jwt_secret, config.token_ttl));
        let users = UserService::new(store, Arc::clone(&keys));
        let uploads = Arc::new(UploadService::from_config(&config));
        Self {
            config,
            users,
            uploads,
            keys,
        }
    }
}
