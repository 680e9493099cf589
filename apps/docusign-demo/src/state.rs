//! Application state for the demo API

use anysign_core::{
    BackendError, BackendRegistry, BackendSettings, CallbackHandler, EntityLocks,
    SignatureBackend, SignatureStore,
};
use docusign_backend::{DocuSignBackend, BACKEND_CODE};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::config::Config;
use crate::db::SqliteStore;

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn SignatureStore>,
    pub registry: BackendRegistry,
    pub locks: Arc<EntityLocks>,
    settings: RwLock<BackendSettings>,
    /// Configured backends by code, dropped whenever the settings change
    backends: Mutex<HashMap<String, Arc<dyn SignatureBackend>>>,
}

impl AppState {
    /// SQLite store and the DocuSign backend
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = SqliteStore::connect(&config.database_url).await?;
        let registry = BackendRegistry::new().register(BACKEND_CODE, DocuSignBackend::factory);
        Ok(Self::with_store(config, Arc::new(store), registry))
    }

    pub fn with_store(
        config: Config,
        store: Arc<dyn SignatureStore>,
        registry: BackendRegistry,
    ) -> Self {
        Self {
            config,
            store,
            registry,
            locks: Arc::new(EntityLocks::new()),
            settings: RwLock::new(BackendSettings::new()),
            backends: Mutex::new(HashMap::new()),
        }
    }

    pub async fn settings(&self) -> BackendSettings {
        self.settings.read().await.clone()
    }

    /// Merge non-empty values into the stored settings and return the result
    pub async fn update_settings(&self, incoming: &BackendSettings) -> BackendSettings {
        let merged = {
            let mut settings = self.settings.write().await;
            settings.merge(incoming);
            settings.clone()
        };
        self.backends.lock().await.clear();
        tracing::info!("Backend settings updated");
        merged
    }

    pub async fn backend(&self, code: &str) -> Result<Arc<dyn SignatureBackend>, BackendError> {
        let mut backends = self.backends.lock().await;
        if let Some(backend) = backends.get(code) {
            return Ok(backend.clone());
        }
        let settings = self.settings().await;
        let backend = self.registry.get(code, &settings)?;
        backends.insert(code.to_string(), backend.clone());
        Ok(backend)
    }

    pub fn callback_handler(&self, backend: Arc<dyn SignatureBackend>) -> CallbackHandler {
        CallbackHandler::new(self.store.clone(), backend, self.locks.clone())
            .with_fetch_timeout(self.config.fetch_timeout)
    }
}
