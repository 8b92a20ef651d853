use std::sync::Arc;

use crate::config::AppConfig;
use crate::notify::FcmDispatcher;
use crate::session::ChatSession;
use crate::storage::SledStore;

pub struct AppState {
    config: AppConfig,
    store: Arc<SledStore>,
    dispatch: Arc<FcmDispatcher>,
}

impl AppState {
    pub fn new(config: AppConfig) -> anyhow::Result<Arc<Self>> {
        let store = Arc::new(SledStore::open(&config.storage_path)?);
        let dispatch = Arc::new(FcmDispatcher::new(
            config.fcm_endpoint.clone(),
            config.fcm_server_key.clone(),
        ));
        Ok(Self::from_parts(config, store, dispatch))
    }

    /// Assemble state from pre-built parts (tests, embedding).
    pub fn from_parts(
        config: AppConfig,
        store: Arc<SledStore>,
        dispatch: Arc<FcmDispatcher>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            dispatch,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn build_id(&self) -> &str {
        &self.config.build_id
    }

    pub fn store(&self) -> &Arc<SledStore> {
        &self.store
    }

    /// Fresh chat session wired to this node's store and push gateway.
    pub fn chat_session(&self) -> ChatSession {
        ChatSession::new(
            self.store.clone(),
            self.store.clone(),
            self.dispatch.clone(),
        )
    }
}
