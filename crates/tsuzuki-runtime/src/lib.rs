//! Everything that runs on a page: the session tracker and what it talks to.

mod channel;
mod composer;
mod frame;
mod session;
mod store;
mod timers;

use std::sync::Arc;

use tokio::sync::RwLock;

use tsuzuki_core::config::AppConfig;
use tsuzuki_core::models::StoredProgressRecord;
use tsuzuki_detect::{Dom, SourceDatabase, StrategyRegistry};

pub use channel::{MemoryChannel, ProgressChannel};
pub use composer::MetadataComposer;
pub use tsuzuki_core::identity::metadata_signature;
pub use frame::{FrameBridge, FrameTarget, NoFrames};
pub use session::{ResumeOffer, SessionTracker, TrackerState};
pub use store::StoreHandle;
pub use timers::{TimerKind, TimerQueue};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("config error: {0}")]
    Config(String),
    #[error("store error: {0}")]
    Store(String),
}

/// Loaded configuration plus a running progress store.
pub struct Runtime {
    store: StoreHandle,
    config: Arc<RwLock<AppConfig>>,
}

impl Runtime {
    /// Load the user's config and open the store in their data directory.
    pub fn new() -> Result<Self, RuntimeError> {
        let config = AppConfig::load().map_err(|e| RuntimeError::Config(e.to_string()))?;
        let db_path =
            AppConfig::ensure_db_path().map_err(|e| RuntimeError::Config(e.to_string()))?;
        let store = StoreHandle::open(&db_path, config.retention.clone())
            .map_err(|e| RuntimeError::Store(e.to_string()))?;
        Ok(Self::with_store(store, config))
    }

    pub fn with_store(store: StoreHandle, config: AppConfig) -> Self {
        Self {
            store,
            config: Arc::new(RwLock::new(config)),
        }
    }

    pub fn store_handle(&self) -> StoreHandle {
        self.store.clone()
    }

    pub async fn get_config(&self) -> AppConfig {
        self.config.read().await.clone()
    }

    pub async fn update_config(&self, new_config: AppConfig) -> Result<(), RuntimeError> {
        new_config
            .save()
            .map_err(|e| RuntimeError::Config(e.to_string()))?;
        *self.config.write().await = new_config;
        Ok(())
    }

    /// A tracker for `dom` saving through this runtime's store.
    pub async fn tracker<'a>(&self, dom: &'a dyn Dom) -> SessionTracker<'a, StoreHandle> {
        SessionTracker::new(dom, strategy_registry(), self.store.clone(), self.get_config().await)
    }

    pub async fn lookup(&self, url: &str) -> Result<Option<StoredProgressRecord>, RuntimeError> {
        self.store
            .lookup(url)
            .await
            .map_err(|e| RuntimeError::Store(e.to_string()))
    }

    pub async fn records(&self) -> Result<Vec<StoredProgressRecord>, RuntimeError> {
        self.store
            .all_records()
            .await
            .map_err(|e| RuntimeError::Store(e.to_string()))
    }

    pub async fn tracked_keys(&self) -> Result<Vec<String>, RuntimeError> {
        self.store
            .tracked_keys()
            .await
            .map_err(|e| RuntimeError::Store(e.to_string()))
    }

    pub async fn prune_finished(&self) -> Result<Vec<String>, RuntimeError> {
        self.store
            .prune_finished()
            .await
            .map_err(|e| RuntimeError::Store(e.to_string()))
    }
}

/// Embedded source definitions, overlaid with the user's `sources.toml` when
/// one exists next to the config file.
pub fn source_database() -> SourceDatabase {
    let mut db = SourceDatabase::embedded();
    let path = AppConfig::sources_path();
    match std::fs::read_to_string(&path) {
        Ok(content) => match SourceDatabase::from_toml(&content) {
            Ok(user) => {
                tracing::info!(path = %path.display(), sources = user.len(), "Loaded user sources");
                db.merge_user(&user);
            }
            Err(e) => tracing::warn!(path = %path.display(), "Ignoring invalid sources file: {e}"),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "Could not read sources file: {e}"),
    }
    db
}

pub fn strategy_registry() -> StrategyRegistry {
    let mut registry = StrategyRegistry::new();
    source_database().register_all(&mut registry);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsuzuki_core::config::RetentionConfig;
    use tsuzuki_core::storage::MemoryStore;

    #[tokio::test]
    async fn test_runtime_over_memory_store() {
        let store = StoreHandle::spawn(MemoryStore::new(), RetentionConfig::default()).unwrap();
        let runtime = Runtime::with_store(store, AppConfig::default());
        assert!(runtime.records().await.unwrap().is_empty());
        assert!(runtime.lookup("https://example.com/watch/1").await.unwrap().is_none());
        assert_eq!(runtime.get_config().await.save.interval_ms, 5000);
    }
}
