use std::path::Path;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};

use tsuzuki_core::config::RetentionConfig;
use tsuzuki_core::error::TsuzukiError;
use tsuzuki_core::messages::{GetProgressResponse, SaveProgressRequest, SaveProgressResponse};
use tsuzuki_core::models::StoredProgressRecord;
use tsuzuki_core::progress::{ProgressService, SaveOutcome};
use tsuzuki_core::storage::{ProgressStore, Storage};

use crate::channel::ProgressChannel;

/// Handle to the progress store running on its own thread.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::UnboundedSender<StoreCommand>,
}

enum StoreCommand {
    Save {
        request: Box<SaveProgressRequest>,
        reply: oneshot::Sender<Result<SaveOutcome, TsuzukiError>>,
    },
    GetProgress {
        url: String,
        reply: oneshot::Sender<Result<Option<StoredProgressRecord>, TsuzukiError>>,
    },
    PruneFinished {
        reply: oneshot::Sender<Result<Vec<String>, TsuzukiError>>,
    },
    TrackedKeys {
        reply: oneshot::Sender<Result<Vec<String>, TsuzukiError>>,
    },
    AllRecords {
        reply: oneshot::Sender<Result<Vec<StoredProgressRecord>, TsuzukiError>>,
    },
    // Message-shaped variants serving the tracker's channel.
    SaveMessage {
        request: Box<SaveProgressRequest>,
        reply: oneshot::Sender<SaveProgressResponse>,
    },
    GetMessage {
        url: String,
        reply: oneshot::Sender<GetProgressResponse>,
    },
}

impl StoreHandle {
    /// Open the SQLite store at `path` and start the actor.
    pub fn open(path: &Path, retention: RetentionConfig) -> Result<Self, TsuzukiError> {
        let storage = Storage::open(path)?;
        Self::spawn(storage, retention)
    }

    /// Start the actor over any store. A retention sweep runs before the first
    /// command is served.
    pub fn spawn<S>(store: S, retention: RetentionConfig) -> Result<Self, TsuzukiError>
    where
        S: ProgressStore + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = ProgressService::new(store, retention);

        std::thread::Builder::new()
            .name("store-actor".into())
            .spawn(move || actor_loop(service, rx))?;

        Ok(Self { tx })
    }

    pub async fn save(&self, request: SaveProgressRequest) -> Result<SaveOutcome, TsuzukiError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(StoreCommand::Save {
            request: Box::new(request),
            reply,
        });
        rx.await.unwrap_or(Err(TsuzukiError::StoreClosed))
    }

    pub async fn lookup(&self, url: &str) -> Result<Option<StoredProgressRecord>, TsuzukiError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(StoreCommand::GetProgress {
            url: url.to_string(),
            reply,
        });
        rx.await.unwrap_or(Err(TsuzukiError::StoreClosed))
    }

    pub async fn prune_finished(&self) -> Result<Vec<String>, TsuzukiError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(StoreCommand::PruneFinished { reply });
        rx.await.unwrap_or(Err(TsuzukiError::StoreClosed))
    }

    pub async fn tracked_keys(&self) -> Result<Vec<String>, TsuzukiError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(StoreCommand::TrackedKeys { reply });
        rx.await.unwrap_or(Err(TsuzukiError::StoreClosed))
    }

    pub async fn all_records(&self) -> Result<Vec<StoredProgressRecord>, TsuzukiError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(StoreCommand::AllRecords { reply });
        rx.await.unwrap_or(Err(TsuzukiError::StoreClosed))
    }
}

impl ProgressChannel for StoreHandle {
    fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }

    fn save_progress(&self, request: SaveProgressRequest) -> oneshot::Receiver<SaveProgressResponse> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(StoreCommand::SaveMessage {
            request: Box::new(request),
            reply,
        });
        rx
    }

    fn get_progress(&self, url: &str) -> oneshot::Receiver<GetProgressResponse> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(StoreCommand::GetMessage {
            url: url.to_string(),
            reply,
        });
        rx
    }
}

fn actor_loop<S: ProgressStore>(
    mut service: ProgressService<S>,
    mut rx: mpsc::UnboundedReceiver<StoreCommand>,
) {
    match service.prune_finished(Utc::now()) {
        Ok(removed) if !removed.is_empty() => {
            tracing::info!(count = removed.len(), "Start-up retention sweep");
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("Retention sweep failed: {e}"),
    }

    while let Some(cmd) = rx.blocking_recv() {
        match cmd {
            StoreCommand::Save { request, reply } => {
                let _ = reply.send(service.save(&request, Utc::now()));
            }
            StoreCommand::GetProgress { url, reply } => {
                let _ = reply.send(service.get_progress(&url));
            }
            StoreCommand::PruneFinished { reply } => {
                let _ = reply.send(service.prune_finished(Utc::now()));
            }
            StoreCommand::TrackedKeys { reply } => {
                let _ = reply.send(service.tracked_keys());
            }
            StoreCommand::AllRecords { reply } => {
                let _ = reply.send(service.store().all_records());
            }
            StoreCommand::SaveMessage { request, reply } => {
                let response = match service.save(&request, Utc::now()) {
                    Ok(_) => SaveProgressResponse::ok(),
                    Err(e) => {
                        tracing::warn!(error = %e, "Save failed");
                        SaveProgressResponse::failed(e)
                    }
                };
                let _ = reply.send(response);
            }
            StoreCommand::GetMessage { url, reply } => {
                let response = match service.get_progress(&url) {
                    Ok(data) => GetProgressResponse { success: true, data },
                    Err(e) => {
                        tracing::warn!(url = %url, error = %e, "Progress lookup failed");
                        GetProgressResponse {
                            success: false,
                            data: None,
                        }
                    }
                };
                let _ = reply.send(response);
            }
        }
    }
    tracing::debug!("Store actor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tsuzuki_core::models::{ContentType, PlaybackMetadata};
    use tsuzuki_core::storage::MemoryStore;

    fn episode(n: u32) -> SaveProgressRequest {
        SaveProgressRequest {
            metadata: PlaybackMetadata {
                title: "Show".into(),
                series_title: Some("Show".into()),
                platform: "Netflix".into(),
                content_type: ContentType::Episode,
                season_number: Some(1),
                episode_number: Some(n),
                url: format!("https://www.netflix.com/watch/10{n}"),
                ..Default::default()
            },
            current_time: 120.0,
            duration: 1800.0,
        }
    }

    #[tokio::test]
    async fn test_save_and_lookup_through_actor() {
        let handle = StoreHandle::spawn(MemoryStore::new(), RetentionConfig::default()).unwrap();
        handle.save(episode(2)).await.unwrap();
        handle.save(episode(3)).await.unwrap();

        let records = handle.all_records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].episode_number, Some(3));

        let found = handle
            .lookup("https://www.netflix.com/watch/103?trackId=1")
            .await
            .unwrap();
        assert!(found.is_some());
        assert_eq!(handle.tracked_keys().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_startup_sweep_prunes_finished() {
        let mut store = MemoryStore::new();
        let mut service = ProgressService::new(MemoryStore::new(), RetentionConfig::default());
        let mut old = episode(1);
        old.current_time = 1790.0;
        service.save(&old, Utc::now() - Duration::days(60)).unwrap();
        for record in service.store().all_records().unwrap() {
            store.put(&record).unwrap();
        }

        let handle = StoreHandle::spawn(store, RetentionConfig::default()).unwrap();
        assert!(handle.all_records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_channel_replies_arrive() {
        let handle = StoreHandle::spawn(MemoryStore::new(), RetentionConfig::default()).unwrap();
        assert!(handle.is_connected());
        let saved = handle.save_progress(episode(4)).await.unwrap();
        assert!(saved.success);
        let found = handle
            .get_progress("https://www.netflix.com/watch/104")
            .await
            .unwrap();
        assert!(found.success);
        assert_eq!(found.data.unwrap().episode_number, Some(4));
    }

    #[tokio::test]
    async fn test_sqlite_backed_handle() {
        let dir = tempfile::tempdir().unwrap();
        let handle = StoreHandle::open(&dir.path().join("progress.db"), RetentionConfig::default())
            .unwrap();
        handle.save(episode(5)).await.unwrap();
        assert_eq!(handle.all_records().await.unwrap().len(), 1);
    }
}
