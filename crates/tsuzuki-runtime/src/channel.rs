//! How the tracker reaches the progress store.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use chrono::Utc;
use tokio::sync::oneshot;

use tsuzuki_core::config::RetentionConfig;
use tsuzuki_core::messages::{GetProgressResponse, SaveProgressRequest, SaveProgressResponse};
use tsuzuki_core::models::StoredProgressRecord;
use tsuzuki_core::progress::ProgressService;
use tsuzuki_core::storage::{MemoryStore, ProgressStore};

/// Message round-trips to the persistent store.
///
/// Both calls return immediately; the reply arrives on the receiver, or the
/// receiver reports closed if the store went away. Nothing is retried.
pub trait ProgressChannel {
    /// Whether the store can still be reached. Checked before every call.
    fn is_connected(&self) -> bool;

    fn save_progress(&self, request: SaveProgressRequest) -> oneshot::Receiver<SaveProgressResponse>;

    fn get_progress(&self, url: &str) -> oneshot::Receiver<GetProgressResponse>;
}

/// Store living in the same thread as the tracker. Replies are ready by the
/// time the call returns.
#[derive(Clone)]
pub struct MemoryChannel {
    service: Rc<RefCell<ProgressService<MemoryStore>>>,
    connected: Rc<Cell<bool>>,
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::with_retention(RetentionConfig::default())
    }

    pub fn with_retention(retention: RetentionConfig) -> Self {
        Self {
            service: Rc::new(RefCell::new(ProgressService::new(MemoryStore::new(), retention))),
            connected: Rc::new(Cell::new(true)),
        }
    }

    /// Simulate the store becoming unreachable (or reachable again).
    pub fn set_connected(&self, connected: bool) {
        self.connected.set(connected);
    }

    /// Every stored record, newest first.
    pub fn records(&self) -> Vec<StoredProgressRecord> {
        self.service
            .borrow()
            .store()
            .all_records()
            .unwrap_or_default()
    }

    /// Run `f` against the underlying service.
    pub fn with_service<R>(&self, f: impl FnOnce(&mut ProgressService<MemoryStore>) -> R) -> R {
        f(&mut self.service.borrow_mut())
    }
}

impl ProgressChannel for MemoryChannel {
    fn is_connected(&self) -> bool {
        self.connected.get()
    }

    fn save_progress(&self, request: SaveProgressRequest) -> oneshot::Receiver<SaveProgressResponse> {
        let (reply, rx) = oneshot::channel();
        if self.connected.get() {
            let response = match self.service.borrow_mut().save(&request, Utc::now()) {
                Ok(_) => SaveProgressResponse::ok(),
                Err(e) => SaveProgressResponse::failed(e),
            };
            let _ = reply.send(response);
        }
        rx
    }

    fn get_progress(&self, url: &str) -> oneshot::Receiver<GetProgressResponse> {
        let (reply, rx) = oneshot::channel();
        if self.connected.get() {
            let response = match self.service.borrow().get_progress(url) {
                Ok(data) => GetProgressResponse { success: true, data },
                Err(e) => {
                    tracing::warn!(url, error = %e, "Progress lookup failed");
                    GetProgressResponse {
                        success: false,
                        data: None,
                    }
                }
            };
            let _ = reply.send(response);
        }
        rx
    }
}
