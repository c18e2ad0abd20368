use std::sync::Arc;

use crate::errors::Result;
use crate::models::PendingDownload;
use crate::services::session_storage::SessionStorage;

pub const PENDING_DOWNLOAD_KEY: &str = "pendingDownload";

/// Single slot holding the download that is waiting for its ad unlock.
#[derive(Clone)]
pub struct PendingDownloadStore {
    storage: Arc<dyn SessionStorage>,
}

impl PendingDownloadStore {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self { storage }
    }

    pub fn set(&self, pending: &PendingDownload) -> Result<()> {
        let payload = serde_json::to_string(pending)?;
        self.storage.set_item(PENDING_DOWNLOAD_KEY, &payload)?;
        tracing::debug!(app = %pending.app_name, "stored pending download");
        Ok(())
    }

    /// Returns `None` for a missing slot, unreadable storage, or corrupt data.
    pub fn get(&self) -> Option<PendingDownload> {
        let raw = match self.storage.get_item(PENDING_DOWNLOAD_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!("pending download slot unreadable: {}", err);
                return None;
            }
        };

        match serde_json::from_str::<PendingDownload>(&raw) {
            Ok(pending) => Some(pending),
            Err(err) => {
                tracing::warn!("discarding corrupt pending download: {}", err);
                None
            }
        }
    }

    pub fn clear(&self) -> Result<()> {
        self.storage.remove_item(PENDING_DOWNLOAD_KEY)
    }
}
