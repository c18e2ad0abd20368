//! Key-value storage scoped to one client session.
//!
//! A session survives separate invocations while it stays active; once it
//! has been idle longer than the configured window, the next open starts a
//! fresh session and drops everything stored by older ones.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use uuid::Uuid;

use crate::db::queries::{SessionQueries, SessionStorageQueries};
use crate::db::Database;
use crate::errors::{GateError, Result};
use crate::models::SessionRecord;

pub trait SessionStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
    fn remove_item(&self, key: &str) -> Result<()>;
}

#[derive(Default)]
pub struct MemorySessionStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn items(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.items
            .lock()
            .map_err(|_| GateError::LockPoisoned("session storage"))
    }
}

impl SessionStorage for MemorySessionStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.items()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.items()?.remove(key);
        Ok(())
    }
}

#[derive(Clone)]
pub struct SqliteSessionStorage {
    db: Database,
    session_id: String,
}

impl SqliteSessionStorage {
    pub fn open(db: Database, idle: Duration) -> Result<Self> {
        let now = chrono::Utc::now().timestamp_millis();
        Self::open_at(db, idle, now)
    }

    fn open_at(db: Database, idle: Duration, now: i64) -> Result<Self> {
        let idle_ms = i64::try_from(idle.as_millis()).unwrap_or(i64::MAX);

        let active = db
            .latest_session()?
            .filter(|session| now.saturating_sub(session.last_seen_at) <= idle_ms);

        let session_id = match active {
            Some(session) => {
                db.touch_session(&session.id, now)?;
                tracing::debug!(session_id = %session.id, "resumed client session");
                session.id
            }
            None => {
                let session = SessionRecord {
                    id: Uuid::new_v4().to_string(),
                    started_at: now,
                    last_seen_at: now,
                };
                db.insert_session(&session)?;
                let purged = db.purge_sessions_except(&session.id)?;
                tracing::info!(
                    session_id = %session.id,
                    purged_items = purged,
                    "started new client session"
                );
                session.id
            }
        };

        Ok(Self { db, session_id })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl SessionStorage for SqliteSessionStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.db.get_session_item(&self.session_id, key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.db.set_session_item(&self.session_id, key, value)
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.db.remove_session_item(&self.session_id, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDLE: Duration = Duration::from_secs(30 * 60);

    fn migrated() -> Database {
        let db = Database::in_memory().expect("open in-memory database");
        db.run_migrations().expect("run migrations");
        db
    }

    #[test]
    fn memory_storage_round_trip() {
        let storage = MemorySessionStorage::new();
        storage.set_item("k", "v").unwrap();
        assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("v"));
        storage.remove_item("k").unwrap();
        storage.remove_item("k").unwrap();
        assert_eq!(storage.get_item("k").unwrap(), None);
    }

    #[test]
    fn active_session_is_resumed_across_opens() {
        let db = migrated();
        let first = SqliteSessionStorage::open_at(db.clone(), IDLE, 1_000).unwrap();
        first.set_item("pendingDownload", "{\"x\":1}").unwrap();

        let second = SqliteSessionStorage::open_at(db, IDLE, 1_000 + 60_000).unwrap();
        assert_eq!(second.session_id(), first.session_id());
        assert_eq!(
            second.get_item("pendingDownload").unwrap().as_deref(),
            Some("{\"x\":1}")
        );
    }

    #[test]
    fn idle_session_expires_and_is_purged() {
        let db = migrated();
        let first = SqliteSessionStorage::open_at(db.clone(), IDLE, 1_000).unwrap();
        first.set_item("pendingDownload", "{}").unwrap();

        let later = 1_000 + IDLE.as_millis() as i64 + 1;
        let second = SqliteSessionStorage::open_at(db.clone(), IDLE, later).unwrap();
        assert_ne!(second.session_id(), first.session_id());
        assert_eq!(second.get_item("pendingDownload").unwrap(), None);
        assert_eq!(first.get_item("pendingDownload").unwrap(), None);
    }
}
