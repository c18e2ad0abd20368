use rusqlite::{params, OptionalExtension};

use crate::db::Database;
use crate::errors::Result;
use crate::models::SessionRecord;

pub trait SessionQueries {
    fn latest_session(&self) -> Result<Option<SessionRecord>>;
    fn insert_session(&self, session: &SessionRecord) -> Result<()>;
    fn touch_session(&self, session_id: &str, now: i64) -> Result<()>;
    fn purge_sessions_except(&self, session_id: &str) -> Result<usize>;
}

pub trait SessionStorageQueries {
    fn set_session_item(&self, session_id: &str, key: &str, value: &str) -> Result<()>;
    fn get_session_item(&self, session_id: &str, key: &str) -> Result<Option<String>>;
    fn remove_session_item(&self, session_id: &str, key: &str) -> Result<()>;
}

impl SessionQueries for Database {
    fn latest_session(&self) -> Result<Option<SessionRecord>> {
        let conn = self.connection()?;
        let session = conn
            .query_row(
                "SELECT id, started_at, last_seen_at FROM sessions
                 ORDER BY last_seen_at DESC LIMIT 1",
                [],
                |row| {
                    Ok(SessionRecord {
                        id: row.get(0)?,
                        started_at: row.get(1)?,
                        last_seen_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(session)
    }

    fn insert_session(&self, session: &SessionRecord) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT OR REPLACE INTO sessions (id, started_at, last_seen_at) VALUES (?1, ?2, ?3)",
            params![session.id, session.started_at, session.last_seen_at],
        )?;
        Ok(())
    }

    fn touch_session(&self, session_id: &str, now: i64) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "UPDATE sessions SET last_seen_at = ?1 WHERE id = ?2",
            params![now, session_id],
        )?;
        Ok(())
    }

    fn purge_sessions_except(&self, session_id: &str) -> Result<usize> {
        let conn = self.connection()?;
        let removed = conn.execute(
            "DELETE FROM session_storage WHERE session_id <> ?1",
            params![session_id],
        )?;
        conn.execute("DELETE FROM sessions WHERE id <> ?1", params![session_id])?;
        Ok(removed)
    }
}

impl SessionStorageQueries for Database {
    fn set_session_item(&self, session_id: &str, key: &str, value: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT OR REPLACE INTO session_storage (session_id, key, value, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![session_id, key, value, chrono::Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }

    fn get_session_item(&self, session_id: &str, key: &str) -> Result<Option<String>> {
        let conn = self.connection()?;
        let value = conn
            .query_row(
                "SELECT value FROM session_storage WHERE session_id = ?1 AND key = ?2",
                params![session_id, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn remove_session_item(&self, session_id: &str, key: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "DELETE FROM session_storage WHERE session_id = ?1 AND key = ?2",
            params![session_id, key],
        )?;
        Ok(())
    }
}
