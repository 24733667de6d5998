//! Conversation log

use rusqlite::params;

use super::{now, Database, MAX_LIST_LIMIT};
use crate::error::Result;
use crate::models::{ChatDirection, ChatRecord};

/// Default number of records returned by `chat_history`
pub const DEFAULT_HISTORY_LIMIT: i64 = 5;

impl Database {
    /// Append a chat record, returning its id
    pub fn add_chat(&self, username: &str, content: &str, direction: ChatDirection) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO chats (username, content, direction, date) VALUES (?, ?, ?, ?)",
            params![username, content, direction.as_flag(), now()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent records first
    pub fn chat_history(&self, username: &str, limit: i64) -> Result<Vec<ChatRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, username, content, direction, date
            FROM chats
            WHERE username = ?
            ORDER BY date DESC, id DESC
            LIMIT ?
            "#,
        )?;

        let records = stmt
            .query_map(params![username, limit.clamp(1, MAX_LIST_LIMIT)], |row| {
                Ok(ChatRecord {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    content: row.get(2)?,
                    direction: ChatDirection::from_flag(row.get(3)?),
                    date: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }
}
