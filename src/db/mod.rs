pub mod models;

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use models::{Conversation, Message, Role};

/// Versioned schema, applied idempotently via `PRAGMA user_version`.
/// Append-only: never edit an entry that has shipped, add a new one.
const MIGRATIONS: &[&str] = &[
    // v1: conversations and messages
    "
    CREATE TABLE conversations (
        id TEXT PRIMARY KEY,
        user TEXT NOT NULL,
        title TEXT NOT NULL,
        pinned INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );

    CREATE TABLE messages (
        id TEXT PRIMARY KEY,
        conversation_id TEXT NOT NULL,
        seq INTEGER NOT NULL,
        role TEXT NOT NULL CHECK (role IN ('user', 'assistant', 'system')),
        content TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (conversation_id, seq),
        FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
    );
    ",
    // v2: key/value settings (theme, default model)
    "
    CREATE TABLE settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    ",
];

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Durable conversation store. One conversation belongs to one user label;
/// there is no cross-user access path. Every mutating call commits before
/// returning.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = db_path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).ok();
            }
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory store, used by tests and the one-shot CLI dry runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        for (i, sql) in MIGRATIONS.iter().enumerate().skip(version as usize) {
            let tx = conn.transaction()?;
            tx.execute_batch(sql)?;
            tx.pragma_update(None, "user_version", (i + 1) as i64)?;
            tx.commit()?;
            tracing::debug!(version = i + 1, "applied schema migration");
        }
        Ok(())
    }

    // ── Conversations ──

    pub fn create_conversation(&self, user: &str) -> Result<Conversation, StoreError> {
        let conn = self.conn.lock().unwrap();
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO conversations (id, user, title, pinned, created_at) VALUES (?1, ?2, ?3, 0, ?4)",
            params![id, user, "New Chat", created_at],
        )?;
        Ok(Conversation {
            id,
            user: user.to_string(),
            title: "New Chat".to_string(),
            pinned: false,
            created_at,
        })
    }

    pub fn get_conversation(&self, id: &str) -> Result<Conversation, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, user, title, pinned, created_at FROM conversations WHERE id = ?1",
            params![id],
            row_to_conversation,
        )
        .optional()?
        .ok_or(StoreError::NotFound("conversation"))
    }

    /// Pinned first, then newest first. `title_filter` is a case-insensitive
    /// substring match on the title.
    pub fn list_conversations(
        &self,
        user: &str,
        title_filter: Option<&str>,
    ) -> Result<Vec<Conversation>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, user, title, pinned, created_at FROM conversations
             WHERE user = ?1 AND (?2 IS NULL OR instr(lower(title), lower(?2)) > 0)
             ORDER BY pinned DESC, created_at DESC, id",
        )?;
        let rows = stmt.query_map(params![user, title_filter], row_to_conversation)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn rename(&self, id: &str, title: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE conversations SET title = ?1 WHERE id = ?2",
            params![title, id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound("conversation"));
        }
        Ok(())
    }

    pub fn set_pinned(&self, id: &str, pinned: bool) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE conversations SET pinned = ?1 WHERE id = ?2",
            params![pinned as i64, id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound("conversation"));
        }
        Ok(())
    }

    /// Removes the conversation and, through the foreign key, all of its
    /// messages.
    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StoreError::NotFound("conversation"));
        }
        Ok(())
    }

    // ── Messages ──

    /// Appends with the next per-conversation sequence number. The existence
    /// check, sequence assignment, and insert commit as one transaction, so
    /// an append is never partially visible.
    pub fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> Result<Message, StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM conversations WHERE id = ?1)",
            params![conversation_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StoreError::NotFound("conversation"));
        }

        let seq: i64 = tx.query_row(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
            |row| row.get(0),
        )?;
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO messages (id, conversation_id, seq, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, conversation_id, seq, role, content, created_at],
        )?;
        tx.commit()?;

        Ok(Message {
            id,
            conversation_id: conversation_id.to_string(),
            seq,
            role,
            content: content.to_string(),
            created_at,
        })
    }

    /// Oldest-to-newest. With `limit`, the most recent `limit` messages,
    /// still oldest-to-newest within that window.
    pub fn list_messages(
        &self,
        conversation_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM conversations WHERE id = ?1)",
            params![conversation_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StoreError::NotFound("conversation"));
        }

        // LIMIT -1 means no limit in SQLite.
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, seq, role, content, created_at FROM (
                 SELECT * FROM messages WHERE conversation_id = ?1 ORDER BY seq DESC LIMIT ?2
             ) ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![conversation_id, limit], row_to_message)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get_message(&self, id: &str) -> Result<Message, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, conversation_id, seq, role, content, created_at FROM messages WHERE id = ?1",
            params![id],
            row_to_message,
        )
        .optional()?
        .ok_or(StoreError::NotFound("message"))
    }

    // ── Settings ──

    pub fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        user: row.get(1)?,
        title: row.get(2)?,
        pinned: row.get::<_, i64>(3)? != 0,
        created_at: row.get(4)?,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        seq: row.get(2)?,
        role: row.get(3)?,
        content: row.get(4)?,
        created_at: row.get(5)?,
    })
}
