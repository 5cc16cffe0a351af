//! SQLite-backed memory store
//!
//! One WAL-mode connection behind a `parking_lot` mutex. Every call runs on
//! the blocking pool so async callers never stall the runtime.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};

use super::store::{
    build_conversation, build_entry, bump_term_usage, rank_term_usage, MemoryStore,
};
use crate::error::{FormHelperError, Result};
use crate::types::{
    ConversationRecord, CreateConversationInput, CreateEntryInput, EntryKey, MedicalTermUsage,
    MemoryEntry, MemoryMetadata, MemoryStats, MemoryType,
};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

const ENTRY_COLUMNS: &str = "id, user_id, session_id, memory_type, key, value, importance, tags, \
     expires_at, timestamp, created_at, updated_at";

/// Memory store persisted in a SQLite file
#[derive(Clone)]
pub struct SqliteMemoryStore {
    conn: Arc<Mutex<Connection>>,
    db_path: String,
}

impl SqliteMemoryStore {
    /// Open or create the database at `path` (`~` is expanded)
    pub fn open(path: &str) -> Result<Self> {
        let db_path = shellexpand::tilde(path).into_owned();
        let conn = if db_path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = Path::new(&db_path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX;
            Connection::open_with_flags(&db_path, flags)?
        };

        configure_pragmas(&conn)?;
        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Run `f` with the connection on the blocking pool
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| FormHelperError::Internal(format!("blocking task failed: {}", e)))?
    }
}

fn configure_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        PRAGMA busy_timeout=5000;
        PRAGMA temp_store=MEMORY;
        PRAGMA foreign_keys=ON;
        "#,
    )?;
    Ok(())
}

/// Apply pending schema migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < SCHEMA_VERSION {
        migrate_v2(conn)?;
    }
    Ok(())
}

/// Entries, conversations and term usage (v1)
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS memory_entries (
            id TEXT PRIMARY KEY,
            user_id TEXT,
            session_id TEXT,
            memory_type TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            importance REAL NOT NULL DEFAULT 0.5,
            tags TEXT NOT NULL DEFAULT '[]',
            expires_at TEXT,
            timestamp TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS conversations (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            messages TEXT NOT NULL DEFAULT '[]',
            context TEXT NOT NULL DEFAULT 'null',
            summary TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS medical_term_usage (
            user_id TEXT NOT NULL,
            term TEXT NOT NULL,
            usage_count INTEGER NOT NULL DEFAULT 0,
            last_used TEXT NOT NULL,
            context TEXT NOT NULL DEFAULT '[]',
            PRIMARY KEY (user_id, term)
        );

        INSERT INTO schema_version (version) VALUES (1);
        "#,
    )?;
    Ok(())
}

/// Lookup indexes (v2)
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE INDEX IF NOT EXISTS idx_entries_address
            ON memory_entries(user_id, session_id, memory_type, key);
        CREATE INDEX IF NOT EXISTS idx_entries_user_type
            ON memory_entries(user_id, memory_type);
        CREATE INDEX IF NOT EXISTS idx_conversations_user
            ON conversations(user_id, created_at);

        INSERT INTO schema_version (version) VALUES (2);
        "#,
    )?;
    Ok(())
}

/// Fixed-width UTC timestamps so text ordering matches time ordering
fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| FormHelperError::Internal(format!("invalid timestamp {:?}: {}", raw, e)))
}

/// Raw column values of a `memory_entries` row
struct EntryRow {
    id: String,
    user_id: Option<String>,
    session_id: Option<String>,
    memory_type: String,
    key: String,
    value: String,
    importance: f64,
    tags: String,
    expires_at: Option<String>,
    timestamp: String,
    created_at: String,
    updated_at: String,
}

impl EntryRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            session_id: row.get(2)?,
            memory_type: row.get(3)?,
            key: row.get(4)?,
            value: row.get(5)?,
            importance: row.get(6)?,
            tags: row.get(7)?,
            expires_at: row.get(8)?,
            timestamp: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn into_entry(self) -> Result<MemoryEntry> {
        let memory_type: MemoryType = self
            .memory_type
            .parse()
            .map_err(FormHelperError::Internal)?;
        Ok(MemoryEntry {
            id: self.id,
            user_id: self.user_id,
            session_id: self.session_id,
            memory_type,
            key: self.key,
            value: serde_json::from_str(&self.value)?,
            metadata: MemoryMetadata {
                timestamp: parse_ts(&self.timestamp)?,
                importance: self.importance as f32,
                tags: serde_json::from_str(&self.tags)?,
                expires_at: self.expires_at.as_deref().map(parse_ts).transpose()?,
            },
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

fn select_entry(conn: &Connection, key: &EntryKey) -> Result<Option<MemoryEntry>> {
    let sql = format!(
        "SELECT {} FROM memory_entries
         WHERE user_id IS ?1 AND session_id IS ?2 AND memory_type = ?3 AND key = ?4",
        ENTRY_COLUMNS
    );
    conn.query_row(
        &sql,
        params![key.user_id, key.session_id, key.memory_type.as_str(), key.key],
        EntryRow::from_row,
    )
    .optional()?
    .map(EntryRow::into_entry)
    .transpose()
}

fn write_entry(conn: &Connection, entry: &MemoryEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO memory_entries
            (id, user_id, session_id, memory_type, key, value, importance, tags,
             expires_at, timestamp, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT(id) DO UPDATE SET
            value = excluded.value,
            importance = excluded.importance,
            tags = excluded.tags,
            expires_at = excluded.expires_at,
            timestamp = excluded.timestamp,
            updated_at = excluded.updated_at",
        params![
            entry.id,
            entry.user_id,
            entry.session_id,
            entry.memory_type.as_str(),
            entry.key,
            serde_json::to_string(&entry.value)?,
            f64::from(entry.metadata.importance),
            serde_json::to_string(&entry.metadata.tags)?,
            entry.metadata.expires_at.map(ts),
            ts(entry.metadata.timestamp),
            ts(entry.created_at),
            ts(entry.updated_at),
        ],
    )?;
    Ok(())
}

type ConversationRow = (String, String, String, String, String, Option<String>, String);

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn into_conversation(row: ConversationRow) -> Result<ConversationRecord> {
    let (id, user_id, session_id, messages, context, summary, created_at) = row;
    Ok(ConversationRecord {
        id,
        user_id,
        session_id,
        messages: serde_json::from_str(&messages)?,
        context: serde_json::from_str(&context)?,
        summary,
        created_at: parse_ts(&created_at)?,
    })
}

fn select_term_usage(
    conn: &Connection,
    user_id: &str,
    term: &str,
) -> Result<Option<MedicalTermUsage>> {
    conn.query_row(
        "SELECT term, user_id, usage_count, last_used, context
         FROM medical_term_usage WHERE user_id = ?1 AND term = ?2",
        params![user_id, term],
        term_usage_from_row,
    )
    .optional()?
    .map(into_term_usage)
    .transpose()
}

type TermRow = (String, String, u32, String, String);

fn term_usage_from_row(row: &Row<'_>) -> rusqlite::Result<TermRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn into_term_usage(
    (term, user_id, usage_count, last_used, context): TermRow,
) -> Result<MedicalTermUsage> {
    Ok(MedicalTermUsage {
        term,
        user_id,
        usage_count,
        last_used: parse_ts(&last_used)?,
        context: serde_json::from_str(&context)?,
    })
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    fn backend(&self) -> &'static str {
        "sqlite-wal"
    }

    async fn ping(&self) -> Result<()> {
        self.run(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }

    async fn put_entry(&self, input: CreateEntryInput) -> Result<MemoryEntry> {
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let existing = select_entry(&tx, &input.key)?;
            let entry = build_entry(input, existing.as_ref());
            write_entry(&tx, &entry)?;
            tx.commit()?;
            Ok(entry)
        })
        .await
    }

    async fn get_entry(&self, key: &EntryKey) -> Result<Option<MemoryEntry>> {
        let key = key.clone();
        self.run(move |conn| select_entry(conn, &key)).await
    }

    async fn update_entry(&self, key: &EntryKey, value: serde_json::Value) -> Result<MemoryEntry> {
        let key = key.clone();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let existing = select_entry(&tx, &key)?
                .ok_or_else(|| FormHelperError::NotFound(key.key.clone()))?;
            let entry = build_entry(CreateEntryInput::new(key, value), Some(&existing));
            write_entry(&tx, &entry)?;
            tx.commit()?;
            Ok(entry)
        })
        .await
    }

    async fn delete_entry(&self, key: &EntryKey) -> Result<bool> {
        let key = key.clone();
        self.run(move |conn| {
            let removed = conn.execute(
                "DELETE FROM memory_entries
                 WHERE user_id IS ?1 AND session_id IS ?2 AND memory_type = ?3 AND key = ?4",
                params![key.user_id, key.session_id, key.memory_type.as_str(), key.key],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn list_entries(
        &self,
        user_id: &str,
        memory_type: Option<MemoryType>,
    ) -> Result<Vec<MemoryEntry>> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            let sql = format!(
                "SELECT {} FROM memory_entries
                 WHERE user_id = ?1 AND (?2 IS NULL OR memory_type = ?2)
                 ORDER BY created_at, key",
                ENTRY_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    params![user_id, memory_type.map(|t| t.as_str())],
                    EntryRow::from_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(EntryRow::into_entry).collect()
        })
        .await
    }

    async fn clear_user(&self, user_id: &str) -> Result<u64> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let mut removed = 0;
            removed += tx.execute("DELETE FROM memory_entries WHERE user_id = ?1", [&user_id])?;
            removed += tx.execute("DELETE FROM conversations WHERE user_id = ?1", [&user_id])?;
            removed += tx.execute("DELETE FROM medical_term_usage WHERE user_id = ?1", [&user_id])?;
            tx.commit()?;
            Ok(removed as u64)
        })
        .await
    }

    async fn create_conversation(
        &self,
        input: CreateConversationInput,
    ) -> Result<ConversationRecord> {
        self.run(move |conn| {
            let record = build_conversation(input);
            conn.execute(
                "INSERT INTO conversations (id, user_id, session_id, messages, context, summary, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id,
                    record.user_id,
                    record.session_id,
                    serde_json::to_string(&record.messages)?,
                    serde_json::to_string(&record.context)?,
                    record.summary,
                    ts(record.created_at),
                ],
            )?;
            Ok(record)
        })
        .await
    }

    async fn list_conversations(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationRecord>> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, session_id, messages, context, summary, created_at
                 FROM conversations WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![user_id, limit as i64], conversation_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(into_conversation).collect()
        })
        .await
    }

    async fn upsert_term_usage(
        &self,
        term: &str,
        user_id: &str,
        context: &[String],
    ) -> Result<MedicalTermUsage> {
        let term = term.to_string();
        let user_id = user_id.to_string();
        let context = context.to_vec();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let existing = select_term_usage(&tx, &user_id, &term)?;
            let usage = bump_term_usage(existing, &term, &user_id, &context);
            tx.execute(
                "INSERT INTO medical_term_usage (user_id, term, usage_count, last_used, context)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id, term) DO UPDATE SET
                    usage_count = excluded.usage_count,
                    last_used = excluded.last_used,
                    context = excluded.context",
                params![
                    usage.user_id,
                    usage.term,
                    usage.usage_count,
                    ts(usage.last_used),
                    serde_json::to_string(&usage.context)?,
                ],
            )?;
            tx.commit()?;
            Ok(usage)
        })
        .await
    }

    async fn term_usage(&self, user_id: &str, limit: usize) -> Result<Vec<MedicalTermUsage>> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT term, user_id, usage_count, last_used, context
                 FROM medical_term_usage WHERE user_id = ?1",
            )?;
            let rows = stmt
                .query_map([&user_id], term_usage_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            let mut usages = rows
                .into_iter()
                .map(into_term_usage)
                .collect::<Result<Vec<_>>>()?;
            rank_term_usage(&mut usages);
            usages.truncate(limit);
            Ok(usages)
        })
        .await
    }

    async fn stats(&self, user_id: Option<&str>) -> Result<MemoryStats> {
        let user_id = user_id.map(str::to_string);
        let backend = self.backend().to_string();
        self.run(move |conn| {
            let mut stats = MemoryStats {
                backend,
                ..Default::default()
            };

            let mut stmt = conn.prepare(
                "SELECT memory_type, COUNT(*) FROM memory_entries
                 WHERE ?1 IS NULL OR user_id = ?1 GROUP BY memory_type",
            )?;
            let counts = stmt
                .query_map([&user_id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for (memory_type, count) in counts {
                stats.total_entries += count;
                stats.entries_by_type.insert(memory_type, count);
            }

            stats.conversations = conn.query_row(
                "SELECT COUNT(*) FROM conversations WHERE ?1 IS NULL OR user_id = ?1",
                [&user_id],
                |row| row.get(0),
            )?;

            let (distinct, total): (i64, i64) = conn.query_row(
                "SELECT COUNT(DISTINCT term), COALESCE(SUM(usage_count), 0)
                 FROM medical_term_usage WHERE ?1 IS NULL OR user_id = ?1",
                [&user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            stats.distinct_terms = distinct;
            stats.total_term_usages = total;
            Ok(stats)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConversationMessage, MessageRole};
    use serde_json::json;

    #[tokio::test]
    async fn test_entry_roundtrip_with_null_session() {
        let store = SqliteMemoryStore::open_in_memory().unwrap();
        let key = EntryKey::user("u1", MemoryType::Preference, "response_style");

        let created = store
            .put_entry(CreateEntryInput::new(key.clone(), json!("brief")))
            .await
            .unwrap();
        // Same address updates in place, even with a NULL session id
        let updated = store
            .put_entry(CreateEntryInput::new(key.clone(), json!("detailed")))
            .await
            .unwrap();
        assert_eq!(created.id, updated.id);

        let loaded = store.get_entry(&key).await.unwrap().unwrap();
        assert_eq!(loaded.value, json!("detailed"));
        assert_eq!(loaded.memory_type, MemoryType::Preference);
        assert_eq!(store.list_entries("u1", None).await.unwrap().len(), 1);
        assert_eq!(
            store
                .list_entries("u1", Some(MemoryType::Context))
                .await
                .unwrap()
                .len(),
            0
        );
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = SqliteMemoryStore::open_in_memory().unwrap();
        let key = EntryKey::session("u1", "s1", MemoryType::Context, "snapshot");
        assert!(matches!(
            store.update_entry(&key, json!({})).await,
            Err(FormHelperError::NotFound(_))
        ));
        assert!(!store.delete_entry(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_term_usage_upsert() {
        let store = SqliteMemoryStore::open_in_memory().unwrap();
        for i in 0..4 {
            store
                .upsert_term_usage("IOP", "u1", &vec![format!("ctx{}", i); i])
                .await
                .unwrap();
        }
        let usage = store.term_usage("u1", 3).await.unwrap();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].usage_count, 4);
        // 0 + 1 + 2 + 3 tags
        assert_eq!(usage[0].context.len(), 6);
    }

    #[tokio::test]
    async fn test_file_store_persists_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("memory.db");
        let path = path.to_string_lossy().into_owned();

        {
            let store = SqliteMemoryStore::open(&path).unwrap();
            store
                .create_conversation(CreateConversationInput {
                    user_id: "u1".into(),
                    session_id: "s1".into(),
                    messages: vec![
                        ConversationMessage::new(MessageRole::User, "What is OD?"),
                        ConversationMessage::new(MessageRole::Assistant, "Right Eye"),
                    ],
                    context: json!({"form_type": "cms1500"}),
                    summary: None,
                })
                .await
                .unwrap();
            store.upsert_term_usage("OD", "u1", &[]).await.unwrap();
        }

        let store = SqliteMemoryStore::open(&path).unwrap();
        let conversations = store.list_conversations("u1", 10).await.unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].messages[1].content, "Right Eye");

        let stats = store.stats(None).await.unwrap();
        assert_eq!(stats.conversations, 1);
        assert_eq!(stats.distinct_terms, 1);
        assert_eq!(stats.backend, "sqlite-wal");

        assert_eq!(store.clear_user("u1").await.unwrap(), 2);
        assert_eq!(store.stats(Some("u1")).await.unwrap().total_term_usages, 0);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }
}
