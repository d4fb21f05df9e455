use anyhow::{Context, Result, bail};
use chrono::{SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, ToSql, params};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

use crate::bus::{Conversation, NewEntry, Platform, TimelineEntry};

/// Default page size for timeline and conversation queries.
pub const DEFAULT_QUERY_LIMIT: u32 = 50;

/// Cursor-based pagination over timeline ids. `after` is an exclusive lower
/// bound, `before` an exclusive upper bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimelineQuery {
    pub after: Option<i64>,
    pub before: Option<i64>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
pub struct StoreStats {
    pub message_count: i64,
    pub conversation_count: i64,
}

/// Durable, ordered persistence of timeline entries and conversation
/// aggregates. The timeline insert and the conversation upsert commit in a
/// single transaction; `id` assignment is the insertion order.
pub struct Store {
    conn: Mutex<Option<Connection>>,
}

impl Store {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!(
                    "Failed to create database parent directory: {}",
                    parent.display()
                )
            })?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at: {}", db_path.display()))?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=3000;
             PRAGMA foreign_keys=ON;",
        )?;

        let encoding: String = conn.query_row("PRAGMA encoding", [], |row| row.get(0))?;
        if encoding != "UTF-8" {
            bail!(
                "database at {} uses encoding {}, expected UTF-8",
                db_path.display(),
                encoding
            );
        }

        ensure_schema(&conn).with_context(|| {
            format!(
                "Failed to initialize database schema at: {}",
                db_path.display()
            )
        })?;

        debug!("store opened at {}", db_path.display());
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Release the backing connection. Any operation afterwards fails.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.lock()?;
        if let Some(conn) = guard.take() {
            conn.close()
                .map_err(|(_, e)| anyhow::Error::new(e).context("Failed to close database"))?;
        }
        Ok(())
    }

    /// Insert a timeline row and upsert its conversation in one transaction.
    ///
    /// On conversation insert the counters start at 1 and both timestamps are
    /// set to now; on conflict `message_count` increments, `last_message_at`
    /// and `label` are overwritten, and `platform_chat_type` is overwritten
    /// only when the supplied value is non-null.
    pub fn ingest(&self, entry: &NewEntry, label: &str) -> Result<TimelineEntry> {
        let mut guard = self.lock()?;
        let conn = open_conn_mut(&mut guard)?;

        let created_at = now_rfc3339();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO timeline (
                direction, platform, platform_message_id, platform_chat_id,
                platform_chat_type, sender_name, sender_id, text, timestamp,
                platform_meta, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                entry.direction.as_str(),
                entry.platform.as_str(),
                entry.platform_message_id,
                entry.platform_chat_id,
                entry.platform_chat_type,
                entry.sender_name,
                entry.sender_id,
                entry.text,
                entry.timestamp,
                entry.platform_meta,
                created_at,
            ],
        )?;
        let id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO conversations (
                platform, platform_chat_id, platform_chat_type, label,
                first_seen_at, last_message_at, message_count
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?5, 1)
            ON CONFLICT (platform, platform_chat_id) DO UPDATE SET
                message_count = message_count + 1,
                last_message_at = excluded.last_message_at,
                label = excluded.label,
                platform_chat_type =
                    COALESCE(excluded.platform_chat_type, conversations.platform_chat_type)",
            params![
                entry.platform.as_str(),
                entry.platform_chat_id,
                entry.platform_chat_type,
                label,
                created_at,
            ],
        )?;
        tx.commit()?;

        Ok(TimelineEntry {
            id,
            direction: entry.direction,
            platform: entry.platform,
            platform_message_id: entry.platform_message_id.clone(),
            platform_chat_id: entry.platform_chat_id.clone(),
            platform_chat_type: entry.platform_chat_type.clone(),
            sender_name: entry.sender_name.clone(),
            sender_id: entry.sender_id.clone(),
            text: entry.text.clone(),
            timestamp: entry.timestamp,
            platform_meta: entry.platform_meta.clone(),
            created_at,
        })
    }

    /// Timeline of a single conversation, newest first.
    pub fn timeline(
        &self,
        platform: Platform,
        chat_id: &str,
        query: &TimelineQuery,
    ) -> Result<Vec<TimelineEntry>> {
        let mut sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM timeline
             WHERE platform = ?1 AND platform_chat_id = ?2"
        );
        let mut args: Vec<Box<dyn ToSql>> =
            vec![Box::new(platform.as_str()), Box::new(chat_id.to_string())];
        push_cursor_clauses(&mut sql, &mut args, query);
        self.query_entries(&sql, &args)
    }

    /// Timeline across all conversations, newest first.
    pub fn unified_timeline(&self, query: &TimelineQuery) -> Result<Vec<TimelineEntry>> {
        let mut sql = format!("SELECT {ENTRY_COLUMNS} FROM timeline WHERE 1=1");
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();
        push_cursor_clauses(&mut sql, &mut args, query);
        self.query_entries(&sql, &args)
    }

    /// Conversations by recency of their last message.
    pub fn conversations(
        &self,
        platform: Option<Platform>,
        limit: Option<u32>,
    ) -> Result<Vec<Conversation>> {
        let mut sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations");
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(platform) = platform {
            args.push(Box::new(platform.as_str()));
            sql.push_str(&format!(" WHERE platform = ?{}", args.len()));
        }
        sql.push_str(" ORDER BY last_message_at DESC");
        args.push(Box::new(i64::from(limit.unwrap_or(DEFAULT_QUERY_LIMIT))));
        sql.push_str(&format!(" LIMIT ?{}", args.len()));

        let guard = self.lock()?;
        let conn = open_conn(&guard)?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(args.iter().map(AsRef::as_ref)),
            conversation_from_row,
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn conversation(&self, platform: Platform, chat_id: &str) -> Result<Option<Conversation>> {
        let guard = self.lock()?;
        let conn = open_conn(&guard)?;
        let sql = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations
             WHERE platform = ?1 AND platform_chat_id = ?2"
        );
        let row = conn
            .query_row(&sql, params![platform.as_str(), chat_id], conversation_from_row)
            .optional()?;
        Ok(row)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let guard = self.lock()?;
        let conn = open_conn(&guard)?;
        let message_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM timeline", [], |row| row.get(0))?;
        let conversation_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))?;
        Ok(StoreStats {
            message_count,
            conversation_count,
        })
    }

    fn query_entries(&self, sql: &str, args: &[Box<dyn ToSql>]) -> Result<Vec<TimelineEntry>> {
        let guard = self.lock()?;
        let conn = open_conn(&guard)?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(args.iter().map(AsRef::as_ref)),
            entry_from_row,
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<Connection>>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("store lock poisoned: {}", e))
    }
}

const ENTRY_COLUMNS: &str = "id, direction, platform, platform_message_id, platform_chat_id, \
     platform_chat_type, sender_name, sender_id, text, timestamp, platform_meta, created_at";

const CONVERSATION_COLUMNS: &str = "id, platform, platform_chat_id, platform_chat_type, label, \
     first_seen_at, last_message_at, message_count";

fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS timeline (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            direction TEXT NOT NULL,
            platform TEXT NOT NULL,
            platform_message_id TEXT NOT NULL,
            platform_chat_id TEXT NOT NULL,
            platform_chat_type TEXT,
            sender_name TEXT NOT NULL,
            sender_id TEXT NOT NULL,
            text TEXT,
            timestamp INTEGER NOT NULL,
            platform_meta TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS conversations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            platform TEXT NOT NULL,
            platform_chat_id TEXT NOT NULL,
            platform_chat_type TEXT,
            label TEXT NOT NULL,
            first_seen_at TEXT NOT NULL,
            last_message_at TEXT NOT NULL,
            message_count INTEGER NOT NULL DEFAULT 0,
            UNIQUE (platform, platform_chat_id)
        )",
        [],
    )?;

    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_timeline_conversation
             ON timeline(platform, platform_chat_id, id);
         CREATE INDEX IF NOT EXISTS idx_conversations_recency
             ON conversations(last_message_at);",
    )?;

    Ok(())
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn open_conn<'a>(
    guard: &'a std::sync::MutexGuard<'_, Option<Connection>>,
) -> Result<&'a Connection> {
    guard
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("store is closed"))
}

fn open_conn_mut<'a>(
    guard: &'a mut std::sync::MutexGuard<'_, Option<Connection>>,
) -> Result<&'a mut Connection> {
    guard
        .as_mut()
        .ok_or_else(|| anyhow::anyhow!("store is closed"))
}

fn push_cursor_clauses(sql: &mut String, args: &mut Vec<Box<dyn ToSql>>, query: &TimelineQuery) {
    if let Some(after) = query.after {
        args.push(Box::new(after));
        sql.push_str(&format!(" AND id > ?{}", args.len()));
    }
    if let Some(before) = query.before {
        args.push(Box::new(before));
        sql.push_str(&format!(" AND id < ?{}", args.len()));
    }
    sql.push_str(" ORDER BY id DESC");
    args.push(Box::new(i64::from(
        query.limit.unwrap_or(DEFAULT_QUERY_LIMIT),
    )));
    sql.push_str(&format!(" LIMIT ?{}", args.len()));
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TimelineEntry> {
    let direction: String = row.get(1)?;
    let platform: String = row.get(2)?;
    Ok(TimelineEntry {
        id: row.get(0)?,
        direction: direction
            .parse()
            .map_err(|e: String| conversion_error(1, e))?,
        platform: platform
            .parse()
            .map_err(|e: String| conversion_error(2, e))?,
        platform_message_id: row.get(3)?,
        platform_chat_id: row.get(4)?,
        platform_chat_type: row.get(5)?,
        sender_name: row.get(6)?,
        sender_id: row.get(7)?,
        text: row.get(8)?,
        timestamp: row.get(9)?,
        platform_meta: row.get(10)?,
        created_at: row.get(11)?,
    })
}

fn conversation_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    let platform: String = row.get(1)?;
    Ok(Conversation {
        id: row.get(0)?,
        platform: platform
            .parse()
            .map_err(|e: String| conversion_error(1, e))?,
        platform_chat_id: row.get(2)?,
        platform_chat_type: row.get(3)?,
        label: row.get(4)?,
        first_seen_at: row.get(5)?,
        last_message_at: row.get(6)?,
        message_count: row.get(7)?,
    })
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}
