// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Embedded SQL store backing the outboxes and ACP session records.
//!
//! One connection, WAL journal, writes serialized behind a mutex. The store
//! is the sole mechanism for at-least-once delivery to the Control Plane:
//! rows survive a process crash and are deleted only after a successful
//! batch post.

use std::fmt;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::Connection;

/// Schema version expected by this build.
const SCHEMA_VERSION: i64 = 1;

/// The three durable outbox channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outbox {
    Messages,
    BootLog,
    Errors,
}

impl Outbox {
    fn table(self) -> &'static str {
        match self {
            Self::Messages => "message_outbox",
            Self::BootLog => "boot_log_outbox",
            Self::Errors => "error_outbox",
        }
    }

    /// Control-plane channel path segment for this outbox.
    pub fn channel(self) -> &'static str {
        match self {
            Self::Messages => "messages",
            Self::BootLog => "boot-log",
            Self::Errors => "errors",
        }
    }
}

/// One pending outbox row.
#[derive(Debug, Clone)]
pub struct OutboxRow {
    pub id: i64,
    pub message_id: String,
    pub payload: String,
    pub created_at: String,
    pub attempts: i64,
}

/// A registered ACP session surviving process restarts.
#[derive(Debug, Clone)]
pub struct AcpSessionRecord {
    pub session_id: String,
    pub workspace_id: String,
    pub agent_kind: String,
    pub persistent: bool,
}

/// Migration failure. Surfaced as its own type so the entry point can map
/// it to the reserved exit code.
#[derive(Debug)]
pub struct MigrationError(pub String);

impl fmt::Display for MigrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store migration failed: {}", self.0)
    }
}

impl std::error::Error for MigrationError {}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database file and run migrations.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> anyhow::Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        migrate(&conn).map_err(|e| anyhow::Error::new(MigrationError(e.to_string())))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Insert one row, idempotently on `message_id`.
    ///
    /// Returns `true` when the row was inserted, `false` when an identical
    /// `message_id` already exists. Fails when the outbox is at capacity.
    pub fn enqueue(
        &self,
        outbox: Outbox,
        message_id: &str,
        payload: &str,
        max_size: usize,
    ) -> anyhow::Result<bool> {
        let conn = self.conn.lock();
        let len: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", outbox.table()),
            [],
            |row| row.get(0),
        )?;
        if len as usize >= max_size {
            anyhow::bail!("outbox {} is full ({len} rows)", outbox.channel());
        }
        let inserted = conn.execute(
            &format!(
                "INSERT OR IGNORE INTO {} (message_id, payload, created_at) \
                 VALUES (?1, ?2, ?3)",
                outbox.table()
            ),
            rusqlite::params![message_id, payload, now_rfc3339()],
        )?;
        Ok(inserted > 0)
    }

    /// Oldest rows bounded by count and cumulative payload size.
    ///
    /// At least one row is always included so an oversized payload cannot
    /// wedge the queue.
    pub fn next_batch(
        &self,
        outbox: Outbox,
        max_rows: usize,
        max_bytes: usize,
    ) -> anyhow::Result<Vec<OutboxRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT id, message_id, payload, created_at, attempts \
             FROM {} ORDER BY id ASC LIMIT ?1",
            outbox.table()
        ))?;
        let rows = stmt.query_map([max_rows as i64], |row| {
            Ok(OutboxRow {
                id: row.get(0)?,
                message_id: row.get(1)?,
                payload: row.get(2)?,
                created_at: row.get(3)?,
                attempts: row.get(4)?,
            })
        })?;

        let mut batch = Vec::new();
        let mut bytes = 0usize;
        for row in rows {
            let row = row?;
            let size = row.payload.len() + row.message_id.len();
            if !batch.is_empty() && bytes + size > max_bytes {
                break;
            }
            bytes += size;
            batch.push(row);
        }
        Ok(batch)
    }

    /// Delete a delivered batch in one transaction.
    pub fn delete_batch(&self, outbox: Outbox, ids: &[i64]) -> anyhow::Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for id in ids {
            tx.execute(&format!("DELETE FROM {} WHERE id = ?1", outbox.table()), [id])?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Record a failed delivery attempt on each row.
    pub fn bump_attempts(&self, outbox: Outbox, ids: &[i64]) -> anyhow::Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let at = now_rfc3339();
        for id in ids {
            tx.execute(
                &format!(
                    "UPDATE {} SET attempts = attempts + 1, last_attempt_at = ?1 WHERE id = ?2",
                    outbox.table()
                ),
                rusqlite::params![at, id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn outbox_len(&self, outbox: Outbox) -> anyhow::Result<usize> {
        let conn = self.conn.lock();
        let len: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", outbox.table()),
            [],
            |row| row.get(0),
        )?;
        Ok(len as usize)
    }

    pub fn attempts(&self, outbox: Outbox, message_id: &str) -> anyhow::Result<i64> {
        let conn = self.conn.lock();
        let attempts: i64 = conn.query_row(
            &format!("SELECT attempts FROM {} WHERE message_id = ?1", outbox.table()),
            [message_id],
            |row| row.get(0),
        )?;
        Ok(attempts)
    }

    // -- ACP session records --------------------------------------------------

    pub fn upsert_acp_session(&self, record: &AcpSessionRecord) -> anyhow::Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO acp_sessions (session_id, workspace_id, agent_kind, persistent, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(session_id) DO UPDATE SET \
               workspace_id = excluded.workspace_id, \
               agent_kind = excluded.agent_kind, \
               persistent = excluded.persistent",
            rusqlite::params![
                record.session_id,
                record.workspace_id,
                record.agent_kind,
                record.persistent,
                now_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn delete_acp_session(&self, session_id: &str) -> anyhow::Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM acp_sessions WHERE session_id = ?1", [session_id])?;
        Ok(())
    }

    /// Sessions to resurrect after a process restart.
    pub fn persistent_acp_sessions(&self) -> anyhow::Result<Vec<AcpSessionRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT session_id, workspace_id, agent_kind, persistent \
             FROM acp_sessions WHERE persistent = 1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(AcpSessionRecord {
                session_id: row.get(0)?,
                workspace_id: row.get(1)?,
                agent_kind: row.get(2)?,
                persistent: row.get(3)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn migrate(conn: &Connection) -> anyhow::Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version > SCHEMA_VERSION {
        anyhow::bail!("database schema {version} is newer than supported {SCHEMA_VERSION}");
    }
    if version == SCHEMA_VERSION {
        return Ok(());
    }

    for table in ["message_outbox", "boot_log_outbox", "error_outbox"] {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 message_id TEXT NOT NULL UNIQUE,
                 payload TEXT NOT NULL,
                 created_at TEXT NOT NULL,
                 attempts INTEGER NOT NULL DEFAULT 0,
                 last_attempt_at TEXT
             );"
        ))?;
    }
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS acp_sessions (
             session_id TEXT PRIMARY KEY,
             workspace_id TEXT NOT NULL,
             agent_kind TEXT NOT NULL,
             persistent INTEGER NOT NULL DEFAULT 0,
             created_at TEXT NOT NULL
         );",
    )?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
