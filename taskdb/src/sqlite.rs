//! Optional SQLite-backed `Store`, behind the `sqlite` feature (the flag
//! already existed in the teacher's Cargo.toml; this file implements it
//! using `rusqlite`'s bundled SQLite, the same crate the teacher's
//! dev-dependencies already pull in).
//!
//! Rows are stored as a JSON blob keyed by the entity's primary key and
//! indexed on `created` for range scans — a pragmatic stand-in for the
//! "document database with row modification timestamps" named in §1, not a
//! fully normalized relational schema.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use sched_lib::error::{SchedError, SchedResult};
use sched_lib::id::Id;
use sched_lib::model::{Job, SkipRule, Task};
use sched_lib::store::{Entity, Store};
use std::sync::Mutex;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &std::path::Path) -> SchedResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| SchedError::Transient(anyhow::anyhow!(e)))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS jobs (id TEXT PRIMARY KEY, created TEXT NOT NULL, repo TEXT NOT NULL, body TEXT NOT NULL);
             CREATE TABLE IF NOT EXISTS tasks (id TEXT PRIMARY KEY, created TEXT NOT NULL, repo TEXT NOT NULL, body TEXT NOT NULL);
             CREATE TABLE IF NOT EXISTS skip_rules (name TEXT PRIMARY KEY, body TEXT NOT NULL);
             CREATE INDEX IF NOT EXISTS jobs_created_idx ON jobs(created);
             CREATE INDEX IF NOT EXISTS tasks_created_idx ON tasks(created);",
        )
        .map_err(|e| SchedError::Transient(anyhow::anyhow!(e)))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> SchedResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SchedError::Transient(anyhow::anyhow!(e)))?;
        conn.execute_batch(
            "CREATE TABLE jobs (id TEXT PRIMARY KEY, created TEXT NOT NULL, repo TEXT NOT NULL, body TEXT NOT NULL);
             CREATE TABLE tasks (id TEXT PRIMARY KEY, created TEXT NOT NULL, repo TEXT NOT NULL, body TEXT NOT NULL);
             CREATE TABLE skip_rules (name TEXT PRIMARY KEY, body TEXT NOT NULL);",
        )
        .map_err(|e| SchedError::Transient(anyhow::anyhow!(e)))?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

fn to_transient(e: rusqlite::Error) -> SchedError {
    SchedError::Transient(anyhow::anyhow!(e))
}

#[async_trait]
impl Store<Job> for SqliteStore {
    async fn get_by_id(&self, id: &Id) -> SchedResult<Option<Job>> {
        let conn = self.conn.lock().unwrap();
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM jobs WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .ok();
        body.map(|b| serde_json::from_str(&b).map_err(|e| SchedError::Internal(e.to_string())))
            .transpose()
    }

    async fn put(&self, mut row: Job) -> SchedResult<Job> {
        let conn = self.conn.lock().unwrap();
        let existing: Option<String> = conn
            .query_row(
                "SELECT body FROM jobs WHERE id = ?1",
                params![row.id.to_string()],
                |r| r.get(0),
            )
            .ok();
        if let Some(body) = &existing {
            let stored: Job =
                serde_json::from_str(body).map_err(|e| SchedError::Internal(e.to_string()))?;
            if stored.db_modified != row.db_modified {
                return Err(SchedError::ConcurrentUpdate(row.id.to_string()));
            }
        }
        row.set_db_modified(Utc::now());
        let body = serde_json::to_string(&row).map_err(|e| SchedError::Internal(e.to_string()))?;
        conn.execute(
            "INSERT INTO jobs (id, created, repo, body) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET body = excluded.body",
            params![row.id.to_string(), row.created.to_rfc3339(), row.repo_state.repo, body],
        )
        .map_err(to_transient)?;
        Ok(row)
    }

    async fn get_from_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        repo: Option<&str>,
    ) -> SchedResult<Vec<Job>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT body FROM jobs WHERE created >= ?1 AND created <= ?2
                 AND (?3 IS NULL OR repo = ?3) ORDER BY created ASC",
            )
            .map_err(to_transient)?;
        let rows = stmt
            .query_map(
                params![start.to_rfc3339(), end.to_rfc3339(), repo],
                |r| r.get::<_, String>(0),
            )
            .map_err(to_transient)?;
        let mut out = Vec::new();
        for row in rows {
            let body = row.map_err(to_transient)?;
            out.push(serde_json::from_str(&body).map_err(|e| SchedError::Internal(e.to_string()))?);
        }
        Ok(out)
    }
}

#[async_trait]
impl Store<Task> for SqliteStore {
    async fn get_by_id(&self, id: &Id) -> SchedResult<Option<Task>> {
        let conn = self.conn.lock().unwrap();
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM tasks WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .ok();
        body.map(|b| serde_json::from_str(&b).map_err(|e| SchedError::Internal(e.to_string())))
            .transpose()
    }

    async fn put(&self, row: Task) -> SchedResult<Task> {
        row.validate_id_skew()?;
        let conn = self.conn.lock().unwrap();
        let mut row = row;
        let existing: Option<String> = conn
            .query_row(
                "SELECT body FROM tasks WHERE id = ?1",
                params![row.id.to_string()],
                |r| r.get(0),
            )
            .ok();
        if let Some(body) = &existing {
            let stored: Task =
                serde_json::from_str(body).map_err(|e| SchedError::Internal(e.to_string()))?;
            if stored.db_modified != row.db_modified {
                return Err(SchedError::ConcurrentUpdate(row.id.to_string()));
            }
        }
        row.set_db_modified(Utc::now());
        let body = serde_json::to_string(&row).map_err(|e| SchedError::Internal(e.to_string()))?;
        conn.execute(
            "INSERT INTO tasks (id, created, repo, body) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET body = excluded.body",
            params![
                row.id.to_string(),
                row.created.to_rfc3339(),
                row.task_key.repo_state.repo,
                body
            ],
        )
        .map_err(to_transient)?;
        Ok(row)
    }

    async fn get_from_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        repo: Option<&str>,
    ) -> SchedResult<Vec<Task>> {
        // §6.1: widen by the Id skew at the SQL layer, then filter on the
        // real `created` column after deserializing.
        let widened_start = start - sched_lib::id::TASK_ID_SKEW;
        let widened_end = end + sched_lib::id::TASK_ID_SKEW;
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT body FROM tasks WHERE created >= ?1 AND created <= ?2
                 AND (?3 IS NULL OR repo = ?3) ORDER BY created ASC",
            )
            .map_err(to_transient)?;
        let rows = stmt
            .query_map(
                params![widened_start.to_rfc3339(), widened_end.to_rfc3339(), repo],
                |r| r.get::<_, String>(0),
            )
            .map_err(to_transient)?;
        let mut out = Vec::new();
        for row in rows {
            let body = row.map_err(to_transient)?;
            let task: Task =
                serde_json::from_str(&body).map_err(|e| SchedError::Internal(e.to_string()))?;
            if task.created >= start && task.created <= end {
                out.push(task);
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl Store<SkipRule> for SqliteStore {
    async fn get_by_id(&self, id: &String) -> SchedResult<Option<SkipRule>> {
        let conn = self.conn.lock().unwrap();
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM skip_rules WHERE name = ?1",
                params![id],
                |row| row.get(0),
            )
            .ok();
        body.map(|b| serde_json::from_str(&b).map_err(|e| SchedError::Internal(e.to_string())))
            .transpose()
    }

    async fn put(&self, mut row: SkipRule) -> SchedResult<SkipRule> {
        let conn = self.conn.lock().unwrap();
        let existing: Option<String> = conn
            .query_row(
                "SELECT body FROM skip_rules WHERE name = ?1",
                params![row.name],
                |r| r.get(0),
            )
            .ok();
        if let Some(body) = &existing {
            let stored: SkipRule =
                serde_json::from_str(body).map_err(|e| SchedError::Internal(e.to_string()))?;
            if stored.db_modified != row.db_modified {
                return Err(SchedError::ConcurrentUpdate(row.name.clone()));
            }
        }
        row.set_db_modified(Utc::now());
        let body = serde_json::to_string(&row).map_err(|e| SchedError::Internal(e.to_string()))?;
        conn.execute(
            "INSERT INTO skip_rules (name, body) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET body = excluded.body",
            params![row.name, body],
        )
        .map_err(to_transient)?;
        Ok(row)
    }

    async fn get_from_date_range(
        &self,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        _repo: Option<&str>,
    ) -> SchedResult<Vec<SkipRule>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT body FROM skip_rules")
            .map_err(to_transient)?;
        let rows = stmt
            .query_map([], |r| r.get::<_, String>(0))
            .map_err(to_transient)?;
        let mut out = Vec::new();
        for row in rows {
            let body = row.map_err(to_transient)?;
            out.push(serde_json::from_str(&body).map_err(|e| SchedError::Internal(e.to_string()))?);
        }
        Ok(out)
    }
}

impl SqliteStore {
    pub async fn delete_skip_rule(&self, name: &str) -> SchedResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM skip_rules WHERE name = ?1", params![name])
            .map_err(to_transient)?;
        Ok(())
    }
}
