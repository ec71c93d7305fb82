//! SQLite-based storage.
//!
//! Provides persistent storage for:
//! - Time logs (focused time, interruptions, breaks) written by the session
//!   effect callbacks
//! - Task status updates
//! - Key-value store for application state (clock state, recovery snapshot)

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::data_dir;
use crate::error::{CoreError, DatabaseError};
use crate::events::TaskStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeLogKind {
    Focus,
    Interruption,
    Break,
}

impl TimeLogKind {
    fn as_str(self) -> &'static str {
        match self {
            TimeLogKind::Focus => "focus",
            TimeLogKind::Interruption => "interruption",
            TimeLogKind::Break => "break",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "focus" => Some(TimeLogKind::Focus),
            "interruption" => Some(TimeLogKind::Interruption),
            "break" => Some(TimeLogKind::Break),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeLog {
    pub id: i64,
    pub kind: TimeLogKind,
    pub task_id: Option<String>,
    pub seconds: u64,
    pub logged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Stats {
    pub focus_sessions: u64,
    pub focus_secs: u64,
    pub interruptions: u64,
    pub interruption_secs: u64,
    pub breaks: u64,
    pub break_secs: u64,
    pub completed_tasks: u64,
}

/// SQLite database for time logs and application state.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at `~/.config/focusroom/focusroom.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        Self::open_at(&data_dir()?.join("focusroom.db"))
    }

    pub fn open_at(path: &Path) -> Result<Self, CoreError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS kv (
                    key   TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS time_logs (
                    id        INTEGER PRIMARY KEY AUTOINCREMENT,
                    kind      TEXT NOT NULL,
                    task_id   TEXT,
                    seconds   INTEGER NOT NULL,
                    logged_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS task_status (
                    task_id    TEXT PRIMARY KEY,
                    status     TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_time_logs_logged_at ON time_logs(logged_at);
                CREATE INDEX IF NOT EXISTS idx_time_logs_kind ON time_logs(kind);",
            )
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))
    }

    /// Append a time log entry.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub fn record_time_log(
        &self,
        kind: TimeLogKind,
        task_id: Option<&str>,
        seconds: u64,
        logged_at: DateTime<Utc>,
    ) -> Result<i64, CoreError> {
        self.conn.execute(
            "INSERT INTO time_logs (kind, task_id, seconds, logged_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![kind.as_str(), task_id, seconds, logged_at.to_rfc3339()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn set_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO task_status (task_id, status, updated_at)
             VALUES (?1, ?2, ?3)",
            params![task_id, status.as_str(), updated_at.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn task_status(&self, task_id: &str) -> Result<Option<TaskStatus>, CoreError> {
        let status = self.query_optional(
            "SELECT status FROM task_status WHERE task_id = ?1",
            task_id,
        )?;
        Ok(status.and_then(|s| match s.as_str() {
            "completed" => Some(TaskStatus::Completed),
            "todo" => Some(TaskStatus::Todo),
            _ => None,
        }))
    }

    /// Most recent time logs, newest first.
    pub fn recent_logs(&self, limit: usize) -> Result<Vec<TimeLog>, CoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, kind, task_id, seconds, logged_at
             FROM time_logs
             ORDER BY id DESC
             LIMIT ?1",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, u64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut logs = Vec::new();
        for row in rows {
            let (id, kind, task_id, seconds, logged_at) = row?;
            let Some(kind) = TimeLogKind::parse(&kind) else {
                tracing::warn!(id, kind = %kind, "skipping time log with unknown kind");
                continue;
            };
            let logged_at = DateTime::parse_from_rfc3339(&logged_at)
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?
                .with_timezone(&Utc);
            logs.push(TimeLog {
                id,
                kind,
                task_id,
                seconds,
                logged_at,
            });
        }
        Ok(logs)
    }

    /// Totals for entries logged since midnight UTC.
    pub fn stats_today(&self) -> Result<Stats, CoreError> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        self.stats_since(&format!("{today}T00:00:00+00:00"))
    }

    pub fn stats_all(&self) -> Result<Stats, CoreError> {
        self.stats_since("")
    }

    fn stats_since(&self, since: &str) -> Result<Stats, CoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT kind, COUNT(*), COALESCE(SUM(seconds), 0)
             FROM time_logs
             WHERE logged_at >= ?1
             GROUP BY kind",
        )?;
        let rows = stmt.query_map(params![since], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u64>(1)?,
                row.get::<_, u64>(2)?,
            ))
        })?;

        let mut stats = Stats::default();
        for row in rows {
            let (kind, count, seconds) = row?;
            match TimeLogKind::parse(&kind) {
                Some(TimeLogKind::Focus) => {
                    stats.focus_sessions += count;
                    stats.focus_secs += seconds;
                }
                Some(TimeLogKind::Interruption) => {
                    stats.interruptions += count;
                    stats.interruption_secs += seconds;
                }
                Some(TimeLogKind::Break) => {
                    stats.breaks += count;
                    stats.break_secs += seconds;
                }
                None => {}
            }
        }

        stats.completed_tasks = self.conn.query_row(
            "SELECT COUNT(*) FROM task_status WHERE status = 'completed' AND updated_at >= ?1",
            params![since],
            |row| row.get::<_, u64>(0),
        )?;
        Ok(stats)
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, CoreError> {
        self.query_optional("SELECT value FROM kv WHERE key = ?1", key)
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), CoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Remove a value from the kv store. Missing keys are not an error.
    pub fn kv_delete(&self, key: &str) -> Result<(), CoreError> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// Replace the value under `key` only if it still equals `current`
    /// (`None`: the key is absent). `new = None` deletes. Returns whether
    /// the swap happened; each case is a single statement, so concurrent
    /// processes cannot interleave inside it.
    pub fn kv_compare_and_swap(
        &self,
        key: &str,
        current: Option<&str>,
        new: Option<&str>,
    ) -> Result<bool, CoreError> {
        let changed = match (current, new) {
            (None, Some(new)) => self.conn.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO NOTHING",
                params![key, new],
            )?,
            (Some(current), Some(new)) => self.conn.execute(
                "UPDATE kv SET value = ?3 WHERE key = ?1 AND value = ?2",
                params![key, current, new],
            )?,
            (Some(current), None) => self.conn.execute(
                "DELETE FROM kv WHERE key = ?1 AND value = ?2",
                params![key, current],
            )?,
            (None, None) => return Ok(self.kv_get(key)?.is_none()),
        };
        Ok(changed == 1)
    }

    fn query_optional(&self, sql: &str, key: &str) -> Result<Option<String>, CoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        match stmt.query_row(params![key], |row| row.get::<_, String>(0)) {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kv_store() {
        let db = Database::open_memory().unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
        db.kv_set("test", "hello").unwrap();
        assert_eq!(db.kv_get("test").unwrap().unwrap(), "hello");
        db.kv_set("test", "again").unwrap();
        assert_eq!(db.kv_get("test").unwrap().unwrap(), "again");
        db.kv_delete("test").unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
        db.kv_delete("test").unwrap();
    }

    #[test]
    fn kv_compare_and_swap_checks_current_value() {
        let db = Database::open_memory().unwrap();
        assert!(db.kv_compare_and_swap("lease", None, Some("a")).unwrap());
        assert!(!db.kv_compare_and_swap("lease", None, Some("b")).unwrap());
        assert_eq!(db.kv_get("lease").unwrap().as_deref(), Some("a"));

        assert!(!db.kv_compare_and_swap("lease", Some("x"), Some("b")).unwrap());
        assert!(db.kv_compare_and_swap("lease", Some("a"), Some("b")).unwrap());
        assert_eq!(db.kv_get("lease").unwrap().as_deref(), Some("b"));

        assert!(!db.kv_compare_and_swap("lease", Some("a"), None).unwrap());
        assert!(db.kv_compare_and_swap("lease", Some("b"), None).unwrap());
        assert!(db.kv_get("lease").unwrap().is_none());
        assert!(db.kv_compare_and_swap("lease", None, None).unwrap());
    }

    #[test]
    fn record_and_summarize() {
        let db = Database::open_memory().unwrap();
        let now = Utc::now();
        db.record_time_log(TimeLogKind::Focus, Some("t1"), 1500, now)
            .unwrap();
        db.record_time_log(TimeLogKind::Focus, Some("t1"), 300, now)
            .unwrap();
        db.record_time_log(TimeLogKind::Interruption, Some("t1"), 200, now)
            .unwrap();
        db.record_time_log(TimeLogKind::Break, None, 320, now).unwrap();
        db.set_task_status("t1", TaskStatus::Completed, now).unwrap();

        let stats = db.stats_all().unwrap();
        assert_eq!(
            stats,
            Stats {
                focus_sessions: 2,
                focus_secs: 1800,
                interruptions: 1,
                interruption_secs: 200,
                breaks: 1,
                break_secs: 320,
                completed_tasks: 1,
            }
        );
        assert_eq!(db.stats_today().unwrap(), stats);
    }

    #[test]
    fn old_entries_are_not_today() {
        let db = Database::open_memory().unwrap();
        let long_ago = Utc::now() - chrono::Duration::days(3);
        db.record_time_log(TimeLogKind::Focus, Some("t1"), 60, long_ago)
            .unwrap();
        assert_eq!(db.stats_today().unwrap().focus_secs, 0);
        assert_eq!(db.stats_all().unwrap().focus_secs, 60);
    }

    #[test]
    fn recent_logs_newest_first() {
        let db = Database::open_memory().unwrap();
        let now = Utc::now();
        db.record_time_log(TimeLogKind::Focus, Some("a"), 10, now)
            .unwrap();
        db.record_time_log(TimeLogKind::Break, None, 20, now).unwrap();
        let logs = db.recent_logs(1).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].kind, TimeLogKind::Break);
        assert_eq!(logs[0].task_id, None);
        assert_eq!(logs[0].seconds, 20);
    }

    #[test]
    fn task_status_overwrites() {
        let db = Database::open_memory().unwrap();
        let now = Utc::now();
        assert_eq!(db.task_status("t").unwrap(), None);
        db.set_task_status("t", TaskStatus::Todo, now).unwrap();
        db.set_task_status("t", TaskStatus::Completed, now).unwrap();
        assert_eq!(db.task_status("t").unwrap(), Some(TaskStatus::Completed));
    }
}
