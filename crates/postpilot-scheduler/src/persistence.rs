//! SQLite-backed task store — survives restarts, supports the poll query.
//! Timestamps are stored as fixed-width RFC 3339 UTC strings so the
//! `scheduled_at <= now` comparison and ordering work lexicographically.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use postpilot_core::{EngineError, Result};
use std::path::Path;
use tokio::sync::Mutex;

use crate::store::TaskStore;
use crate::task::{ScheduledTask, TaskStatus};

/// SQLite persistence for scheduled tasks.
pub struct SqliteTaskStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteTaskStore {
    /// Open or create the task database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = rusqlite::Connection::open(path)
            .map_err(|e| EngineError::Store(format!("DB open: {e}")))?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, handy for integration tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| EngineError::Store(format!("DB open: {e}")))?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations to create tables.
    fn migrate(conn: &rusqlite::Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS scheduled_tasks (
                id TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                platform_id TEXT NOT NULL,
                task_type TEXT NOT NULL,
                payload TEXT NOT NULL DEFAULT 'null',   -- JSON
                scheduled_at TEXT NOT NULL,
                execution_window_secs INTEGER NOT NULL DEFAULT 300,
                status TEXT NOT NULL DEFAULT 'pending',
                retry_count INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL DEFAULT 3,
                last_retry_at TEXT,
                executed_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                error_message TEXT,
                result_log TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_status_due
                ON scheduled_tasks (status, scheduled_at);
            CREATE INDEX IF NOT EXISTS idx_tasks_client
                ON scheduled_tasks (client_id, scheduled_at);
         ",
        )
        .map_err(|e| EngineError::Store(format!("Migration: {e}")))?;
        Ok(())
    }

    fn upsert(conn: &rusqlite::Connection, task: &ScheduledTask) -> Result<()> {
        conn.execute(
            "INSERT OR REPLACE INTO scheduled_tasks
             (id, client_id, platform_id, task_type, payload, scheduled_at,
              execution_window_secs, status, retry_count, max_retries,
              last_retry_at, executed_at, created_at, updated_at,
              error_message, result_log)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            rusqlite::params![
                task.id,
                task.client_id,
                task.platform_id,
                task.task_type,
                task.payload.to_string(),
                ts(task.scheduled_at),
                task.execution_window_secs,
                task.status.as_str(),
                task.retry_count,
                task.max_retries,
                task.last_retry_at.map(ts),
                task.executed_at.map(ts),
                ts(task.created_at),
                ts(task.updated_at),
                task.error_message,
                task.result_log,
            ],
        )
        .map_err(|e| EngineError::Store(format!("Save task: {e}")))?;
        Ok(())
    }

    fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduledTask> {
        let payload_str: String = row.get(4)?;
        let status_str: String = row.get(7)?;
        Ok(ScheduledTask {
            id: row.get(0)?,
            client_id: row.get(1)?,
            platform_id: row.get(2)?,
            task_type: row.get(3)?,
            payload: serde_json::from_str(&payload_str).unwrap_or(serde_json::Value::Null),
            scheduled_at: parse_ts(&row.get::<_, String>(5)?),
            execution_window_secs: row.get(6)?,
            status: TaskStatus::parse(&status_str),
            retry_count: row.get(8)?,
            max_retries: row.get(9)?,
            last_retry_at: row.get::<_, Option<String>>(10)?.map(|s| parse_ts(&s)),
            executed_at: row.get::<_, Option<String>>(11)?.map(|s| parse_ts(&s)),
            created_at: parse_ts(&row.get::<_, String>(12)?),
            updated_at: parse_ts(&row.get::<_, String>(13)?),
            error_message: row.get(14)?,
            result_log: row.get(15)?,
        })
    }
}

const COLUMNS: &str = "id, client_id, platform_id, task_type, payload, scheduled_at, \
                       execution_window_secs, status, retry_count, max_retries, \
                       last_retry_at, executed_at, created_at, updated_at, \
                       error_message, result_log";

/// Fixed-width RFC 3339 (microseconds, Z-suffixed) — sorts as a string.
fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn insert(&self, task: &ScheduledTask) -> Result<()> {
        let conn = self.conn.lock().await;
        Self::upsert(&conn, task)
    }

    async fn get(&self, id: &str) -> Result<Option<ScheduledTask>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM scheduled_tasks WHERE id = ?1"
            ))
            .map_err(|e| EngineError::Store(format!("Get task: {e}")))?;
        let mut rows = stmt
            .query_map([id], Self::row_to_task)
            .map_err(|e| EngineError::Store(format!("Get task: {e}")))?;
        match rows.next() {
            Some(Ok(task)) => Ok(Some(task)),
            Some(Err(e)) => Err(EngineError::Store(format!("Get task: {e}"))),
            None => Ok(None),
        }
    }

    async fn update(&self, task: &ScheduledTask) -> Result<()> {
        let conn = self.conn.lock().await;
        Self::upsert(&conn, task)
    }

    async fn due_pending(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<ScheduledTask>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM scheduled_tasks
                 WHERE status = 'pending' AND scheduled_at <= ?1
                 ORDER BY scheduled_at ASC LIMIT ?2"
            ))
            .map_err(|e| EngineError::Store(format!("Poll query: {e}")))?;
        let rows = stmt
            .query_map(rusqlite::params![ts(now), limit as i64], Self::row_to_task)
            .map_err(|e| EngineError::Store(format!("Poll query: {e}")))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| EngineError::Store(format!("Poll query: {e}")))
    }

    async fn for_client(
        &self,
        client_id: &str,
        status: Option<TaskStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ScheduledTask>> {
        let conn = self.conn.lock().await;
        let result = match status {
            Some(status) => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {COLUMNS} FROM scheduled_tasks
                         WHERE client_id = ?1 AND status = ?2
                         ORDER BY scheduled_at DESC LIMIT ?3 OFFSET ?4"
                    ))
                    .map_err(|e| EngineError::Store(format!("List tasks: {e}")))?;
                let rows = stmt
                    .query_map(
                        rusqlite::params![client_id, status.as_str(), limit as i64, offset as i64],
                        Self::row_to_task,
                    )
                    .map_err(|e| EngineError::Store(format!("List tasks: {e}")))?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            }
            None => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {COLUMNS} FROM scheduled_tasks
                         WHERE client_id = ?1
                         ORDER BY scheduled_at DESC LIMIT ?2 OFFSET ?3"
                    ))
                    .map_err(|e| EngineError::Store(format!("List tasks: {e}")))?;
                let rows = stmt
                    .query_map(
                        rusqlite::params![client_id, limit as i64, offset as i64],
                        Self::row_to_task,
                    )
                    .map_err(|e| EngineError::Store(format!("List tasks: {e}")))?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            }
        };
        result.map_err(|e| EngineError::Store(format!("List tasks: {e}")))
    }

    async fn in_progress(&self) -> Result<Vec<ScheduledTask>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM scheduled_tasks WHERE status = 'in_progress'"
            ))
            .map_err(|e| EngineError::Store(format!("Recovery query: {e}")))?;
        let rows = stmt
            .query_map([], Self::row_to_task)
            .map_err(|e| EngineError::Store(format!("Recovery query: {e}")))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| EngineError::Store(format!("Recovery query: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use postpilot_core::SchedulerConfig;

    use crate::task::NewTask;

    fn task_at(scheduled_at: DateTime<Utc>) -> ScheduledTask {
        ScheduledTask::from_spec(
            NewTask {
                client_id: "c1".into(),
                platform_id: "p1".into(),
                task_type: "post".into(),
                payload: serde_json::json!({"caption": "hi"}),
                scheduled_at,
                execution_window_secs: None,
                max_retries: None,
            },
            &SchedulerConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let store = SqliteTaskStore::open_in_memory().unwrap();
        let task = task_at(Utc::now() + Duration::minutes(5));
        store.insert(&task).await.unwrap();

        let loaded = store.get(&task.id).await.unwrap().unwrap();
        assert_eq!(loaded.client_id, "c1");
        assert_eq!(loaded.status, TaskStatus::Pending);
        assert_eq!(loaded.payload["caption"], "hi");
        assert_eq!(loaded.scheduled_at.timestamp_micros(), task.scheduled_at.timestamp_micros());
    }

    #[tokio::test]
    async fn test_due_pending_order_and_cutoff() {
        let store = SqliteTaskStore::open_in_memory().unwrap();
        let now = Utc::now();
        let early = task_at(now - Duration::minutes(2));
        let late = task_at(now - Duration::seconds(5));
        let future = task_at(now + Duration::minutes(2));
        for t in [&late, &early, &future] {
            store.insert(t).await.unwrap();
        }

        let due = store.due_pending(now, 10).await.unwrap();
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].id, early.id);
        assert_eq!(due[1].id, late.id);
    }

    #[tokio::test]
    async fn test_update_overwrites_status() {
        let store = SqliteTaskStore::open_in_memory().unwrap();
        let mut task = task_at(Utc::now());
        store.insert(&task).await.unwrap();

        task.status = TaskStatus::Failed;
        task.error_message = Some("boom".into());
        task.retry_count = 3;
        store.update(&task).await.unwrap();

        let loaded = store.get(&task.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, TaskStatus::Failed);
        assert_eq!(loaded.error_message.as_deref(), Some("boom"));
        assert_eq!(loaded.retry_count, 3);
    }

    #[tokio::test]
    async fn test_for_client_status_filter() {
        let store = SqliteTaskStore::open_in_memory().unwrap();
        let now = Utc::now();
        let mut failed = task_at(now - Duration::minutes(1));
        failed.status = TaskStatus::Failed;
        store.insert(&failed).await.unwrap();
        store.insert(&task_at(now)).await.unwrap();

        let only_failed = store
            .for_client("c1", Some(TaskStatus::Failed), 50, 0)
            .await
            .unwrap();
        assert_eq!(only_failed.len(), 1);
        assert_eq!(only_failed[0].id, failed.id);

        let all = store.for_client("c1", None, 50, 0).await.unwrap();
        assert_eq!(all.len(), 2);
        // Newest scheduled first
        assert!(all[0].scheduled_at > all[1].scheduled_at);
    }

    #[tokio::test]
    async fn test_in_progress_listing() {
        let store = SqliteTaskStore::open_in_memory().unwrap();
        let mut task = task_at(Utc::now());
        task.status = TaskStatus::InProgress;
        store.insert(&task).await.unwrap();
        store.insert(&task_at(Utc::now())).await.unwrap();

        let stuck = store.in_progress().await.unwrap();
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].id, task.id);
    }
}
