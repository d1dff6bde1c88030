//! Task-store contract — the persistence seam the engine polls against.
//! The engine treats storage as an opaque transactional task queue; the
//! SQLite implementation lives in `persistence`, and `MemoryTaskStore`
//! backs tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use postpilot_core::{EngineError, Result};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::task::{ScheduledTask, TaskStatus};

/// Persistence contract for scheduled tasks.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a new task.
    async fn insert(&self, task: &ScheduledTask) -> Result<()>;

    /// Fetch a task by id.
    async fn get(&self, id: &str) -> Result<Option<ScheduledTask>>;

    /// Overwrite a task record (status, timestamps, counters).
    async fn update(&self, task: &ScheduledTask) -> Result<()>;

    /// Pending tasks with `scheduled_at <= now`, oldest first, at most
    /// `limit`. This is the poll query.
    async fn due_pending(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<ScheduledTask>>;

    /// Tasks for one client, newest `scheduled_at` first, paginated.
    async fn for_client(
        &self,
        client_id: &str,
        status: Option<TaskStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ScheduledTask>>;

    /// Every task currently marked in-progress. Used by the startup
    /// recovery sweep to find executions abandoned by a dead process.
    async fn in_progress(&self) -> Result<Vec<ScheduledTask>>;
}

/// In-memory store for tests and local experiments.
pub struct MemoryTaskStore {
    tasks: Mutex<HashMap<String, ScheduledTask>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn insert(&self, task: &ScheduledTask) -> Result<()> {
        let mut tasks = self.tasks.lock().await;
        if tasks.contains_key(&task.id) {
            return Err(EngineError::Store(format!("duplicate task id {}", task.id)));
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ScheduledTask>> {
        Ok(self.tasks.lock().await.get(id).cloned())
    }

    async fn update(&self, task: &ScheduledTask) -> Result<()> {
        let mut tasks = self.tasks.lock().await;
        if !tasks.contains_key(&task.id) {
            return Err(EngineError::Store(format!("unknown task id {}", task.id)));
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn due_pending(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<ScheduledTask>> {
        let tasks = self.tasks.lock().await;
        let mut due: Vec<ScheduledTask> = tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending && t.scheduled_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|t| t.scheduled_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn for_client(
        &self,
        client_id: &str,
        status: Option<TaskStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ScheduledTask>> {
        let tasks = self.tasks.lock().await;
        let mut matching: Vec<ScheduledTask> = tasks
            .values()
            .filter(|t| t.client_id == client_id)
            .filter(|t| status.is_none_or(|s| t.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.scheduled_at.cmp(&a.scheduled_at));
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn in_progress(&self) -> Result<Vec<ScheduledTask>> {
        let tasks = self.tasks.lock().await;
        Ok(tasks
            .values()
            .filter(|t| t.status == TaskStatus::InProgress)
            .cloned()
            .collect())
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
                payload: serde_json::Value::Null,
                scheduled_at,
                execution_window_secs: None,
                max_retries: None,
            },
            &SchedulerConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_due_pending_oldest_first() {
        let store = MemoryTaskStore::new();
        let now = Utc::now();
        let late = task_at(now - Duration::seconds(10));
        let early = task_at(now - Duration::seconds(60));
        let future = task_at(now + Duration::seconds(60));
        store.insert(&late).await.unwrap();
        store.insert(&early).await.unwrap();
        store.insert(&future).await.unwrap();

        let due = store.due_pending(now, 10).await.unwrap();
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].id, early.id);
        assert_eq!(due[1].id, late.id);
    }

    #[tokio::test]
    async fn test_due_pending_respects_limit_and_status() {
        let store = MemoryTaskStore::new();
        let now = Utc::now();
        let mut done = task_at(now - Duration::seconds(30));
        done.status = TaskStatus::Completed;
        store.insert(&done).await.unwrap();
        for i in 0..4 {
            store
                .insert(&task_at(now - Duration::seconds(i)))
                .await
                .unwrap();
        }
        let due = store.due_pending(now, 2).await.unwrap();
        assert_eq!(due.len(), 2);
    }

    #[tokio::test]
    async fn test_for_client_newest_first_paginated() {
        let store = MemoryTaskStore::new();
        let now = Utc::now();
        for i in 0..5 {
            store
                .insert(&task_at(now - Duration::minutes(i)))
                .await
                .unwrap();
        }
        let page = store.for_client("c1", None, 2, 1).await.unwrap();
        assert_eq!(page.len(), 2);
        // Newest first, offset skips the newest
        assert_eq!(page[0].scheduled_at, now - Duration::minutes(1));
        assert_eq!(page[1].scheduled_at, now - Duration::minutes(2));
    }
}
