//! Scheduler Engine — the polling loop that claims and executes due tasks.
//! Uses tokio::interval for zero-overhead ticking; each claimed task runs
//! as its own spawned execution that the loop never awaits.

use chrono::Utc;
use postpilot_adapters::AdapterRegistry;
use postpilot_core::{EngineError, Result, SchedulerConfig};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::events::{EventBus, SchedulerEvent};
use crate::store::TaskStore;
use crate::task::{NewTask, ScheduledTask, TaskStatus};

/// The scheduler engine.
///
/// Construct exactly one per process and share it as `Arc<SchedulerEngine>`
/// — the in-memory in-flight set is the *only* guard against claiming a
/// task twice, so two engine processes against one store can double-execute
/// a task. Multi-instance deployment needs storage-level claim locking
/// (conditional update) on top; this engine deliberately does not add it.
pub struct SchedulerEngine {
    store: Arc<dyn TaskStore>,
    adapters: Arc<AdapterRegistry>,
    events: EventBus,
    config: SchedulerConfig,
    /// Ids currently executing in this process.
    in_flight: Mutex<HashSet<String>>,
    polling: AtomicBool,
    poll_handle: Mutex<Option<JoinHandle<()>>>,
}

impl SchedulerEngine {
    /// Create a new engine around a task store and adapter registry.
    pub fn new(
        store: Arc<dyn TaskStore>,
        adapters: Arc<AdapterRegistry>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            adapters,
            events: EventBus::default(),
            config,
            in_flight: Mutex::new(HashSet::new()),
            polling: AtomicBool::new(false),
            poll_handle: Mutex::new(None),
        }
    }

    /// The engine's event bus, for subscribing to notifications.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Whether the poll loop is running.
    pub fn is_polling(&self) -> bool {
        self.polling.load(Ordering::SeqCst)
    }

    /// Number of tasks executing right now.
    pub async fn current_execution_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    // ─── Polling lifecycle ───────────────────────────────────────

    /// Start the poll loop: one poll immediately, then every
    /// `interval_ms`. Idempotent — a second call is a logged no-op.
    pub async fn start_polling(self: Arc<Self>, interval_ms: u64) {
        if self.polling.swap(true, Ordering::SeqCst) {
            tracing::warn!("⏭️ start_polling ignored — already polling");
            return;
        }

        tracing::info!("⏰ Scheduler polling started (every {interval_ms}ms)");
        self.events
            .emit(SchedulerEvent::PollingStarted { interval_ms });

        let engine = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_millis(interval_ms));
            loop {
                // First tick completes immediately — that's the instant poll
                interval.tick().await;
                engine.clone().poll_once().await;
            }
        });
        *self.poll_handle.lock().await = Some(handle);
    }

    /// Stop the poll loop. In-flight executions keep running to
    /// completion. Idempotent.
    pub async fn stop_polling(&self) {
        if !self.polling.swap(false, Ordering::SeqCst) {
            tracing::debug!("stop_polling ignored — not polling");
            return;
        }
        if let Some(handle) = self.poll_handle.lock().await.take() {
            handle.abort();
        }
        tracing::info!("🛑 Scheduler polling stopped");
        self.events.emit(SchedulerEvent::PollingStopped);
    }

    /// Stop polling, then wait up to the configured grace period for
    /// in-flight executions to finish. Stragglers are abandoned (their
    /// storage rows stay `in_progress` until `recover_stale` runs on the
    /// next start).
    pub async fn shutdown(&self) {
        self.stop_polling().await;
        let deadline =
            tokio::time::Instant::now() + std::time::Duration::from_secs(self.config.shutdown_grace_secs);
        loop {
            let remaining = self.in_flight.lock().await.len();
            if remaining == 0 {
                tracing::info!("👋 Scheduler drained cleanly");
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!("⚠️ Shutdown grace expired — abandoning {remaining} in-flight executions");
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }

    /// Startup sweep: executions a previous process abandoned show up as
    /// `in_progress` rows. Those already past their window are marked
    /// failed; ones still inside their window are left alone. Explicit —
    /// the engine never runs this on its own.
    pub async fn recover_stale(&self) -> Result<usize> {
        let now = Utc::now();
        let stuck = self.store.in_progress().await?;
        let mut recovered = 0;
        for mut task in stuck {
            if now <= task.window_deadline() {
                continue;
            }
            task.status = TaskStatus::Failed;
            task.error_message = Some(
                "Recovered stale in-progress task: execution window expired while abandoned"
                    .to_string(),
            );
            task.executed_at = Some(now);
            task.updated_at = now;
            self.store.update(&task).await?;
            recovered += 1;
            tracing::warn!("🧹 Recovered stale task {}", task.id);
        }
        Ok(recovered)
    }

    // ─── Public task API ─────────────────────────────────────────

    /// Persist a new task. Rejects scheduling times that aren't strictly
    /// in the future.
    pub async fn schedule_task(&self, spec: NewTask) -> Result<String> {
        if spec.scheduled_at <= Utc::now() {
            return Err(EngineError::validation(
                "scheduled_at must be in the future",
            ));
        }
        let task = ScheduledTask::from_spec(spec, &self.config);
        self.store.insert(&task).await?;
        tracing::info!(
            "📅 Task scheduled: {} ({} on {}) at {}",
            task.id,
            task.task_type,
            task.platform_id,
            task.scheduled_at
        );
        self.events.emit(SchedulerEvent::TaskScheduled {
            task_id: task.id.clone(),
        });
        Ok(task.id)
    }

    /// Cancel a task that hasn't started yet.
    pub async fn cancel_task(&self, task_id: &str) -> Result<()> {
        let mut task = self
            .store
            .get(task_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("task {task_id}")))?;
        if task.status != TaskStatus::Pending {
            return Err(EngineError::invalid_state(format!(
                "cannot cancel task {task_id} in status {}",
                task.status
            )));
        }
        task.status = TaskStatus::Cancelled;
        task.updated_at = Utc::now();
        self.store.update(&task).await?;
        tracing::info!("🚫 Task cancelled: {task_id}");
        self.events.emit(SchedulerEvent::TaskCancelled {
            task_id: task_id.to_string(),
        });
        Ok(())
    }

    /// Move a pending or failed task to a new future time, resetting its
    /// retry bookkeeping.
    pub async fn reschedule_task(
        &self,
        task_id: &str,
        new_scheduled_at: chrono::DateTime<Utc>,
    ) -> Result<()> {
        if new_scheduled_at <= Utc::now() {
            return Err(EngineError::validation(
                "new scheduled_at must be in the future",
            ));
        }
        let mut task = self
            .store
            .get(task_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("task {task_id}")))?;
        if task.status != TaskStatus::Pending && task.status != TaskStatus::Failed {
            return Err(EngineError::invalid_state(format!(
                "cannot reschedule task {task_id} in status {}",
                task.status
            )));
        }
        task.status = TaskStatus::Pending;
        task.retry_count = 0;
        task.error_message = None;
        task.scheduled_at = new_scheduled_at;
        task.updated_at = Utc::now();
        self.store.update(&task).await?;
        tracing::info!("🔄 Task rescheduled: {task_id} → {new_scheduled_at}");
        self.events.emit(SchedulerEvent::TaskRescheduled {
            task_id: task_id.to_string(),
        });
        Ok(())
    }

    /// Read-only task listing for one client, newest scheduled first.
    pub async fn scheduled_tasks(
        &self,
        client_id: &str,
        status: Option<TaskStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ScheduledTask>> {
        self.store.for_client(client_id, status, limit, offset).await
    }

    // ─── Poll & execute ──────────────────────────────────────────

    /// One poll tick: claim due pending tasks up to the concurrency cap
    /// and launch them. Returns how many executions were launched.
    pub async fn poll_once(self: Arc<Self>) -> usize {
        let in_flight_count = self.in_flight.lock().await.len();
        if in_flight_count >= self.config.max_concurrent {
            tracing::debug!(
                "⏸️ At capacity ({in_flight_count}/{}) — skipping poll tick",
                self.config.max_concurrent
            );
            return 0;
        }

        let now = Utc::now();
        let limit = self.config.max_concurrent - in_flight_count;
        let due = match self.store.due_pending(now, limit).await {
            Ok(due) => due,
            Err(e) => {
                tracing::error!("⚠️ Poll query failed: {e}");
                self.events.emit(SchedulerEvent::PollingError {
                    message: e.to_string(),
                });
                return 0;
            }
        };

        if due.is_empty() {
            tracing::debug!("💤 No eligible tasks");
            return 0;
        }

        self.events.emit(SchedulerEvent::TasksPolled {
            count: due.len(),
            task_ids: due.iter().map(|t| t.id.clone()).collect(),
        });

        // Claim in memory before anything async happens, so the next tick
        // can't re-claim the same ids while storage still says pending.
        let mut claimed = Vec::new();
        {
            let mut in_flight = self.in_flight.lock().await;
            for task in due {
                if in_flight.contains(&task.id) {
                    continue;
                }
                in_flight.insert(task.id.clone());
                claimed.push(task.id);
            }
        }

        let launched = claimed.len();
        for task_id in claimed {
            let engine = Arc::clone(&self);
            tokio::spawn(async move {
                engine.execute_claimed(task_id).await;
            });
        }
        launched
    }

    /// Run one claimed task to completion and release its in-flight slot.
    /// Never propagates errors — everything is absorbed into task state
    /// and events.
    async fn execute_claimed(self: Arc<Self>, task_id: String) {
        self.run_one(&task_id).await;
        self.in_flight.lock().await.remove(&task_id);
    }

    async fn run_one(&self, task_id: &str) {
        let task = match self.store.get(task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                tracing::warn!("Task {task_id} vanished before execution");
                return;
            }
            Err(e) => {
                tracing::error!("⚠️ Failed to load task {task_id}: {e}");
                return;
            }
        };

        // Re-check: another tick (or an API call) may have moved this task
        // between the storage query and our claim.
        if task.status != TaskStatus::Pending {
            tracing::debug!(
                "Task {task_id} is {} now — skipping execution",
                task.status
            );
            return;
        }

        let now = Utc::now();
        if now > task.window_deadline() {
            let mut task = task;
            task.status = TaskStatus::Failed;
            task.error_message = Some(format!(
                "Execution window expired: task had to start within {}s of {}",
                task.execution_window_secs, task.scheduled_at
            ));
            task.executed_at = Some(now);
            task.updated_at = now;
            if let Err(e) = self.store.update(&task).await {
                tracing::error!("⚠️ Failed to mark task {task_id} window-expired: {e}");
            }
            tracing::warn!("⏱️ Task {task_id} missed its execution window");
            self.events.emit(SchedulerEvent::TaskWindowExpired {
                task_id: task_id.to_string(),
            });
            return;
        }

        let mut task = task;
        task.status = TaskStatus::InProgress;
        task.updated_at = now;
        if let Err(e) = self.store.update(&task).await {
            tracing::error!("⚠️ Failed to mark task {task_id} in progress: {e}");
            return;
        }
        self.events.emit(SchedulerEvent::TaskExecuting {
            task_id: task_id.to_string(),
        });

        let Some(adapter) = self.adapters.resolve(&task.platform_id) else {
            // No adapter is an execution error, so it goes through retries
            self.fail_with_retry(
                task_id,
                format!("No adapter registered for platform {}", task.platform_id),
            )
            .await;
            return;
        };

        let payload = task.execution_payload();
        tracing::info!("🚀 Executing task {task_id} ({})", task.task_type);

        match adapter.execute_task(&payload).await {
            Ok(outcome) if outcome.success => {
                let now = Utc::now();
                task.status = TaskStatus::Completed;
                task.result_log = (!outcome.details.is_null()).then(|| outcome.details.to_string());
                task.error_message = None;
                task.executed_at = Some(now);
                task.updated_at = now;
                if let Err(e) = self.store.update(&task).await {
                    tracing::error!("⚠️ Failed to record task {task_id} success: {e}");
                }
                tracing::info!("✅ Task {task_id} completed");
                self.events.emit(SchedulerEvent::TaskExecuted {
                    task_id: task_id.to_string(),
                    success: true,
                });
            }
            Ok(outcome) => {
                let reason = outcome
                    .error
                    .unwrap_or_else(|| "adapter reported failure".to_string());
                if self.config.retry_reported_failures {
                    self.fail_with_retry(task_id, reason).await;
                    return;
                }
                // Adapter answered and said no: terminal, no retry. Only
                // adapter *errors* get retried (upstream behavior).
                let now = Utc::now();
                task.status = TaskStatus::Failed;
                task.error_message = Some(reason);
                task.executed_at = Some(now);
                task.updated_at = now;
                if let Err(e) = self.store.update(&task).await {
                    tracing::error!("⚠️ Failed to record task {task_id} failure: {e}");
                }
                tracing::warn!("❌ Task {task_id} failed (adapter report)");
                self.events.emit(SchedulerEvent::TaskExecuted {
                    task_id: task_id.to_string(),
                    success: false,
                });
            }
            Err(e) => {
                self.fail_with_retry(task_id, e.to_string()).await;
            }
        }
    }

    /// The retry path for thrown adapter errors: bump the retry counter,
    /// requeue while budget remains, otherwise fail terminally.
    async fn fail_with_retry(&self, task_id: &str, error: String) {
        // Re-fetch so concurrent counter updates aren't overwritten
        let mut task = match self.store.get(task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                tracing::warn!("Task {task_id} vanished during retry handling");
                return;
            }
            Err(e) => {
                tracing::error!("⚠️ Failed to reload task {task_id} for retry: {e}");
                return;
            }
        };

        let now = Utc::now();
        let new_retry_count = task.retry_count + 1;
        let will_retry = new_retry_count < task.max_retries;

        if will_retry {
            task.status = TaskStatus::Pending;
            tracing::warn!(
                "🔁 Task {task_id} failed (attempt {new_retry_count}/{}) — requeued: {error}",
                task.max_retries
            );
        } else {
            task.status = TaskStatus::Failed;
            task.executed_at = Some(now);
            tracing::warn!(
                "❌ Task {task_id} failed permanently after {new_retry_count} attempts: {error}"
            );
        }
        task.retry_count = new_retry_count;
        task.last_retry_at = Some(now);
        task.error_message = Some(error.clone());
        task.updated_at = now;

        if let Err(e) = self.store.update(&task).await {
            tracing::error!("⚠️ Failed to record retry state for task {task_id}: {e}");
        }
        self.events.emit(SchedulerEvent::TaskError {
            task_id: task_id.to_string(),
            retry_count: new_retry_count,
            max_retries: task.max_retries,
            will_retry,
            message: error,
        });
    }
}
