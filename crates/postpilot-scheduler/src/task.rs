//! Task definitions — the core data model for scheduled work.

use chrono::{DateTime, Duration, Utc};
use postpilot_core::SchedulerConfig;
use serde::{Deserialize, Serialize};

/// A scheduled task. Created once by a caller, mutated only by the
/// scheduler engine, never deleted (cancellation is a status transition).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    /// Unique task ID.
    pub id: String,
    /// Owning tenant (opaque to the engine).
    pub client_id: String,
    /// Destination platform integration (opaque to the engine; the
    /// adapter registry maps it to an adapter).
    pub platform_id: String,
    /// What the adapter should do ("post", "message", "pricingUpdate", ...).
    pub task_type: String,
    /// Opaque payload forwarded to the adapter, merged with
    /// platform/client ids at dispatch time.
    pub payload: serde_json::Value,
    /// Earliest moment the task becomes eligible.
    pub scheduled_at: DateTime<Utc>,
    /// The task must *start* within this many seconds of `scheduled_at`,
    /// or it is force-failed without consuming a retry.
    pub execution_window_secs: i64,
    /// Current status.
    pub status: TaskStatus,
    /// Attempts consumed so far. Only thrown adapter errors count.
    pub retry_count: u32,
    /// Retry budget.
    pub max_retries: u32,
    /// Last time the retry path ran.
    pub last_retry_at: Option<DateTime<Utc>>,
    /// When the final attempt finished (success or terminal failure).
    pub executed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Diagnostic output of the last failed attempt.
    pub error_message: Option<String>,
    /// Diagnostic output of the successful attempt.
    pub result_log: Option<String>,
}

/// Task status.
///
/// Terminal: `Completed`, `Cancelled`. `Failed` is terminal once retries
/// are exhausted or the execution window expired; a retryable failure
/// goes back to `Pending` instead.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Parse the storage representation. Unknown strings map to `Pending`
    /// rather than erroring — the store never invents statuses, and a
    /// readable row beats a dropped one.
    pub fn parse(s: &str) -> Self {
        match s {
            "in_progress" => TaskStatus::InProgress,
            "completed" => TaskStatus::Completed,
            "failed" => TaskStatus::Failed,
            "cancelled" => TaskStatus::Cancelled,
            _ => TaskStatus::Pending,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied spec for a new task. Window and retry budget fall back
/// to the scheduler config defaults when unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub client_id: String,
    pub platform_id: String,
    pub task_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub execution_window_secs: Option<i64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl ScheduledTask {
    /// Build a fresh `Pending` task from a caller spec, filling defaults
    /// from the scheduler config.
    pub fn from_spec(spec: NewTask, config: &SchedulerConfig) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            client_id: spec.client_id,
            platform_id: spec.platform_id,
            task_type: spec.task_type,
            payload: spec.payload,
            scheduled_at: spec.scheduled_at,
            execution_window_secs: spec
                .execution_window_secs
                .unwrap_or(config.default_execution_window_secs),
            status: TaskStatus::Pending,
            retry_count: 0,
            max_retries: spec.max_retries.unwrap_or(config.default_max_retries),
            last_retry_at: None,
            executed_at: None,
            created_at: now,
            updated_at: now,
            error_message: None,
            result_log: None,
        }
    }

    /// Latest moment execution may still *start*.
    pub fn window_deadline(&self) -> DateTime<Utc> {
        self.scheduled_at + Duration::seconds(self.execution_window_secs)
    }

    /// The adapter-facing payload: task payload plus injected routing ids.
    pub fn execution_payload(&self) -> serde_json::Value {
        let mut payload = self.payload.clone();
        if !payload.is_object() {
            payload = serde_json::json!({ "data": payload });
        }
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("taskType".into(), serde_json::json!(self.task_type));
            obj.insert("platformId".into(), serde_json::json!(self.platform_id));
            obj.insert("clientId".into(), serde_json::json!(self.client_id));
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(at: DateTime<Utc>) -> NewTask {
        NewTask {
            client_id: "client-1".into(),
            platform_id: "ig-main".into(),
            task_type: "post".into(),
            payload: serde_json::json!({"caption": "hello"}),
            scheduled_at: at,
            execution_window_secs: None,
            max_retries: None,
        }
    }

    #[test]
    fn test_defaults_from_config() {
        let task = ScheduledTask::from_spec(spec(Utc::now()), &SchedulerConfig::default());
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 0);
        assert_eq!(task.execution_window_secs, 300);
        assert_eq!(task.max_retries, 3);
    }

    #[test]
    fn test_window_deadline() {
        let at = Utc::now();
        let mut task = ScheduledTask::from_spec(spec(at), &SchedulerConfig::default());
        task.execution_window_secs = 60;
        assert_eq!(task.window_deadline(), at + Duration::seconds(60));
    }

    #[test]
    fn test_execution_payload_injects_ids() {
        let task = ScheduledTask::from_spec(spec(Utc::now()), &SchedulerConfig::default());
        let payload = task.execution_payload();
        assert_eq!(payload["caption"], "hello");
        assert_eq!(payload["platformId"], "ig-main");
        assert_eq!(payload["clientId"], "client-1");
        assert_eq!(payload["taskType"], "post");
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
        ] {
            assert_eq!(TaskStatus::parse(status.as_str()), status);
        }
    }
}
