//! Scheduler event bus — fire-and-forget notifications for monitoring.
//! Broadcast to any number of subscribers; a bounded in-memory history
//! ring keeps the last 100 events for dashboards and tests.

use serde::Serialize;
use tokio::sync::broadcast;

/// Everything the engine announces. One-way: nothing in the engine ever
/// waits on a subscriber.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SchedulerEvent {
    PollingStarted {
        interval_ms: u64,
    },
    PollingStopped,
    /// The poll-level query itself failed; the timer keeps running.
    PollingError {
        message: String,
    },
    /// Eligible tasks were found this tick. Not emitted on empty polls.
    TasksPolled {
        count: usize,
        task_ids: Vec<String>,
    },
    TaskExecuting {
        task_id: String,
    },
    TaskExecuted {
        task_id: String,
        success: bool,
    },
    /// The adapter call blew up; the retry state machine ran.
    TaskError {
        task_id: String,
        retry_count: u32,
        max_retries: u32,
        will_retry: bool,
        message: String,
    },
    /// The task aged past `scheduled_at + execution_window` before it
    /// could start. Terminal, and never consumes a retry.
    TaskWindowExpired {
        task_id: String,
    },
    TaskScheduled {
        task_id: String,
    },
    TaskCancelled {
        task_id: String,
    },
    TaskRescheduled {
        task_id: String,
    },
}

impl SchedulerEvent {
    /// Stable wire name, for log lines and external consumers.
    pub fn name(&self) -> &'static str {
        match self {
            SchedulerEvent::PollingStarted { .. } => "polling:started",
            SchedulerEvent::PollingStopped => "polling:stopped",
            SchedulerEvent::PollingError { .. } => "polling:error",
            SchedulerEvent::TasksPolled { .. } => "tasks:polled",
            SchedulerEvent::TaskExecuting { .. } => "task:executing",
            SchedulerEvent::TaskExecuted { .. } => "task:executed",
            SchedulerEvent::TaskError { .. } => "task:error",
            SchedulerEvent::TaskWindowExpired { .. } => "task:window-expired",
            SchedulerEvent::TaskScheduled { .. } => "task:scheduled",
            SchedulerEvent::TaskCancelled { .. } => "task:cancelled",
            SchedulerEvent::TaskRescheduled { .. } => "task:rescheduled",
        }
    }
}

/// Broadcast bus with bounded history.
pub struct EventBus {
    tx: broadcast::Sender<SchedulerEvent>,
    /// Last 100 events (ring buffer).
    history: std::sync::Mutex<Vec<SchedulerEvent>>,
}

const HISTORY_CAP: usize = 100;

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            history: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to live events. Slow subscribers lag and drop events;
    /// they never block the engine.
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event. Fine with zero subscribers.
    pub fn emit(&self, event: SchedulerEvent) {
        if let Ok(mut history) = self.history.lock() {
            history.push(event.clone());
            if history.len() > HISTORY_CAP {
                history.remove(0);
            }
        }
        let _ = self.tx.send(event);
    }

    /// Snapshot of recent events, oldest first.
    pub fn history(&self) -> Vec<SchedulerEvent> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
