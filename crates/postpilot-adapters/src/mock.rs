//! Scripted adapter for tests — queue up outcomes, count invocations.

use async_trait::async_trait;
use postpilot_core::error::Result;
use postpilot_core::traits::ExecutionAdapter;
use postpilot_core::types::{DirectMessage, DmDelivery, ExecutionOutcome};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Test adapter. With nothing queued it succeeds; queued results are
/// consumed front-to-back.
pub struct MockAdapter {
    kind: String,
    execute_script: Mutex<VecDeque<Result<ExecutionOutcome>>>,
    dm_script: Mutex<VecDeque<Result<DmDelivery>>>,
    execute_calls: AtomicUsize,
    dm_calls: AtomicUsize,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::with_kind("mock")
    }

    pub fn with_kind(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            execute_script: Mutex::new(VecDeque::new()),
            dm_script: Mutex::new(VecDeque::new()),
            execute_calls: AtomicUsize::new(0),
            dm_calls: AtomicUsize::new(0),
        }
    }

    /// Queue the next `execute_task` result.
    pub fn queue_execute(&self, result: Result<ExecutionOutcome>) {
        self.execute_script.lock().unwrap().push_back(result);
    }

    /// Queue the next `send_direct_message` result.
    pub fn queue_dm(&self, result: Result<DmDelivery>) {
        self.dm_script.lock().unwrap().push_back(result);
    }

    pub fn execute_calls(&self) -> usize {
        self.execute_calls.load(Ordering::SeqCst)
    }

    pub fn dm_calls(&self) -> usize {
        self.dm_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionAdapter for MockAdapter {
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn execute_task(&self, payload: &serde_json::Value) -> Result<ExecutionOutcome> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        match self.execute_script.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(ExecutionOutcome::ok(serde_json::json!({
                "echo": payload.clone()
            }))),
        }
    }

    async fn send_direct_message(&self, _message: &DirectMessage) -> Result<DmDelivery> {
        self.dm_calls.fetch_add(1, Ordering::SeqCst);
        match self.dm_script.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(DmDelivery::sent("mock-msg-1")),
        }
    }
}
