//! The execution-adapter contract.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{DirectMessage, DmDelivery, ExecutionOutcome};

/// A pluggable per-platform executor. One implementation per destination
/// platform kind (instagram, tiktok, webhook, ...); the scheduler resolves
/// the right one for a task's platform and hands it the merged payload.
///
/// Implementations must be cheap to share (`Arc<dyn ExecutionAdapter>`)
/// and must never panic — return `Err` for transport/auth failures and
/// `Ok(ExecutionOutcome { success: false, .. })` when the platform itself
/// rejected the action.
#[async_trait]
pub trait ExecutionAdapter: Send + Sync {
    /// Platform kind this adapter serves ("webhook", "instagram", ...).
    fn kind(&self) -> &str;

    /// Perform a scheduled platform action (post, pricing update, ...).
    /// The payload is the task's payload merged with `platformId` and
    /// `clientId`; the `taskType` field tells the adapter what to do.
    async fn execute_task(&self, payload: &serde_json::Value) -> Result<ExecutionOutcome>;

    /// Deliver a direct message to a platform user.
    async fn send_direct_message(&self, message: &DirectMessage) -> Result<DmDelivery>;
}
