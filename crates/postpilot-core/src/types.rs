//! Wire types crossing the execution-adapter boundary.

use serde::{Deserialize, Serialize};

/// What an adapter reports back after performing a platform action.
///
/// `Ok(ExecutionOutcome { success: false, .. })` is an adapter-*reported*
/// failure (the platform answered, and said no). An `Err(_)` from the
/// adapter call models the adapter itself blowing up. The scheduler
/// treats the two differently — only the latter is retried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    /// Platform-reported failure reason, when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Free-form result fields (post id, URL, ...) recorded in the task log.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl ExecutionOutcome {
    /// A successful outcome with result fields.
    pub fn ok(details: serde_json::Value) -> Self {
        Self {
            success: true,
            error: None,
            details,
        }
    }

    /// A platform-reported failure.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            details: serde_json::Value::Null,
        }
    }
}

/// A direct message to deliver through a platform adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectMessage {
    /// Platform user id of the recipient.
    pub user_id: String,
    /// Platform username (some APIs address by handle, not id).
    pub username: String,
    /// Rendered message body.
    pub message: String,
    /// Optional image attachment URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Delivery receipt for a direct message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DmDelivery {
    pub success: bool,
    /// Platform-assigned message id, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DmDelivery {
    pub fn sent(message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            message_id: Some(message_id.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}
