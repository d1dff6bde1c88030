//! Generic HTTP adapter — forwards execution payloads and DMs to a relay
//! endpoint as JSON. Covers any platform fronted by an internal service
//! that speaks the `{success, error, ...}` result shape.

use async_trait::async_trait;
use postpilot_core::error::{EngineError, Result};
use postpilot_core::traits::ExecutionAdapter;
use postpilot_core::types::{DirectMessage, DmDelivery, ExecutionOutcome};
use serde::{Deserialize, Serialize};

/// Webhook adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAdapterConfig {
    /// Kind this adapter is registered under.
    pub kind: String,
    /// Endpoint receiving execution payloads (POST, JSON).
    pub endpoint: String,
    #[serde(default)]
    pub auth_header: String,
    #[serde(default)]
    pub auth_value: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

pub struct WebhookAdapter {
    config: WebhookAdapterConfig,
    client: reqwest::Client,
}

impl WebhookAdapter {
    pub fn new(config: WebhookAdapterConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    async fn post(&self, body: &serde_json::Value) -> Result<serde_json::Value> {
        let mut req = self
            .client
            .post(&self.config.endpoint)
            .json(body)
            .timeout(std::time::Duration::from_secs(self.config.timeout_secs));
        if !self.config.auth_header.is_empty() {
            req = req.header(&self.config.auth_header, &self.config.auth_value);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| EngineError::Adapter(format!("{}: send failed: {e}", self.config.kind)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::Adapter(format!(
                "{}: endpoint error {status}: {body}",
                self.config.kind
            )));
        }

        resp.json()
            .await
            .map_err(|e| EngineError::Adapter(format!("{}: invalid response: {e}", self.config.kind)))
    }
}

#[async_trait]
impl ExecutionAdapter for WebhookAdapter {
    fn kind(&self) -> &str {
        &self.config.kind
    }

    async fn execute_task(&self, payload: &serde_json::Value) -> Result<ExecutionOutcome> {
        let body = serde_json::json!({
            "action": "execute_task",
            "payload": payload,
        });
        let mut result = self.post(&body).await?;

        let success = result["success"].as_bool().unwrap_or(false);
        let error = result["error"].as_str().map(String::from);
        // Everything beyond success/error is the result log
        if let Some(obj) = result.as_object_mut() {
            obj.remove("success");
            obj.remove("error");
        }
        Ok(ExecutionOutcome {
            success,
            error,
            details: result,
        })
    }

    async fn send_direct_message(&self, message: &DirectMessage) -> Result<DmDelivery> {
        let body = serde_json::json!({
            "action": "send_direct_message",
            "userId": message.user_id,
            "username": message.username,
            "message": message.message,
            "imageUrl": message.image_url,
        });
        let result = self.post(&body).await?;

        if result["success"].as_bool().unwrap_or(false) {
            tracing::info!(
                "✅ DM relayed via {} to {}",
                self.config.kind,
                message.username
            );
            Ok(DmDelivery {
                success: true,
                message_id: result["messageId"].as_str().map(String::from),
                error: None,
            })
        } else {
            Ok(DmDelivery::failed(
                result["error"].as_str().unwrap_or("unknown delivery failure"),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config: WebhookAdapterConfig = serde_json::from_value(serde_json::json!({
            "kind": "relay",
            "endpoint": "http://localhost:9000/hooks/exec",
        }))
        .unwrap();
        assert_eq!(config.timeout_secs, 10);
        assert!(config.auth_header.is_empty());
    }

    #[test]
    fn test_kind() {
        let adapter = WebhookAdapter::new(WebhookAdapterConfig {
            kind: "relay".into(),
            endpoint: "http://localhost:9000".into(),
            auth_header: String::new(),
            auth_value: String::new(),
            timeout_secs: 10,
        });
        assert_eq!(adapter.kind(), "relay");
    }
}
