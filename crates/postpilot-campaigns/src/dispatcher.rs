//! DM dispatcher — creates campaign messages, personalizes and sends
//! them, records delivery and engagement.
//!
//! Failures during autonomous sending are absorbed into message state
//! (status + error text) and logs; nothing propagates to the caller.
//! There is no automatic DM retry here — callers who want retries wrap a
//! send as a scheduled task and let the scheduler's retry machinery own
//! it.

use chrono::{DateTime, Utc};
use postpilot_adapters::AdapterRegistry;
use postpilot_core::types::DirectMessage;
use postpilot_core::{EngineError, Result};
use std::collections::HashMap;
use std::sync::Arc;

use crate::model::{CampaignStatus, DmMessage, DmTarget, EngagementEvent, MessageStatus};
use crate::ratelimit::RateLimiter;
use crate::store::CampaignStore;
use crate::template;

/// Request to enqueue one DM under a campaign.
#[derive(Debug, Clone)]
pub struct DmRequest {
    pub campaign_id: String,
    pub target: DmTarget,
    /// Future date → message waits as `Scheduled`; absent or past →
    /// immediate send.
    pub scheduled_date: Option<DateTime<Utc>>,
    /// Message-level personalization; wins over campaign-level values.
    pub personalization: HashMap<String, String>,
}

/// The DM campaign dispatcher.
pub struct DmDispatcher {
    store: Arc<dyn CampaignStore>,
    adapters: Arc<AdapterRegistry>,
    limiter: RateLimiter,
}

impl DmDispatcher {
    pub fn new(store: Arc<dyn CampaignStore>, adapters: Arc<AdapterRegistry>) -> Self {
        Self {
            store,
            adapters,
            limiter: RateLimiter::new(),
        }
    }

    /// Create a message under a campaign. Silently drops (log + `None`)
    /// when the campaign is missing or not active. Immediate sends are
    /// fired before returning.
    pub async fn schedule_dm(&self, request: DmRequest) -> Option<String> {
        let campaign = match self.store.get_campaign(&request.campaign_id).await {
            Ok(Some(campaign)) => campaign,
            Ok(None) => {
                tracing::warn!("📭 DM dropped: campaign {} not found", request.campaign_id);
                return None;
            }
            Err(e) => {
                tracing::error!("⚠️ DM dropped: campaign load failed: {e}");
                return None;
            }
        };
        if campaign.status != CampaignStatus::Active {
            tracing::warn!(
                "📭 DM dropped: campaign {} is {} (needs active)",
                campaign.id,
                campaign.status.as_str()
            );
            return None;
        }

        let now = Utc::now();
        let send_later = request.scheduled_date.is_some_and(|d| d > now);
        let status = if send_later {
            MessageStatus::Scheduled
        } else {
            MessageStatus::Pending
        };
        let message = DmMessage::new(
            &campaign,
            request.target,
            request.personalization,
            request.scheduled_date,
            status,
        );
        if let Err(e) = self.store.insert_message(&message).await {
            tracing::error!("⚠️ DM dropped: message save failed: {e}");
            return None;
        }
        tracing::info!(
            "💬 DM queued: {} → @{} ({})",
            message.id,
            message.target.username,
            status.as_str()
        );

        let message_id = message.id.clone();
        if !send_later {
            self.send_dm(&message_id).await;
        }
        Some(message_id)
    }

    /// Send one message. Returns `true` when the message is (now or
    /// already) delivered. Idempotent on `Sent`; refuses to resend
    /// `Failed` messages — those need an explicit reset first.
    pub async fn send_dm(&self, message_id: &str) -> bool {
        let mut message = match self.store.get_message(message_id).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                tracing::warn!("📭 send_dm: message {message_id} not found");
                return false;
            }
            Err(e) => {
                tracing::error!("⚠️ send_dm: message load failed: {e}");
                return false;
            }
        };

        match message.status {
            MessageStatus::Sent | MessageStatus::Responded | MessageStatus::Converted => {
                tracing::debug!("send_dm: message {message_id} already delivered");
                return true;
            }
            MessageStatus::Failed => {
                tracing::warn!("🚫 send_dm: message {message_id} is failed — not resending");
                return false;
            }
            _ => {}
        }

        let campaign = match self.store.get_campaign(&message.campaign_id).await {
            Ok(Some(campaign)) => campaign,
            _ => {
                tracing::warn!(
                    "📭 send_dm: campaign {} missing for message {message_id}",
                    message.campaign_id
                );
                return false;
            }
        };
        let Some(adapter) = self.adapters.resolve(&campaign.platform_id) else {
            tracing::warn!(
                "📭 send_dm: no adapter for platform {}",
                campaign.platform_id
            );
            return false;
        };

        let now = Utc::now();
        if !self
            .limiter
            .check(&campaign.id, &campaign.platform_id, campaign.throttle_rate, now)
            .await
        {
            tracing::info!(
                "🚦 Rate limited: campaign {} on {} (hourly cap {})",
                campaign.id,
                campaign.platform_id,
                campaign.throttle_rate
            );
            return false;
        }

        // Campaign values are the base; message-level values win
        let mut merged = campaign.personalization.clone();
        merged.extend(message.personalization.clone());
        let rendered = template::apply(&campaign.message_template, &merged, "");

        message.status = MessageStatus::Sending;
        message.content = rendered.clone();
        message.sent_at = Some(now);
        message.updated_at = now;
        if let Err(e) = self.store.update_message(&message).await {
            tracing::error!("⚠️ send_dm: failed to mark message sending: {e}");
            return false;
        }

        let dm = DirectMessage {
            user_id: message.target.user_id.clone(),
            username: message.target.username.clone(),
            message: rendered,
            image_url: None,
        };
        let delivered = match adapter.send_direct_message(&dm).await {
            Ok(delivery) if delivery.success => {
                message.status = MessageStatus::Sent;
                message.platform_message_id = delivery.message_id;
                message.error = None;
                tracing::info!("✅ DM sent: {} → @{}", message.id, message.target.username);
                true
            }
            Ok(delivery) => {
                message.status = MessageStatus::Failed;
                message.error =
                    Some(delivery.error.unwrap_or_else(|| "delivery refused".to_string()));
                tracing::warn!("❌ DM delivery refused: {}", message.id);
                false
            }
            Err(e) => {
                message.status = MessageStatus::Failed;
                message.error = Some(e.to_string());
                tracing::warn!("❌ DM send errored: {}: {e}", message.id);
                false
            }
        };
        message.updated_at = Utc::now();
        if let Err(e) = self.store.update_message(&message).await {
            tracing::error!("⚠️ send_dm: failed to record delivery state: {e}");
        }

        if delivered {
            self.limiter
                .record(&campaign.id, &campaign.platform_id, now)
                .await;
            if let Err(e) = self.store.increment_sent(&campaign.id).await {
                tracing::error!("⚠️ send_dm: failed to bump sent counter: {e}");
            }
        }
        delivered
    }

    /// Record an engagement event. Each event type lands exactly once per
    /// message (idempotent); responses and conversions also advance the
    /// message status.
    pub async fn record_event(&self, message_id: &str, event: EngagementEvent) -> Result<()> {
        let mut message = self
            .store
            .get_message(message_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("message {message_id}")))?;
        let campaign = self
            .store
            .get_campaign(&message.campaign_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("campaign {}", message.campaign_id)))?;

        let now = Utc::now();
        let first_time = match event {
            EngagementEvent::Open => {
                if message.opened_at.is_some() {
                    false
                } else {
                    message.opened_at = Some(now);
                    true
                }
            }
            EngagementEvent::Response => {
                if message.responded_at.is_some() {
                    false
                } else {
                    message.responded_at = Some(now);
                    message.status = MessageStatus::Responded;
                    true
                }
            }
            EngagementEvent::Conversion => {
                if message.converted_at.is_some() {
                    false
                } else {
                    message.converted_at = Some(now);
                    message.status = MessageStatus::Converted;
                    true
                }
            }
        };
        if !first_time {
            tracing::debug!(
                "record_event: {} already recorded for message {message_id}",
                event.as_str()
            );
            return Ok(());
        }

        message.updated_at = now;
        self.store.update_message(&message).await?;
        self.store
            .bump_metric(&campaign.id, &campaign.platform_id, event)
            .await?;
        tracing::info!(
            "📈 Engagement: {} on message {} (campaign {})",
            event.as_str(),
            message_id,
            campaign.id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DmCampaign;
    use crate::store::MemoryCampaignStore;
    use postpilot_adapters::MockAdapter;
    use postpilot_core::types::DmDelivery;

    struct Harness {
        dispatcher: DmDispatcher,
        store: Arc<MemoryCampaignStore>,
        adapter: Arc<MockAdapter>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryCampaignStore::new());
        let adapter = Arc::new(MockAdapter::new());
        let mut registry = AdapterRegistry::new();
        registry.register(adapter.clone());
        registry.bind("ig-main", "mock");
        Harness {
            dispatcher: DmDispatcher::new(store.clone(), Arc::new(registry)),
            store,
            adapter,
        }
    }

    async fn active_campaign(h: &Harness, throttle: u32) -> DmCampaign {
        let mut campaign = DmCampaign::new("ig-main", "Hey {{firstName|username}}!", throttle);
        campaign.status = CampaignStatus::Active;
        campaign
            .personalization
            .insert("firstName".into(), "there".into());
        h.store.insert_campaign(&campaign).await.unwrap();
        campaign
    }

    fn request(campaign_id: &str) -> DmRequest {
        DmRequest {
            campaign_id: campaign_id.into(),
            target: DmTarget {
                user_id: "u42".into(),
                username: "creator_jane".into(),
            },
            scheduled_date: None,
            personalization: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_schedule_drops_missing_or_inactive_campaign() {
        let h = harness();
        assert!(h.dispatcher.schedule_dm(request("missing")).await.is_none());

        let mut campaign = DmCampaign::new("ig-main", "Hi!", 5);
        campaign.status = CampaignStatus::Paused;
        h.store.insert_campaign(&campaign).await.unwrap();
        assert!(
            h.dispatcher
                .schedule_dm(request(&campaign.id))
                .await
                .is_none()
        );
        assert_eq!(h.adapter.dm_calls(), 0);
    }

    #[tokio::test]
    async fn test_immediate_send_renders_and_delivers() {
        let h = harness();
        let campaign = active_campaign(&h, 5).await;
        let mut req = request(&campaign.id);
        // Message-level value overrides the campaign default
        req.personalization
            .insert("firstName".into(), "Jane".into());

        let message_id = h.dispatcher.schedule_dm(req).await.unwrap();

        let message = h.store.get_message(&message_id).await.unwrap().unwrap();
        assert_eq!(message.status, MessageStatus::Sent);
        assert_eq!(message.content, "Hey Jane!");
        assert_eq!(message.platform_message_id.as_deref(), Some("mock-msg-1"));
        assert!(message.sent_at.is_some());
        assert_eq!(h.adapter.dm_calls(), 1);

        let campaign = h.store.get_campaign(&campaign.id).await.unwrap().unwrap();
        assert_eq!(campaign.sent_messages, 1);
    }

    #[tokio::test]
    async fn test_future_schedule_waits() {
        let h = harness();
        let campaign = active_campaign(&h, 5).await;
        let mut req = request(&campaign.id);
        req.scheduled_date = Some(Utc::now() + chrono::Duration::hours(2));

        let message_id = h.dispatcher.schedule_dm(req).await.unwrap();

        let message = h.store.get_message(&message_id).await.unwrap().unwrap();
        assert_eq!(message.status, MessageStatus::Scheduled);
        assert_eq!(h.adapter.dm_calls(), 0);
    }

    #[tokio::test]
    async fn test_send_is_idempotent_on_sent() {
        let h = harness();
        let campaign = active_campaign(&h, 5).await;
        let message_id = h.dispatcher.schedule_dm(request(&campaign.id)).await.unwrap();
        assert_eq!(h.adapter.dm_calls(), 1);

        // Second send: true, but the adapter is not invoked again
        assert!(h.dispatcher.send_dm(&message_id).await);
        assert_eq!(h.adapter.dm_calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_message_refuses_resend() {
        let h = harness();
        let campaign = active_campaign(&h, 5).await;
        h.adapter.queue_dm(Ok(DmDelivery::failed("blocked by platform")));

        let message_id = h.dispatcher.schedule_dm(request(&campaign.id)).await.unwrap();
        let message = h.store.get_message(&message_id).await.unwrap().unwrap();
        assert_eq!(message.status, MessageStatus::Failed);
        assert_eq!(message.error.as_deref(), Some("blocked by platform"));

        // Resend refused without another adapter call
        assert!(!h.dispatcher.send_dm(&message_id).await);
        assert_eq!(h.adapter.dm_calls(), 1);
        // Failed deliveries don't count as sent
        let campaign = h.store.get_campaign(&campaign.id).await.unwrap().unwrap();
        assert_eq!(campaign.sent_messages, 0);
    }

    #[tokio::test]
    async fn test_adapter_error_marks_failed() {
        let h = harness();
        let campaign = active_campaign(&h, 5).await;
        h.adapter
            .queue_dm(Err(EngineError::Adapter("socket hangup".into())));

        let message_id = h.dispatcher.schedule_dm(request(&campaign.id)).await.unwrap();
        let message = h.store.get_message(&message_id).await.unwrap().unwrap();
        assert_eq!(message.status, MessageStatus::Failed);
        assert!(message.error.unwrap().contains("socket hangup"));
    }

    #[tokio::test]
    async fn test_rate_limit_blocks_after_throttle() {
        let h = harness();
        let campaign = active_campaign(&h, 2).await;

        assert!(h.dispatcher.schedule_dm(request(&campaign.id)).await.is_some());
        assert!(h.dispatcher.schedule_dm(request(&campaign.id)).await.is_some());
        // Third message is created but its send is gated
        let third = h.dispatcher.schedule_dm(request(&campaign.id)).await.unwrap();

        let message = h.store.get_message(&third).await.unwrap().unwrap();
        assert_ne!(message.status, MessageStatus::Sent);
        assert_eq!(h.adapter.dm_calls(), 2);
    }

    #[tokio::test]
    async fn test_record_event_idempotent_and_counted() {
        let h = harness();
        let campaign = active_campaign(&h, 5).await;
        let message_id = h.dispatcher.schedule_dm(request(&campaign.id)).await.unwrap();

        h.dispatcher
            .record_event(&message_id, EngagementEvent::Open)
            .await
            .unwrap();
        h.dispatcher
            .record_event(&message_id, EngagementEvent::Open)
            .await
            .unwrap();
        h.dispatcher
            .record_event(&message_id, EngagementEvent::Response)
            .await
            .unwrap();

        let message = h.store.get_message(&message_id).await.unwrap().unwrap();
        assert!(message.opened_at.is_some());
        assert_eq!(message.status, MessageStatus::Responded);

        let metrics = h.store.metrics(&campaign.id, "ig-main").await.unwrap();
        // Second open was a no-op
        assert_eq!(metrics.opens, 1);
        assert_eq!(metrics.responses, 1);
        assert_eq!(metrics.conversions, 0);

        let err = h
            .dispatcher
            .record_event("missing", EngagementEvent::Open)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}
