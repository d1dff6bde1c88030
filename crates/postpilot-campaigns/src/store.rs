//! Campaign-store contract — persistence seam for campaigns, messages,
//! and per-(campaign, platform) engagement metrics.

use async_trait::async_trait;
use postpilot_core::{EngineError, Result};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::model::{DmCampaign, DmMessage, EngagementEvent};

/// Engagement counters for one (campaign, platform) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CampaignMetrics {
    pub opens: u64,
    pub responses: u64,
    pub conversions: u64,
}

/// Persistence contract for the DM dispatcher.
#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn insert_campaign(&self, campaign: &DmCampaign) -> Result<()>;
    async fn get_campaign(&self, id: &str) -> Result<Option<DmCampaign>>;
    async fn update_campaign(&self, campaign: &DmCampaign) -> Result<()>;

    async fn insert_message(&self, message: &DmMessage) -> Result<()>;
    async fn get_message(&self, id: &str) -> Result<Option<DmMessage>>;
    async fn update_message(&self, message: &DmMessage) -> Result<()>;

    /// Bump a campaign's delivered-message counter by one.
    async fn increment_sent(&self, campaign_id: &str) -> Result<()>;

    /// Bump one engagement counter for a (campaign, platform) pair.
    async fn bump_metric(
        &self,
        campaign_id: &str,
        platform_id: &str,
        event: EngagementEvent,
    ) -> Result<()>;

    /// Read engagement counters (zeroes when nothing recorded yet).
    async fn metrics(&self, campaign_id: &str, platform_id: &str) -> Result<CampaignMetrics>;
}

/// In-memory store for tests.
pub struct MemoryCampaignStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    campaigns: HashMap<String, DmCampaign>,
    messages: HashMap<String, DmMessage>,
    metrics: HashMap<(String, String), CampaignMetrics>,
}

impl MemoryCampaignStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryInner::default()),
        }
    }
}

impl Default for MemoryCampaignStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CampaignStore for MemoryCampaignStore {
    async fn insert_campaign(&self, campaign: &DmCampaign) -> Result<()> {
        self.inner
            .lock()
            .await
            .campaigns
            .insert(campaign.id.clone(), campaign.clone());
        Ok(())
    }

    async fn get_campaign(&self, id: &str) -> Result<Option<DmCampaign>> {
        Ok(self.inner.lock().await.campaigns.get(id).cloned())
    }

    async fn update_campaign(&self, campaign: &DmCampaign) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !inner.campaigns.contains_key(&campaign.id) {
            return Err(EngineError::Store(format!(
                "unknown campaign {}",
                campaign.id
            )));
        }
        inner.campaigns.insert(campaign.id.clone(), campaign.clone());
        Ok(())
    }

    async fn insert_message(&self, message: &DmMessage) -> Result<()> {
        self.inner
            .lock()
            .await
            .messages
            .insert(message.id.clone(), message.clone());
        Ok(())
    }

    async fn get_message(&self, id: &str) -> Result<Option<DmMessage>> {
        Ok(self.inner.lock().await.messages.get(id).cloned())
    }

    async fn update_message(&self, message: &DmMessage) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !inner.messages.contains_key(&message.id) {
            return Err(EngineError::Store(format!("unknown message {}", message.id)));
        }
        inner.messages.insert(message.id.clone(), message.clone());
        Ok(())
    }

    async fn increment_sent(&self, campaign_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let campaign = inner
            .campaigns
            .get_mut(campaign_id)
            .ok_or_else(|| EngineError::Store(format!("unknown campaign {campaign_id}")))?;
        campaign.sent_messages += 1;
        Ok(())
    }

    async fn bump_metric(
        &self,
        campaign_id: &str,
        platform_id: &str,
        event: EngagementEvent,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let metrics = inner
            .metrics
            .entry((campaign_id.to_string(), platform_id.to_string()))
            .or_default();
        match event {
            EngagementEvent::Open => metrics.opens += 1,
            EngagementEvent::Response => metrics.responses += 1,
            EngagementEvent::Conversion => metrics.conversions += 1,
        }
        Ok(())
    }

    async fn metrics(&self, campaign_id: &str, platform_id: &str) -> Result<CampaignMetrics> {
        Ok(self
            .inner
            .lock()
            .await
            .metrics
            .get(&(campaign_id.to_string(), platform_id.to_string()))
            .copied()
            .unwrap_or_default())
    }
}
