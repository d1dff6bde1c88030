//! Campaign and message data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A DM outreach campaign targeting one platform integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DmCampaign {
    pub id: String,
    /// Platform integration this campaign sends through.
    pub platform_id: String,
    /// Message template with `{{variable}}` placeholders.
    pub message_template: String,
    /// Campaign-level personalization defaults. Message-level values win.
    #[serde(default)]
    pub personalization: HashMap<String, String>,
    /// Max sends per hour per (campaign, platform).
    pub throttle_rate: u32,
    pub status: CampaignStatus,
    /// Messages delivered so far.
    pub sent_messages: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Active,
    Paused,
    Completed,
    Draft,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Active => "active",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Completed => "completed",
            CampaignStatus::Draft => "draft",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "active" => CampaignStatus::Active,
            "paused" => CampaignStatus::Paused,
            "completed" => CampaignStatus::Completed,
            _ => CampaignStatus::Draft,
        }
    }
}

impl DmCampaign {
    pub fn new(
        platform_id: impl Into<String>,
        message_template: impl Into<String>,
        throttle_rate: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            platform_id: platform_id.into(),
            message_template: message_template.into(),
            personalization: HashMap::new(),
            throttle_rate,
            status: CampaignStatus::Draft,
            sent_messages: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Who a DM goes to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DmTarget {
    pub user_id: String,
    pub username: String,
}

/// One outreach message inside a campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DmMessage {
    pub id: String,
    pub campaign_id: String,
    /// Rendered body — the raw template at creation, overwritten with the
    /// personalized text at send time.
    pub content: String,
    pub status: MessageStatus,
    pub target: DmTarget,
    /// Message-level personalization overrides.
    #[serde(default)]
    pub personalization: HashMap<String, String>,
    pub scheduled_date: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub responded_at: Option<DateTime<Utc>>,
    pub converted_at: Option<DateTime<Utc>>,
    pub platform_message_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Message delivery/engagement lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Scheduled,
    Sending,
    Sent,
    Failed,
    Responded,
    Converted,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Scheduled => "scheduled",
            MessageStatus::Sending => "sending",
            MessageStatus::Sent => "sent",
            MessageStatus::Failed => "failed",
            MessageStatus::Responded => "responded",
            MessageStatus::Converted => "converted",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "scheduled" => MessageStatus::Scheduled,
            "sending" => MessageStatus::Sending,
            "sent" => MessageStatus::Sent,
            "failed" => MessageStatus::Failed,
            "responded" => MessageStatus::Responded,
            "converted" => MessageStatus::Converted,
            _ => MessageStatus::Pending,
        }
    }
}

/// Engagement events a recipient can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngagementEvent {
    Open,
    Response,
    Conversion,
}

impl EngagementEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementEvent::Open => "open",
            EngagementEvent::Response => "response",
            EngagementEvent::Conversion => "conversion",
        }
    }
}

impl DmMessage {
    /// New message holding the campaign's raw template; the dispatcher
    /// decides `Pending` vs `Scheduled` and triggers immediate sends.
    pub fn new(
        campaign: &DmCampaign,
        target: DmTarget,
        personalization: HashMap<String, String>,
        scheduled_date: Option<DateTime<Utc>>,
        status: MessageStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            campaign_id: campaign.id.clone(),
            content: campaign.message_template.clone(),
            status,
            target,
            personalization,
            scheduled_date,
            sent_at: None,
            opened_at: None,
            responded_at: None,
            converted_at: None,
            platform_message_id: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips() {
        for status in [
            MessageStatus::Pending,
            MessageStatus::Scheduled,
            MessageStatus::Sending,
            MessageStatus::Sent,
            MessageStatus::Failed,
            MessageStatus::Responded,
            MessageStatus::Converted,
        ] {
            assert_eq!(MessageStatus::parse(status.as_str()), status);
        }
        for status in [
            CampaignStatus::Active,
            CampaignStatus::Paused,
            CampaignStatus::Completed,
            CampaignStatus::Draft,
        ] {
            assert_eq!(CampaignStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn test_new_message_carries_raw_template() {
        let campaign = DmCampaign::new("ig-main", "Hi {{firstName}}!", 10);
        let message = DmMessage::new(
            &campaign,
            DmTarget {
                user_id: "u1".into(),
                username: "creator_jane".into(),
            },
            HashMap::new(),
            None,
            MessageStatus::Pending,
        );
        assert_eq!(message.content, "Hi {{firstName}}!");
        assert_eq!(message.campaign_id, campaign.id);
    }
}
