//! SQLite-backed campaign store — campaigns, messages, and engagement
//! metrics, one upsert-style table each.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use postpilot_core::{EngineError, Result};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::Mutex;

use crate::model::{CampaignStatus, DmCampaign, DmMessage, DmTarget, EngagementEvent, MessageStatus};
use crate::store::{CampaignMetrics, CampaignStore};

/// SQLite persistence for DM campaigns.
pub struct SqliteCampaignStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteCampaignStore {
    /// Open or create the campaign database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = rusqlite::Connection::open(path)
            .map_err(|e| EngineError::Store(format!("DB open: {e}")))?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| EngineError::Store(format!("DB open: {e}")))?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn migrate(conn: &rusqlite::Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS dm_campaigns (
                id TEXT PRIMARY KEY,
                platform_id TEXT NOT NULL,
                message_template TEXT NOT NULL,
                personalization TEXT NOT NULL DEFAULT '{}',  -- JSON map
                throttle_rate INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'draft',
                sent_messages INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS dm_messages (
                id TEXT PRIMARY KEY,
                campaign_id TEXT NOT NULL,
                content TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                target TEXT NOT NULL,                        -- JSON recipient
                personalization TEXT NOT NULL DEFAULT '{}',  -- JSON map
                scheduled_date TEXT,
                sent_at TEXT,
                opened_at TEXT,
                responded_at TEXT,
                converted_at TEXT,
                platform_message_id TEXT,
                error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (campaign_id) REFERENCES dm_campaigns(id)
            );

            CREATE INDEX IF NOT EXISTS idx_messages_campaign
                ON dm_messages (campaign_id, status);

            CREATE TABLE IF NOT EXISTS campaign_metrics (
                campaign_id TEXT NOT NULL,
                platform_id TEXT NOT NULL,
                opens INTEGER NOT NULL DEFAULT 0,
                responses INTEGER NOT NULL DEFAULT 0,
                conversions INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (campaign_id, platform_id)
            );
         ",
        )
        .map_err(|e| EngineError::Store(format!("Migration: {e}")))?;
        Ok(())
    }

    fn row_to_campaign(row: &rusqlite::Row<'_>) -> rusqlite::Result<DmCampaign> {
        let personalization_str: String = row.get(3)?;
        let status_str: String = row.get(5)?;
        Ok(DmCampaign {
            id: row.get(0)?,
            platform_id: row.get(1)?,
            message_template: row.get(2)?,
            personalization: serde_json::from_str(&personalization_str).unwrap_or_default(),
            throttle_rate: row.get(4)?,
            status: CampaignStatus::parse(&status_str),
            sent_messages: row.get::<_, i64>(6)? as u64,
            created_at: parse_ts(&row.get::<_, String>(7)?),
            updated_at: parse_ts(&row.get::<_, String>(8)?),
        })
    }

    fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<DmMessage> {
        let status_str: String = row.get(3)?;
        let target_str: String = row.get(4)?;
        let personalization_str: String = row.get(5)?;
        Ok(DmMessage {
            id: row.get(0)?,
            campaign_id: row.get(1)?,
            content: row.get(2)?,
            status: MessageStatus::parse(&status_str),
            target: serde_json::from_str(&target_str).unwrap_or(DmTarget {
                user_id: String::new(),
                username: String::new(),
            }),
            personalization: serde_json::from_str::<HashMap<String, String>>(&personalization_str)
                .unwrap_or_default(),
            scheduled_date: row.get::<_, Option<String>>(6)?.map(|s| parse_ts(&s)),
            sent_at: row.get::<_, Option<String>>(7)?.map(|s| parse_ts(&s)),
            opened_at: row.get::<_, Option<String>>(8)?.map(|s| parse_ts(&s)),
            responded_at: row.get::<_, Option<String>>(9)?.map(|s| parse_ts(&s)),
            converted_at: row.get::<_, Option<String>>(10)?.map(|s| parse_ts(&s)),
            platform_message_id: row.get(11)?,
            error: row.get(12)?,
            created_at: parse_ts(&row.get::<_, String>(13)?),
            updated_at: parse_ts(&row.get::<_, String>(14)?),
        })
    }
}

const MESSAGE_COLUMNS: &str = "id, campaign_id, content, status, target, personalization, \
                               scheduled_date, sent_at, opened_at, responded_at, converted_at, \
                               platform_message_id, error, created_at, updated_at";

fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn map_to_json(map: &HashMap<String, String>) -> String {
    serde_json::to_string(map).unwrap_or_else(|_| "{}".to_string())
}

#[async_trait]
impl CampaignStore for SqliteCampaignStore {
    async fn insert_campaign(&self, campaign: &DmCampaign) -> Result<()> {
        self.update_campaign(campaign).await
    }

    async fn get_campaign(&self, id: &str) -> Result<Option<DmCampaign>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT id, platform_id, message_template, personalization, throttle_rate,
                        status, sent_messages, created_at, updated_at
                 FROM dm_campaigns WHERE id = ?1",
            )
            .map_err(|e| EngineError::Store(format!("Get campaign: {e}")))?;
        let mut rows = stmt
            .query_map([id], Self::row_to_campaign)
            .map_err(|e| EngineError::Store(format!("Get campaign: {e}")))?;
        match rows.next() {
            Some(Ok(campaign)) => Ok(Some(campaign)),
            Some(Err(e)) => Err(EngineError::Store(format!("Get campaign: {e}"))),
            None => Ok(None),
        }
    }

    async fn update_campaign(&self, campaign: &DmCampaign) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO dm_campaigns
             (id, platform_id, message_template, personalization, throttle_rate,
              status, sent_messages, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                campaign.id,
                campaign.platform_id,
                campaign.message_template,
                map_to_json(&campaign.personalization),
                campaign.throttle_rate,
                campaign.status.as_str(),
                campaign.sent_messages as i64,
                ts(campaign.created_at),
                ts(campaign.updated_at),
            ],
        )
        .map_err(|e| EngineError::Store(format!("Save campaign: {e}")))?;
        Ok(())
    }

    async fn insert_message(&self, message: &DmMessage) -> Result<()> {
        self.update_message(message).await
    }

    async fn get_message(&self, id: &str) -> Result<Option<DmMessage>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM dm_messages WHERE id = ?1"
            ))
            .map_err(|e| EngineError::Store(format!("Get message: {e}")))?;
        let mut rows = stmt
            .query_map([id], Self::row_to_message)
            .map_err(|e| EngineError::Store(format!("Get message: {e}")))?;
        match rows.next() {
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(e)) => Err(EngineError::Store(format!("Get message: {e}"))),
            None => Ok(None),
        }
    }

    async fn update_message(&self, message: &DmMessage) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO dm_messages ({MESSAGE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
            ),
            rusqlite::params![
                message.id,
                message.campaign_id,
                message.content,
                message.status.as_str(),
                serde_json::to_string(&message.target)
                    .unwrap_or_else(|_| "{}".to_string()),
                map_to_json(&message.personalization),
                message.scheduled_date.map(ts),
                message.sent_at.map(ts),
                message.opened_at.map(ts),
                message.responded_at.map(ts),
                message.converted_at.map(ts),
                message.platform_message_id,
                message.error,
                ts(message.created_at),
                ts(message.updated_at),
            ],
        )
        .map_err(|e| EngineError::Store(format!("Save message: {e}")))?;
        Ok(())
    }

    async fn increment_sent(&self, campaign_id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        let changed = conn
            .execute(
                "UPDATE dm_campaigns SET sent_messages = sent_messages + 1, updated_at = ?1
                 WHERE id = ?2",
                rusqlite::params![ts(Utc::now()), campaign_id],
            )
            .map_err(|e| EngineError::Store(format!("Increment sent: {e}")))?;
        if changed == 0 {
            return Err(EngineError::Store(format!("unknown campaign {campaign_id}")));
        }
        Ok(())
    }

    async fn bump_metric(
        &self,
        campaign_id: &str,
        platform_id: &str,
        event: EngagementEvent,
    ) -> Result<()> {
        let column = match event {
            EngagementEvent::Open => "opens",
            EngagementEvent::Response => "responses",
            EngagementEvent::Conversion => "conversions",
        };
        let conn = self.conn.lock().await;
        conn.execute(
            &format!(
                "INSERT INTO campaign_metrics (campaign_id, platform_id, {column})
                 VALUES (?1, ?2, 1)
                 ON CONFLICT (campaign_id, platform_id)
                 DO UPDATE SET {column} = {column} + 1"
            ),
            rusqlite::params![campaign_id, platform_id],
        )
        .map_err(|e| EngineError::Store(format!("Bump metric: {e}")))?;
        Ok(())
    }

    async fn metrics(&self, campaign_id: &str, platform_id: &str) -> Result<CampaignMetrics> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT opens, responses, conversions FROM campaign_metrics
                 WHERE campaign_id = ?1 AND platform_id = ?2",
            )
            .map_err(|e| EngineError::Store(format!("Read metrics: {e}")))?;
        let mut rows = stmt
            .query_map([campaign_id, platform_id], |row| {
                Ok(CampaignMetrics {
                    opens: row.get::<_, i64>(0)? as u64,
                    responses: row.get::<_, i64>(1)? as u64,
                    conversions: row.get::<_, i64>(2)? as u64,
                })
            })
            .map_err(|e| EngineError::Store(format!("Read metrics: {e}")))?;
        match rows.next() {
            Some(Ok(metrics)) => Ok(metrics),
            Some(Err(e)) => Err(EngineError::Store(format!("Read metrics: {e}"))),
            None => Ok(CampaignMetrics::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campaign() -> DmCampaign {
        let mut campaign = DmCampaign::new("ig-main", "Hi {{firstName}}!", 10);
        campaign.status = CampaignStatus::Active;
        campaign
            .personalization
            .insert("brand".into(), "PostPilot".into());
        campaign
    }

    #[tokio::test]
    async fn test_campaign_round_trip() {
        let store = SqliteCampaignStore::open_in_memory().unwrap();
        let campaign = campaign();
        store.insert_campaign(&campaign).await.unwrap();

        let loaded = store.get_campaign(&campaign.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, CampaignStatus::Active);
        assert_eq!(loaded.personalization["brand"], "PostPilot");
        assert_eq!(loaded.throttle_rate, 10);
    }

    #[tokio::test]
    async fn test_message_round_trip() {
        let store = SqliteCampaignStore::open_in_memory().unwrap();
        let campaign = campaign();
        store.insert_campaign(&campaign).await.unwrap();
        let message = DmMessage::new(
            &campaign,
            DmTarget {
                user_id: "u42".into(),
                username: "creator_jane".into(),
            },
            HashMap::from([("firstName".into(), "Jane".into())]),
            None,
            MessageStatus::Pending,
        );
        store.insert_message(&message).await.unwrap();

        let loaded = store.get_message(&message.id).await.unwrap().unwrap();
        assert_eq!(loaded.target.username, "creator_jane");
        assert_eq!(loaded.personalization["firstName"], "Jane");
        assert_eq!(loaded.status, MessageStatus::Pending);
    }

    #[tokio::test]
    async fn test_increment_sent() {
        let store = SqliteCampaignStore::open_in_memory().unwrap();
        let campaign = campaign();
        store.insert_campaign(&campaign).await.unwrap();
        store.increment_sent(&campaign.id).await.unwrap();
        store.increment_sent(&campaign.id).await.unwrap();

        let loaded = store.get_campaign(&campaign.id).await.unwrap().unwrap();
        assert_eq!(loaded.sent_messages, 2);

        assert!(store.increment_sent("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_metrics_upsert() {
        let store = SqliteCampaignStore::open_in_memory().unwrap();
        store
            .bump_metric("c1", "p1", EngagementEvent::Open)
            .await
            .unwrap();
        store
            .bump_metric("c1", "p1", EngagementEvent::Open)
            .await
            .unwrap();
        store
            .bump_metric("c1", "p1", EngagementEvent::Conversion)
            .await
            .unwrap();

        let metrics = store.metrics("c1", "p1").await.unwrap();
        assert_eq!(metrics.opens, 2);
        assert_eq!(metrics.responses, 0);
        assert_eq!(metrics.conversions, 1);

        // Unknown pair reads back as zeroes
        assert_eq!(
            store.metrics("c1", "p2").await.unwrap(),
            CampaignMetrics::default()
        );
    }
}
