//! Send-rate limiter — rolling-hour counter per (campaign, platform).
//!
//! Process-local state only: correct under the engine's single-writer
//! deployment assumption, and no further. Running two dispatcher
//! processes doubles the effective throttle.
//!
//! `check` never mutates — a window that has aged out is only actually
//! reset by the next `record`.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

struct Window {
    last_sent: DateTime<Utc>,
    count: u32,
}

/// Per-(campaign, platform) sliding-hour send counter.
pub struct RateLimiter {
    windows: Mutex<HashMap<(String, String), Window>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// May another message be sent right now? `true` when no sends are
    /// recorded yet, when the window has aged past an hour, or while the
    /// counter is under `throttle_rate`.
    pub async fn check(
        &self,
        campaign_id: &str,
        platform_id: &str,
        throttle_rate: u32,
        now: DateTime<Utc>,
    ) -> bool {
        let windows = self.windows.lock().await;
        match windows.get(&(campaign_id.to_string(), platform_id.to_string())) {
            None => true,
            Some(window) if now - window.last_sent > Duration::hours(1) => true,
            Some(window) => window.count < throttle_rate,
        }
    }

    /// Record a send: bump the counter inside the rolling window, or start
    /// a fresh window at 1.
    pub async fn record(&self, campaign_id: &str, platform_id: &str, now: DateTime<Utc>) {
        let mut windows = self.windows.lock().await;
        let entry = windows
            .entry((campaign_id.to_string(), platform_id.to_string()))
            .or_insert(Window {
                last_sent: now,
                count: 0,
            });
        if now - entry.last_sent > Duration::hours(1) {
            entry.count = 1;
        } else {
            entry.count += 1;
        }
        entry.last_sent = now;
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
