//! # PostPilot Campaigns
//!
//! Automated DM campaigns built on the same execution model as the
//! scheduler: a campaign carries a message template and a per-hour
//! throttle; the dispatcher personalizes each message through the
//! template engine, gates it on the rate limiter, forwards it to the
//! platform adapter's direct-message capability, and records delivery and
//! engagement per message.
//!
//! ## Architecture
//! ```text
//! schedule_dm(campaign, target)
//!   ├── campaign missing / not ACTIVE → log, drop
//!   ├── create DmMessage (SCHEDULED if in the future, else PENDING)
//!   └── immediate sends → send_dm
//!        ├── SENT already → idempotent no-op
//!        ├── FAILED → refuse (explicit reset required)
//!        ├── merge personalization (campaign base ← message override)
//!        ├── render template, rate-limit gate
//!        └── adapter.send_direct_message → SENT / FAILED
//! record_event(open|response|conversion)
//!   └── set timestamp once, bump (campaign, platform) metrics
//! ```

pub mod dispatcher;
pub mod model;
pub mod persistence;
pub mod ratelimit;
pub mod store;
pub mod template;

pub use dispatcher::{DmDispatcher, DmRequest};
pub use model::{
    CampaignStatus, DmCampaign, DmMessage, DmTarget, EngagementEvent, MessageStatus,
};
pub use persistence::SqliteCampaignStore;
pub use ratelimit::RateLimiter;
pub use store::{CampaignMetrics, CampaignStore, MemoryCampaignStore};
