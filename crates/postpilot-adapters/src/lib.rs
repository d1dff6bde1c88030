//! # PostPilot Adapters
//!
//! Per-platform execution adapters and the registry the scheduler uses to
//! resolve them. An adapter performs the actual external action (publish a
//! post, deliver a DM, push a price update) for one platform kind; the
//! registry maps platform integration ids onto adapter kinds.
//!
//! Concrete platform integrations live behind the same `ExecutionAdapter`
//! trait. This crate ships the generic HTTP/webhook adapter (good for any
//! platform fronted by an internal relay service) and a scripted mock for
//! tests.

pub mod mock;
pub mod registry;
pub mod webhook;

pub use mock::MockAdapter;
pub use registry::AdapterRegistry;
pub use webhook::{WebhookAdapter, WebhookAdapterConfig};
