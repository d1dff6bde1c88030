//! # PostPilot Scheduler
//!
//! The scheduled-task execution core: a polling loop that claims due tasks
//! from persistent storage, enforces per-task execution windows, bounds
//! concurrency with an in-memory in-flight set, retries thrown adapter
//! failures with bookkeeping, and dispatches to per-platform execution
//! adapters.
//!
//! ## Architecture
//! ```text
//! SchedulerEngine (tokio interval)
//!   ├── poll tick: skip if at capacity, else claim due PENDING tasks
//!   │     (oldest scheduled_at first, up to max_concurrent - in_flight)
//!   ├── per task: window check → IN_PROGRESS → adapter.execute_task
//!   │     ├── Ok(success)        → COMPLETED
//!   │     ├── Ok(failure report) → FAILED (terminal, no retry)
//!   │     └── Err(..)            → retry: PENDING again, or FAILED
//!   │                              once retries are exhausted
//!   └── every transition → EventBus (broadcast + bounded history)
//! ```
//!
//! Single-process by design: the in-flight set is the only double-claim
//! guard, so running two engine processes against one store can execute a
//! task twice. See `SchedulerEngine` docs.

pub mod engine;
pub mod events;
pub mod persistence;
pub mod store;
pub mod task;

pub use engine::SchedulerEngine;
pub use events::{EventBus, SchedulerEvent};
pub use persistence::SqliteTaskStore;
pub use store::{MemoryTaskStore, TaskStore};
pub use task::{NewTask, ScheduledTask, TaskStatus};
