//! # crucible
//!
//! Async background jobs for the alchemy backend, carried over a queue store
//! through a from-scratch RESP client.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use crucible::{QueueConfig, TaskQueue};
//! use crucible::handlers::Stores;
//! use crucible::store::memory::{
//!     MemoryAudits, MemoryMaterials, MemoryMissions, MemoryTransmutations,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stores = Stores {
//!         transmutations: Arc::new(MemoryTransmutations::new()),
//!         missions: Arc::new(MemoryMissions::new()),
//!         materials: Arc::new(MemoryMaterials::new()),
//!         audits: Arc::new(MemoryAudits::new()),
//!     };
//!     let queue = Arc::new(TaskQueue::from_config(&QueueConfig::default(), stores));
//!     queue.start().await?;
//!     queue.schedule_daily_verification()?;
//!     queue.enqueue_process_transmutation(1, "alchemist@example.com").await?;
//!     Ok(())
//! }
//! ```

pub mod background;
pub mod client;
pub mod config;
pub mod handlers;
pub mod jobs;
pub mod protocol;
pub mod store;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use background::{Dispatcher, Lifecycle, QueueError, TaskQueue, Thresholds};
pub use client::{ClientError, QueueClient};
pub use config::QueueConfig;
pub use jobs::{Job, JobKind};
