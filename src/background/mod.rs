//! Background tasks: a queue-backed job orchestrator.
//!
//! [`TaskQueue`] lets request handlers offload work onto a remote list and
//! runs a single consumer that pops jobs in FIFO order and hands them to
//! [`JobHandlers`](crate::handlers::JobHandlers). A periodic scheduler can
//! enqueue a verification sweep at a fixed interval.
//!
//! ## Delivery
//!
//! Delivery is at-most-once. `BRPOP` removes a job from the store before its
//! handler runs, so a crash mid-job loses it. Jobs whose envelope cannot be
//! decoded or whose handler fails are logged and dropped; there is no retry
//! and no dead-letter list.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use crucible::background::TaskQueue;
//! use crucible::client::QueueClient;
//! use crucible::handlers::Stores;
//! use crucible::store::memory::{
//!     MemoryAudits, MemoryMaterials, MemoryMissions, MemoryTransmutations,
//! };
//!
//! # async fn run() -> Result<(), crucible::background::QueueError> {
//! let stores = Stores {
//!     transmutations: Arc::new(MemoryTransmutations::new()),
//!     missions: Arc::new(MemoryMissions::new()),
//!     materials: Arc::new(MemoryMaterials::new()),
//!     audits: Arc::new(MemoryAudits::new()),
//! };
//! let queue = TaskQueue::new(QueueClient::new("localhost:6379"), stores);
//! queue.start().await?;
//! queue.enqueue_register_audit("create", "material", 7, "a@x.com", "x").await?;
//! queue.stop();
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{ClientError, QueueClient};
use crate::config::QueueConfig;
use crate::handlers::{DEFAULT_WORK_DURATION, JobHandlers, Stores};
use crate::jobs::{
    DailyVerificationPayload, EnvelopeError, Job, ProcessTransmutationPayload, RegisterAuditPayload,
};

mod scheduler;
mod thresholds;
mod worker;

pub use thresholds::{
    DEFAULT_LOW_STOCK, DEFAULT_PENDING_AGE, DEFAULT_VERIFICATION_INTERVAL, Thresholds,
};

use scheduler::Scheduler;
use worker::Worker;

/// The single list every job kind is pushed onto.
pub const QUEUE_KEY: &str = "alchemy:tasks";

/// Pause before the worker retries after a connectivity error.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Errors produced by [`TaskQueue`].
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("task queue has not been started (state: {state})")]
    NotStarted { state: Lifecycle },

    #[error("task queue has been stopped and cannot be restarted")]
    AlreadyStopped,

    #[error("task queue is not available: {0}")]
    Unavailable(#[source] ClientError),

    #[error("failed to push job: {0}")]
    Client(#[from] ClientError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

/// Orchestrator lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Lifecycle {
    NotStarted = 0,
    Running = 1,
    Stopped = 2,
}

impl Lifecycle {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::NotStarted,
            1 => Self::Running,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotStarted => "not started",
            Self::Running => "running",
            Self::Stopped => "stopped",
        })
    }
}

/// The enqueue surface HTTP handlers depend on.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn enqueue_transmutation_processing(
        &self,
        transmutation_id: u64,
        requested_by: &str,
    ) -> Result<(), QueueError>;

    async fn enqueue_audit(
        &self,
        action: &str,
        entity: &str,
        entity_id: u64,
        user_email: &str,
        details: &str,
    ) -> Result<(), QueueError>;
}

/// Serializes jobs and pushes them onto [`QUEUE_KEY`].
#[derive(Debug, Clone)]
pub(crate) struct Producer {
    client: QueueClient,
}

impl Producer {
    pub(crate) async fn push(&self, job: &Job) -> Result<(), QueueError> {
        let raw = job.to_bytes()?;
        self.client.lpush(QUEUE_KEY, &raw).await?;
        debug!(kind = %job.kind(), queue = QUEUE_KEY, "job enqueued");
        Ok(())
    }
}

/// Queue-backed job orchestrator.
///
/// Construct it once at startup, configure it, call [`start`](Self::start),
/// then share it (usually as `Arc<TaskQueue>` or `Arc<dyn Dispatcher>`) with
/// everything that enqueues jobs.
pub struct TaskQueue {
    client: QueueClient,
    stores: Stores,
    thresholds: Thresholds,
    work_duration: Duration,
    retry_delay: Duration,
    state: AtomicU8,
    scheduled: AtomicBool,
    shutdown: CancellationToken,
}

impl TaskQueue {
    /// Creates a stopped-until-started orchestrator with default thresholds.
    pub fn new(client: QueueClient, stores: Stores) -> Self {
        Self {
            client,
            stores,
            thresholds: Thresholds::default(),
            work_duration: DEFAULT_WORK_DURATION,
            retry_delay: DEFAULT_RETRY_DELAY,
            state: AtomicU8::new(Lifecycle::NotStarted as u8),
            scheduled: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    /// Builds an orchestrator from loaded configuration.
    pub fn from_config(config: &QueueConfig, stores: Stores) -> Self {
        let mut queue = Self::new(QueueClient::new(config.redis_address.clone()), stores);
        queue.configure_thresholds(
            config.verification_interval(),
            config.pending_age(),
            config.low_stock_threshold(),
        );
        queue
    }

    /// Overrides the simulated processing time of a transmutation.
    #[must_use]
    pub fn work_duration(mut self, duration: Duration) -> Self {
        self.work_duration = duration;
        self
    }

    /// Overrides the pause between failed pops.
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Overrides thresholds; see [`Thresholds::apply`] for which values count.
    ///
    /// The worker and scheduler take a snapshot when they are spawned, so
    /// configure before [`start`](Self::start).
    pub fn configure_thresholds(
        &mut self,
        verification_interval: Option<Duration>,
        pending_age: Option<Duration>,
        low_stock: Option<f64>,
    ) {
        self.thresholds.apply(verification_interval, pending_age, low_stock);
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn state(&self) -> Lifecycle {
        Lifecycle::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Verifies connectivity and spawns the consumer.
    ///
    /// Calling `start` on a running queue is a no-op.
    ///
    /// # Errors
    ///
    /// - [`QueueError::Unavailable`]: the store did not answer `PING`; no
    ///   worker is spawned and the queue stays not started.
    /// - [`QueueError::AlreadyStopped`]: [`stop`](Self::stop) was called.
    pub async fn start(&self) -> Result<(), QueueError> {
        match self.state() {
            Lifecycle::Running => return Ok(()),
            Lifecycle::Stopped => return Err(QueueError::AlreadyStopped),
            Lifecycle::NotStarted => {}
        }

        self.client.ping().await.map_err(QueueError::Unavailable)?;

        if let Err(current) = self.state.compare_exchange(
            Lifecycle::NotStarted as u8,
            Lifecycle::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            // Lost a race against another start() or a stop().
            return match Lifecycle::from_u8(current) {
                Lifecycle::Stopped => Err(QueueError::AlreadyStopped),
                _ => Ok(()),
            };
        }

        let handlers = JobHandlers::new(self.stores.clone(), self.thresholds)
            .work_duration(self.work_duration);
        let worker = Worker::new(
            self.client.clone(),
            handlers,
            self.retry_delay,
            self.shutdown.clone(),
        );
        tokio::spawn(worker.run());

        info!(address = %self.client.addr(), queue = QUEUE_KEY, "task queue started");
        Ok(())
    }

    /// Signals the worker and scheduler to exit.
    ///
    /// Returns immediately; a job already being handled runs to completion in
    /// the background.
    pub fn stop(&self) {
        let previous =
            Lifecycle::from_u8(self.state.swap(Lifecycle::Stopped as u8, Ordering::AcqRel));
        self.shutdown.cancel();
        if previous != Lifecycle::Stopped {
            info!(previous = %previous, "task queue stopped");
        }
    }

    /// Enqueues a verification sweep now and then once per configured interval.
    ///
    /// Repeated calls do not start additional schedulers.
    pub fn schedule_daily_verification(&self) -> Result<(), QueueError> {
        self.ensure_running()?;
        if self.scheduled.swap(true, Ordering::AcqRel) {
            debug!("daily verification already scheduled");
            return Ok(());
        }

        let scheduler = Scheduler::new(
            self.producer(),
            self.thresholds.verification_interval,
            self.shutdown.clone(),
        );
        tokio::spawn(scheduler.run());
        Ok(())
    }

    /// Enqueues processing of a pending transmutation.
    pub async fn enqueue_process_transmutation(
        &self,
        transmutation_id: u64,
        requested_by: impl Into<String>,
    ) -> Result<(), QueueError> {
        self.enqueue(Job::ProcessTransmutation(ProcessTransmutationPayload {
            transmutation_id,
            requested_by: requested_by.into(),
        }))
        .await
    }

    /// Enqueues an audit entry so the caller does not wait on the write.
    pub async fn enqueue_register_audit(
        &self,
        action: impl Into<String>,
        entity: impl Into<String>,
        entity_id: u64,
        user_email: impl Into<String>,
        details: impl Into<String>,
    ) -> Result<(), QueueError> {
        self.enqueue(Job::RegisterAudit(RegisterAuditPayload {
            action: action.into(),
            entity: entity.into(),
            entity_id,
            user_email: user_email.into(),
            details: details.into(),
        }))
        .await
    }

    /// Enqueues a single verification sweep outside the schedule.
    pub async fn enqueue_daily_verification(&self) -> Result<(), QueueError> {
        self.enqueue(Job::DailyVerification(DailyVerificationPayload {
            executed_at: Utc::now(),
        }))
        .await
    }

    async fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        self.ensure_running()?;
        self.producer().push(&job).await.inspect_err(|e| {
            warn!(kind = %job.kind(), error = %e, "failed to enqueue job");
        })
    }

    fn ensure_running(&self) -> Result<(), QueueError> {
        match self.state() {
            Lifecycle::Running => Ok(()),
            state => Err(QueueError::NotStarted { state }),
        }
    }

    fn producer(&self) -> Producer {
        Producer {
            client: self.client.clone(),
        }
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl Dispatcher for TaskQueue {
    async fn enqueue_transmutation_processing(
        &self,
        transmutation_id: u64,
        requested_by: &str,
    ) -> Result<(), QueueError> {
        self.enqueue_process_transmutation(transmutation_id, requested_by)
            .await
    }

    async fn enqueue_audit(
        &self,
        action: &str,
        entity: &str,
        entity_id: u64,
        user_email: &str,
        details: &str,
    ) -> Result<(), QueueError> {
        self.enqueue_register_audit(action, entity, entity_id, user_email, details)
            .await
    }
}
