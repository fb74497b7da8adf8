//! Periodic enqueueing of the verification sweep.

use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::jobs::{DailyVerificationPayload, Job};

use super::Producer;

pub(crate) struct Scheduler {
    producer: Producer,
    every: Duration,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub(crate) fn new(producer: Producer, every: Duration, shutdown: CancellationToken) -> Self {
        Self {
            producer,
            every,
            shutdown,
        }
    }

    /// Enqueues one sweep immediately, then one per tick, until shutdown.
    pub(crate) async fn run(self) {
        info!(every = ?self.every, "scheduling daily verification");

        // The first tick of an interval completes immediately.
        let mut ticker = tokio::time::interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let job = Job::DailyVerification(DailyVerificationPayload {
                executed_at: Utc::now(),
            });
            if let Err(e) = self.producer.push(&job).await {
                warn!(error = %e, "failed to enqueue daily verification");
            }
        }

        debug!("verification scheduler stopped");
    }
}
