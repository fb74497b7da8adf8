//! The single consumer loop.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::QueueClient;
use crate::handlers::JobHandlers;
use crate::jobs::Job;

use super::QUEUE_KEY;

/// Pops jobs one at a time and runs them to completion before popping the next.
pub(crate) struct Worker {
    client: QueueClient,
    handlers: JobHandlers,
    retry_delay: Duration,
    shutdown: CancellationToken,
}

impl Worker {
    pub(crate) fn new(
        client: QueueClient,
        handlers: JobHandlers,
        retry_delay: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            client,
            handlers,
            retry_delay,
            shutdown,
        }
    }

    /// Runs until the shutdown token fires.
    pub(crate) async fn run(self) {
        info!(queue = QUEUE_KEY, "worker started");

        loop {
            let raw = match self.client.brpop(QUEUE_KEY, &self.shutdown).await {
                Ok(raw) => raw,
                Err(e) if e.is_cancelled() => break,
                Err(e) => {
                    warn!(error = %e, retry_in = ?self.retry_delay, "failed to read from queue");
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.retry_delay) => continue,
                    }
                }
            };

            self.process(&raw).await;
        }

        info!(queue = QUEUE_KEY, "worker stopped");
    }

    /// Decodes and handles one popped envelope. Failures are logged and the
    /// job is dropped.
    async fn process(&self, raw: &[u8]) {
        let job = match Job::from_slice(raw) {
            Ok(job) => job,
            Err(e) => {
                warn!(error = %e, bytes = raw.len(), "dropping undecodable job");
                return;
            }
        };

        let kind = job.kind();
        debug!(%kind, "dispatching job");
        match self.handlers.handle(job).await {
            Ok(()) => debug!(%kind, "job finished"),
            Err(e) => error!(%kind, error = %e, "job failed, dropping"),
        }
    }
}
