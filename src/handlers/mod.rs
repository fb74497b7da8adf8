//! Job bodies.
//!
//! [`JobHandlers`] owns the data collaborators and routes each decoded
//! [`Job`] to the matching body. Handlers never retry; an error here means
//! the job is dropped by the worker.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::background::Thresholds;
use crate::jobs::{DailyVerificationPayload, Job, ProcessTransmutationPayload, RegisterAuditPayload};
use crate::store::{
    AuditEntry, AuditStore, MaterialStore, MissionStore, StoreError, TransmutationStatus,
    TransmutationStore,
};

/// Details written by a verification sweep that found nothing to report.
pub const NOTHING_FOUND: &str = "No critical findings";

/// User recorded on audit entries written by the system itself.
pub const SYSTEM_USER: &str = "system";

/// Simulated duration of a transmutation.
pub const DEFAULT_WORK_DURATION: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("transmutation {0} not found")]
    TransmutationNotFound(u64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The data collaborators every handler may call into.
#[derive(Clone)]
pub struct Stores {
    pub transmutations: Arc<dyn TransmutationStore>,
    pub missions: Arc<dyn MissionStore>,
    pub materials: Arc<dyn MaterialStore>,
    pub audits: Arc<dyn AuditStore>,
}

pub struct JobHandlers {
    stores: Stores,
    thresholds: Thresholds,
    work_duration: Duration,
}

impl JobHandlers {
    pub fn new(stores: Stores, thresholds: Thresholds) -> Self {
        Self {
            stores,
            thresholds,
            work_duration: DEFAULT_WORK_DURATION,
        }
    }

    /// Overrides how long a transmutation takes to process.
    #[must_use]
    pub fn work_duration(mut self, duration: Duration) -> Self {
        self.work_duration = duration;
        self
    }

    /// Runs the body matching the job's kind.
    pub async fn handle(&self, job: Job) -> Result<(), HandlerError> {
        match job {
            Job::ProcessTransmutation(payload) => self.process_transmutation(payload).await,
            Job::RegisterAudit(payload) => self.register_audit(payload).await,
            Job::DailyVerification(payload) => self.daily_verification(&payload).await,
        }
    }

    /// Completes a pending transmutation and audits the outcome.
    ///
    /// Already completed transmutations are left untouched, so a redelivered
    /// job is harmless.
    pub async fn process_transmutation(
        &self,
        payload: ProcessTransmutationPayload,
    ) -> Result<(), HandlerError> {
        let id = payload.transmutation_id;
        let mut transmutation = self
            .stores
            .transmutations
            .find_by_id(id)
            .await?
            .ok_or(HandlerError::TransmutationNotFound(id))?;

        if transmutation.is_completed() {
            debug!(transmutation_id = id, "already completed, skipping");
            return Ok(());
        }

        tokio::time::sleep(self.work_duration).await;

        transmutation.status = TransmutationStatus::Completed;
        transmutation.result = format!("Transmutation {id} processed successfully");
        self.stores.transmutations.save(&transmutation).await?;
        info!(transmutation_id = id, "transmutation processed");

        self.register_audit(RegisterAuditPayload {
            action: "process_transmutation".into(),
            entity: "transmutation".into(),
            entity_id: id,
            user_email: payload.requested_by,
            details: transmutation.result,
        })
        .await
    }

    pub async fn register_audit(&self, payload: RegisterAuditPayload) -> Result<(), HandlerError> {
        self.stores
            .audits
            .save(AuditEntry {
                action: payload.action,
                entity: payload.entity,
                entity_id: payload.entity_id,
                user_email: payload.user_email,
                details: payload.details,
            })
            .await?;
        Ok(())
    }

    /// Counts stale and scarce entities and records a summary audit entry.
    pub async fn daily_verification(
        &self,
        payload: &DailyVerificationPayload,
    ) -> Result<(), HandlerError> {
        let cutoff = cutoff_before(Utc::now(), self.thresholds.pending_age);

        let pending = self.stores.transmutations.find_pending_older_than(cutoff).await?;
        let open = self.stores.missions.find_open_older_than(cutoff).await?;
        let scarce = self
            .stores
            .materials
            .find_at_or_below(self.thresholds.low_stock)
            .await?;

        let details = summarize(pending.len(), open.len(), scarce.len());
        info!(
            scheduled_at = %payload.executed_at,
            pending = pending.len(),
            open = open.len(),
            scarce = scarce.len(),
            "verification sweep finished"
        );

        self.stores
            .audits
            .save(AuditEntry {
                action: "daily_verification".into(),
                entity: "system".into(),
                entity_id: 0,
                user_email: SYSTEM_USER.into(),
                details,
            })
            .await?;
        Ok(())
    }
}

fn cutoff_before(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn summarize(pending: usize, open: usize, scarce: usize) -> String {
    let mut parts = Vec::new();
    if pending > 0 {
        parts.push(format!("{pending} pending transmutations"));
    }
    if open > 0 {
        parts.push(format!("{open} open missions"));
    }
    if scarce > 0 {
        parts.push(format!("{scarce} materials at critical stock"));
    }
    if parts.is_empty() {
        return NOTHING_FOUND.to_owned();
    }
    parts.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{MemoryAudits, MemoryMaterials, MemoryMissions, MemoryTransmutations};
    use crate::store::{Material, Mission, MissionStatus, Transmutation};

    struct Fixture {
        transmutations: Arc<MemoryTransmutations>,
        missions: Arc<MemoryMissions>,
        materials: Arc<MemoryMaterials>,
        audits: Arc<MemoryAudits>,
        handlers: JobHandlers,
    }

    fn fixture() -> Fixture {
        let transmutations = Arc::new(MemoryTransmutations::new());
        let missions = Arc::new(MemoryMissions::new());
        let materials = Arc::new(MemoryMaterials::new());
        let audits = Arc::new(MemoryAudits::new());
        let stores = Stores {
            transmutations: transmutations.clone(),
            missions: missions.clone(),
            materials: materials.clone(),
            audits: audits.clone(),
        };
        let handlers =
            JobHandlers::new(stores, Thresholds::default()).work_duration(Duration::ZERO);
        Fixture {
            transmutations,
            missions,
            materials,
            audits,
            handlers,
        }
    }

    fn process(id: u64) -> Job {
        Job::ProcessTransmutation(ProcessTransmutationPayload {
            transmutation_id: id,
            requested_by: "alchemist@x.com".into(),
        })
    }

    fn verification() -> Job {
        Job::DailyVerification(DailyVerificationPayload {
            executed_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn process_completes_and_audits() {
        let f = fixture();
        f.transmutations
            .insert(Transmutation::pending(4, "lead->gold", Utc::now()))
            .await;

        f.handlers.handle(process(4)).await.unwrap();

        let stored = f.transmutations.get(4).await.unwrap();
        assert!(stored.is_completed());
        assert_eq!(stored.result, "Transmutation 4 processed successfully");

        let audits = f.audits.entries().await;
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].action, "process_transmutation");
        assert_eq!(audits[0].entity, "transmutation");
        assert_eq!(audits[0].entity_id, 4);
        assert_eq!(audits[0].user_email, "alchemist@x.com");
        assert_eq!(audits[0].details, stored.result);
    }

    #[tokio::test]
    async fn process_is_idempotent_once_completed() {
        let f = fixture();
        f.transmutations
            .insert(Transmutation::pending(5, "salt->water", Utc::now()))
            .await;

        f.handlers.handle(process(5)).await.unwrap();
        let saves = f.transmutations.save_count().await;
        let audits = f.audits.entries().await.len();

        f.handlers.handle(process(5)).await.unwrap();
        assert_eq!(f.transmutations.save_count().await, saves);
        assert_eq!(f.audits.entries().await.len(), audits);
    }

    #[tokio::test]
    async fn process_missing_transmutation_fails() {
        let f = fixture();
        let err = f.handlers.handle(process(99)).await.unwrap_err();
        assert!(matches!(err, HandlerError::TransmutationNotFound(99)));
        assert!(f.audits.entries().await.is_empty());
    }

    #[tokio::test]
    async fn register_audit_persists_fields() {
        let f = fixture();
        f.handlers
            .handle(Job::RegisterAudit(RegisterAuditPayload {
                action: "create".into(),
                entity: "material".into(),
                entity_id: 7,
                user_email: "a@x.com".into(),
                details: "x".into(),
            }))
            .await
            .unwrap();

        assert_eq!(
            f.audits.entries().await,
            vec![AuditEntry {
                action: "create".into(),
                entity: "material".into(),
                entity_id: 7,
                user_email: "a@x.com".into(),
                details: "x".into(),
            }]
        );
    }

    #[tokio::test]
    async fn verification_with_nothing_found() {
        let f = fixture();
        f.handlers.handle(verification()).await.unwrap();

        let audits = f.audits.entries().await;
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].details, NOTHING_FOUND);
        assert_eq!(audits[0].action, "daily_verification");
        assert_eq!(audits[0].entity, "system");
        assert_eq!(audits[0].user_email, SYSTEM_USER);
    }

    #[tokio::test]
    async fn verification_reports_counts() {
        let f = fixture();
        let stale = Utc::now() - chrono::Duration::hours(48);
        f.transmutations
            .insert(Transmutation::pending(1, "a", stale))
            .await;
        f.transmutations
            .insert(Transmutation::pending(2, "b", stale))
            .await;
        f.transmutations
            .insert(Transmutation::pending(3, "fresh", Utc::now()))
            .await;
        f.missions
            .insert(Mission {
                id: 1,
                title: "gather herbs".into(),
                status: MissionStatus::InProgress,
                assigned_to: 1,
                updated_at: stale,
            })
            .await;
        f.materials
            .insert(Material {
                id: 1,
                name: "mercury".into(),
                category: "metal".into(),
                quantity: 2.0,
            })
            .await;

        f.handlers.handle(verification()).await.unwrap();

        let audits = f.audits.entries().await;
        assert_eq!(
            audits[0].details,
            "2 pending transmutations; 1 open missions; 1 materials at critical stock"
        );
    }

    #[test]
    fn summary_skips_zero_counts() {
        assert_eq!(summarize(0, 3, 0), "3 open missions");
        assert_eq!(summarize(0, 0, 0), NOTHING_FOUND);
    }

    #[test]
    fn cutoff_saturates_for_huge_ages() {
        let now = Utc::now();
        assert_eq!(cutoff_before(now, Duration::MAX), DateTime::<Utc>::MIN_UTC);
        assert_eq!(
            cutoff_before(now, Duration::from_secs(3600)),
            now - chrono::Duration::hours(1)
        );
    }
}
