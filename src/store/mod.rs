//! Data collaborators used by the job handlers.
//!
//! Entity persistence lives outside this crate. Handlers only see the narrow
//! async traits below; [`memory`] provides in-process implementations for the
//! demo and the tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;

/// Errors reported by a data collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Processing status of a transmutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransmutationStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transmutation {
    pub id: u64,
    pub alchemist_id: u64,
    pub material_id: u64,
    pub formula: String,
    pub status: TransmutationStatus,
    pub result: String,
    pub created_at: DateTime<Utc>,
}

impl Transmutation {
    /// A freshly requested transmutation, pending and without a result.
    pub fn pending(id: u64, formula: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            alchemist_id: 0,
            material_id: 0,
            formula: formula.into(),
            status: TransmutationStatus::Pending,
            result: String::new(),
            created_at,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TransmutationStatus::Completed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub id: u64,
    pub title: String,
    pub status: MissionStatus,
    /// Alchemist the mission is assigned to.
    pub assigned_to: u64,
    pub updated_at: DateTime<Utc>,
}

impl Mission {
    /// Anything not yet completed counts as open.
    pub fn is_open(&self) -> bool {
        self.status != MissionStatus::Completed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub id: u64,
    pub name: String,
    pub category: String,
    pub quantity: f64,
}

/// One audit log line, as written by the handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action: String,
    pub entity: String,
    pub entity_id: u64,
    pub user_email: String,
    pub details: String,
}

#[async_trait]
pub trait TransmutationStore: Send + Sync {
    async fn find_by_id(&self, id: u64) -> StoreResult<Option<Transmutation>>;
    async fn save(&self, transmutation: &Transmutation) -> StoreResult<()>;
    /// Pending transmutations created strictly before `cutoff`.
    async fn find_pending_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<Transmutation>>;
}

#[async_trait]
pub trait MissionStore: Send + Sync {
    /// Open missions last updated strictly before `cutoff`.
    async fn find_open_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Mission>>;
}

#[async_trait]
pub trait MaterialStore: Send + Sync {
    /// Materials whose quantity is at or below `threshold`.
    async fn find_at_or_below(&self, threshold: f64) -> StoreResult<Vec<Material>>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn save(&self, entry: AuditEntry) -> StoreResult<()>;
}
