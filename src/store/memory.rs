//! In-memory collaborators backed by `tokio::sync::RwLock`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{
    AuditEntry, AuditStore, Material, MaterialStore, Mission, MissionStore, StoreResult,
    Transmutation, TransmutationStatus, TransmutationStore,
};

#[derive(Debug, Default)]
pub struct MemoryTransmutations {
    rows: RwLock<BTreeMap<u64, Transmutation>>,
    saves: RwLock<usize>,
}

impl MemoryTransmutations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a row without counting it as a save.
    pub async fn insert(&self, transmutation: Transmutation) {
        self.rows.write().await.insert(transmutation.id, transmutation);
    }

    pub async fn get(&self, id: u64) -> Option<Transmutation> {
        self.rows.read().await.get(&id).cloned()
    }

    /// Number of times [`TransmutationStore::save`] has been called.
    pub async fn save_count(&self) -> usize {
        *self.saves.read().await
    }
}

#[async_trait]
impl TransmutationStore for MemoryTransmutations {
    async fn find_by_id(&self, id: u64) -> StoreResult<Option<Transmutation>> {
        Ok(self.get(id).await)
    }

    async fn save(&self, transmutation: &Transmutation) -> StoreResult<()> {
        self.insert(transmutation.clone()).await;
        *self.saves.write().await += 1;
        Ok(())
    }

    async fn find_pending_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<Transmutation>> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|t| t.status == TransmutationStatus::Pending && t.created_at < cutoff)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct MemoryMissions {
    rows: RwLock<Vec<Mission>>,
}

impl MemoryMissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, mission: Mission) {
        self.rows.write().await.push(mission);
    }
}

#[async_trait]
impl MissionStore for MemoryMissions {
    async fn find_open_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Mission>> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|m| m.is_open() && m.updated_at < cutoff)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct MemoryMaterials {
    rows: RwLock<Vec<Material>>,
}

impl MemoryMaterials {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, material: Material) {
        self.rows.write().await.push(material);
    }
}

#[async_trait]
impl MaterialStore for MemoryMaterials {
    async fn find_at_or_below(&self, threshold: f64) -> StoreResult<Vec<Material>> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|m| m.quantity <= threshold)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct MemoryAudits {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryAudits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything saved so far, oldest first.
    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl AuditStore for MemoryAudits {
    async fn save(&self, entry: AuditEntry) -> StoreResult<()> {
        self.entries.write().await.push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::store::MissionStatus;

    #[tokio::test]
    async fn pending_filter_respects_status_and_age() {
        let store = MemoryTransmutations::new();
        let now = Utc::now();
        store
            .insert(Transmutation::pending(1, "lead->gold", now - Duration::hours(48)))
            .await;
        store.insert(Transmutation::pending(2, "salt->water", now)).await;
        let mut done = Transmutation::pending(3, "iron->silver", now - Duration::hours(48));
        done.status = TransmutationStatus::Completed;
        store.insert(done).await;

        let found = store
            .find_pending_older_than(now - Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(found.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1]);
        assert_eq!(store.save_count().await, 0);
    }

    #[tokio::test]
    async fn open_missions_exclude_completed() {
        let store = MemoryMissions::new();
        let old = Utc::now() - Duration::days(3);
        for (id, status) in [(1, MissionStatus::Pending), (2, MissionStatus::Completed)] {
            store
                .insert(Mission {
                    id,
                    title: format!("mission {id}"),
                    status,
                    assigned_to: 9,
                    updated_at: old,
                })
                .await;
        }
        let found = store.find_open_older_than(Utc::now()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, 1);
    }

    #[tokio::test]
    async fn scarce_materials_are_inclusive() {
        let store = MemoryMaterials::new();
        for (id, quantity) in [(1, 5.0), (2, 5.5), (3, 0.0)] {
            store
                .insert(Material {
                    id,
                    name: format!("m{id}"),
                    category: "mineral".into(),
                    quantity,
                })
                .await;
        }
        let found = store.find_at_or_below(5.0).await.unwrap();
        assert_eq!(found.iter().map(|m| m.id).collect::<Vec<_>>(), vec![1, 3]);
    }
}
