//! Runs the task queue against a local store with in-memory collaborators.
//!
//! ```text
//! cargo run --example worker [config.json]
//! RUST_LOG=crucible=debug cargo run --example worker
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use crucible::handlers::Stores;
use crucible::store::memory::{
    MemoryAudits, MemoryMaterials, MemoryMissions, MemoryTransmutations,
};
use crucible::store::{Material, Transmutation};
use crucible::{Dispatcher, QueueConfig, TaskQueue};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => QueueConfig::load(path)?,
        None => QueueConfig::default(),
    };

    let transmutations = Arc::new(MemoryTransmutations::new());
    let materials = Arc::new(MemoryMaterials::new());
    let audits = Arc::new(MemoryAudits::new());

    transmutations
        .insert(Transmutation::pending(1, "lead->gold", Utc::now()))
        .await;
    materials
        .insert(Material {
            id: 1,
            name: "philosopher's stone".into(),
            category: "catalyst".into(),
            quantity: 1.0,
        })
        .await;

    let stores = Stores {
        transmutations: transmutations.clone(),
        missions: Arc::new(MemoryMissions::new()),
        materials,
        audits: audits.clone(),
    };

    let queue = Arc::new(
        TaskQueue::from_config(&config, stores).work_duration(Duration::from_secs(1)),
    );
    queue.start().await?;
    queue.schedule_daily_verification()?;

    // HTTP handlers would hold this instead of the concrete queue.
    let dispatcher: Arc<dyn Dispatcher> = queue.clone();
    dispatcher
        .enqueue_transmutation_processing(1, "alchemist@example.com")
        .await?;
    dispatcher
        .enqueue_audit("create", "material", 1, "alchemist@example.com", "stocked catalyst")
        .await?;

    println!("Worker running against {}; press Ctrl-C to stop", config.redis_address);
    tokio::signal::ctrl_c().await?;

    queue.stop();
    for entry in audits.entries().await {
        println!(
            "{} {} #{} by {}: {}",
            entry.action, entry.entity, entry.entity_id, entry.user_email, entry.details
        );
    }
    Ok(())
}
