//! `wardops tasks`: dispatch demo tasks and watch the live task map.
//!
//! Runs entirely against the seeded in-memory ward, so no API key is needed.

use std::sync::Arc;
use std::time::Duration;

use wardops_config::AppConfig;
use wardops_core::event::{DomainEvent, EventBus};
use wardops_core::task::{NewTask, Priority, TaskKind, TaskStatus};

use super::{LiveWard, format_task};

pub async fn run(seconds: u64) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let event_bus = Arc::new(EventBus::default());
    let mut events = event_bus.subscribe();
    let live = LiveWard::start(&config, event_bus);
    let engine = &live.engine;

    let food = engine
        .create_task(NewTask::new(TaskKind::FoodDelivery, "room-101"))
        .await?;
    let meds = engine
        .create_task(NewTask::new(TaskKind::MedicationDelivery, "room-102").with_priority(Priority::High))
        .await?;
    engine
        .create_task(NewTask::new(TaskKind::Cleaning, "room-105"))
        .await?;

    engine.update_status(&food.id, TaskStatus::InProgress).await?;
    engine.update_status(&meds.id, TaskStatus::InProgress).await?;

    println!();
    println!("  Watching the ward for {seconds}s (source: {})", engine.source());
    println!();

    let mut tick = tokio::time::interval(Duration::from_secs(1));
    for elapsed in 0..=seconds {
        tick.tick().await;

        while let Ok(event) = events.try_recv() {
            if let DomainEvent::SyncSourceChanged { source, .. } = event.as_ref() {
                println!("  ~ sync source is now {source}");
            }
        }

        // medication is handed over early
        if elapsed == 10 {
            engine.update_status(&meds.id, TaskStatus::Completed).await?;
        }

        println!("  t+{elapsed:>3}s");
        for task in engine.tasks() {
            println!("    {}", format_task(&task));
        }
    }

    engine.shutdown();
    println!();
    println!("  {} task(s) still held by the store", live.ward.tasks().await.len());
    Ok(())
}
