pub mod agent;
pub mod config_cmd;
pub mod onboard;
pub mod tasks;

use std::sync::Arc;

use wardops_config::AppConfig;
use wardops_core::event::EventBus;
use wardops_core::task::Task;
use wardops_store::InMemoryWard;
use wardops_sync::{SyncSettings, TaskSyncEngine};

/// The seeded in-memory ward with a sync engine following it.
pub(crate) struct LiveWard {
    pub ward: Arc<InMemoryWard>,
    pub engine: TaskSyncEngine,
}

impl LiveWard {
    pub fn start(config: &AppConfig, event_bus: Arc<EventBus>) -> Self {
        let ward = Arc::new(InMemoryWard::seeded());
        let engine = TaskSyncEngine::builder(ward.clone())
            .settings(SyncSettings::from_config(&config.sync))
            .event_bus(event_bus)
            .start();
        Self { ward, engine }
    }
}

/// One line per task: status, title, target and progress.
pub(crate) fn format_task(task: &Task) -> String {
    format!(
        "[{:<11}] {:<24} -> {:<10} {:>5.1}%",
        task.status.as_str(),
        task.title,
        task.target_location_id,
        task.progress
    )
}
