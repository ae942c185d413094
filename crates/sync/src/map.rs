//! The client-side task map.
//!
//! Keyed by task id, one full record per id. Only the engine worker holds a
//! `TaskMap`; consumers see cloned snapshots.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use wardops_core::task::Task;

use crate::projection::projected_progress;

/// What [`TaskMap::upsert`] did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Inserted,
    Updated,
    /// Identical to the held record.
    Unchanged,
    /// Older than the held record (status would move backwards).
    Stale,
    /// A terminal record for a task the map never held.
    Ignored,
}

impl Change {
    pub fn is_visible(self) -> bool {
        matches!(self, Change::Inserted | Change::Updated)
    }
}

#[derive(Debug, Default, Clone)]
pub struct TaskMap {
    tasks: HashMap<String, Task>,
}

impl TaskMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `incoming` as the full record for its id.
    ///
    /// Status never regresses: a record ranking below the held one is
    /// dropped, and between two different terminal statuses the first one
    /// wins. While in progress, progress only grows.
    pub fn upsert(&mut self, mut incoming: Task) -> Change {
        if !self.tasks.contains_key(&incoming.id) {
            if incoming.status.is_terminal() {
                return Change::Ignored;
            }
            incoming.progress = incoming.progress.clamp(0.0, 100.0);
            self.tasks.insert(incoming.id.clone(), incoming);
            return Change::Inserted;
        }
        let held = &self.tasks[&incoming.id];

        let (from, to) = (held.status.rank(), incoming.status.rank());
        if to < from || (held.status.is_terminal() && held.status != incoming.status) {
            return Change::Stale;
        }
        if held.status == incoming.status {
            incoming.progress = incoming.progress.max(held.progress);
            if incoming.started_at.is_none() {
                incoming.started_at = held.started_at;
            }
        }
        incoming.progress = incoming.progress.clamp(0.0, 100.0);

        if *held == incoming {
            return Change::Unchanged;
        }
        self.tasks.insert(incoming.id.clone(), incoming);
        Change::Updated
    }

    pub fn remove(&mut self, id: &str) -> Option<Task> {
        self.tasks.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Ids of tasks that are not terminal yet.
    pub fn active_ids(&self) -> impl Iterator<Item = &str> {
        self.tasks
            .values()
            .filter(|t| t.status.is_active())
            .map(|t| t.id.as_str())
    }

    /// Recompute the projected progress of every in-progress task.
    ///
    /// Returns how many records changed. Progress never decreases here.
    pub fn project(&mut self, now: DateTime<Utc>) -> usize {
        let mut changed = 0;
        for task in self.tasks.values_mut() {
            if let Some(projected) = projected_progress(task, now) {
                if projected > task.progress {
                    task.progress = projected;
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Every held record, oldest first.
    pub fn snapshot(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        tasks
    }
}
