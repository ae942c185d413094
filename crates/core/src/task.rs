//! Task domain types. A task is a unit of ward work with a status lifecycle.
//!
//! Status only ever moves forward:
//!
//! ```text
//! pending --start--> in_progress --finish--> completed
//!    \                    \
//!     `----cancel----------`----cancel-----> cancelled
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::error::BackendError;

/// The kinds of ward operation a task can represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    FoodDelivery,
    MedicationDelivery,
    PatientTransport,
    EquipmentDelivery,
    LabSamplePickup,
    Cleaning,
    LinenChange,
    SupplyRestock,
    Maintenance,
    PatientCheck,
}

impl TaskKind {
    pub const ALL: [TaskKind; 10] = [
        TaskKind::FoodDelivery,
        TaskKind::MedicationDelivery,
        TaskKind::PatientTransport,
        TaskKind::EquipmentDelivery,
        TaskKind::LabSamplePickup,
        TaskKind::Cleaning,
        TaskKind::LinenChange,
        TaskKind::SupplyRestock,
        TaskKind::Maintenance,
        TaskKind::PatientCheck,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::FoodDelivery => "food_delivery",
            TaskKind::MedicationDelivery => "medication_delivery",
            TaskKind::PatientTransport => "patient_transport",
            TaskKind::EquipmentDelivery => "equipment_delivery",
            TaskKind::LabSamplePickup => "lab_sample_pickup",
            TaskKind::Cleaning => "cleaning",
            TaskKind::LinenChange => "linen_change",
            TaskKind::SupplyRestock => "supply_restock",
            TaskKind::Maintenance => "maintenance",
            TaskKind::PatientCheck => "patient_check",
        }
    }

    /// Typical duration used for client-side progress projection.
    pub fn default_duration_secs(self) -> u32 {
        match self {
            TaskKind::FoodDelivery => 30,
            TaskKind::MedicationDelivery => 45,
            TaskKind::PatientTransport => 120,
            TaskKind::EquipmentDelivery => 60,
            TaskKind::LabSamplePickup => 40,
            TaskKind::Cleaning => 90,
            TaskKind::LinenChange => 60,
            TaskKind::SupplyRestock => 75,
            TaskKind::Maintenance => 180,
            TaskKind::PatientCheck => 20,
        }
    }

    /// Title used for the persisted record when none is given.
    pub fn default_title(self) -> &'static str {
        match self {
            TaskKind::FoodDelivery => "Food delivery",
            TaskKind::MedicationDelivery => "Medication delivery",
            TaskKind::PatientTransport => "Patient transport",
            TaskKind::EquipmentDelivery => "Equipment delivery",
            TaskKind::LabSamplePickup => "Lab sample pickup",
            TaskKind::Cleaning => "Room cleaning",
            TaskKind::LinenChange => "Linen change",
            TaskKind::SupplyRestock => "Supply restock",
            TaskKind::Maintenance => "Maintenance",
            TaskKind::PatientCheck => "Patient check",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    /// Some backends report running tasks as `active`.
    #[serde(alias = "active")]
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Position in the lifecycle. Both terminal states share the last rank.
    pub fn rank(self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::InProgress => 1,
            TaskStatus::Completed | TaskStatus::Cancelled => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }

    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    /// Whether `self -> to` is an edge of the lifecycle.
    pub fn can_transition_to(self, to: TaskStatus) -> bool {
        matches!(
            (self, to),
            (TaskStatus::Pending, TaskStatus::InProgress)
                | (TaskStatus::Pending, TaskStatus::Cancelled)
                | (TaskStatus::InProgress, TaskStatus::Completed)
                | (TaskStatus::InProgress, TaskStatus::Cancelled)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// The authoritative client-side record of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: TaskKind,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub status: TaskStatus,

    pub target_location_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_location_id: Option<String>,

    #[serde(default)]
    pub priority: Priority,

    /// Percentage in `[0, 100]`.
    #[serde(default)]
    pub progress: f64,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    pub estimated_duration_seconds: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to_id: Option<String>,
}

impl Task {
    /// Move the task along its lifecycle, stamping start/finish times.
    ///
    /// Re-applying the current status is a no-op.
    pub fn transition(&mut self, to: TaskStatus, now: DateTime<Utc>) -> Result<(), BackendError> {
        if self.status == to {
            return Ok(());
        }
        if !self.status.can_transition_to(to) {
            return Err(BackendError::InvalidTransition {
                task_id: self.id.clone(),
                from: self.status,
                to,
            });
        }

        match to {
            TaskStatus::InProgress => {
                self.started_at.get_or_insert(now);
            }
            TaskStatus::Completed => {
                self.completed_at = Some(now);
                self.progress = 100.0;
            }
            TaskStatus::Cancelled => {
                self.completed_at = Some(now);
            }
            TaskStatus::Pending => {}
        }
        self.status = to;
        Ok(())
    }
}

/// The record written to the backend store when a task is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub priority: Priority,

    #[serde(rename = "type")]
    pub kind: TaskKind,

    pub status: TaskStatus,

    pub target_location_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_location_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to_id: Option<String>,

    /// Overrides the kind's default duration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration_seconds: Option<u32>,
}

impl NewTask {
    pub fn new(kind: TaskKind, target_location_id: impl Into<String>) -> Self {
        Self {
            title: kind.default_title().to_string(),
            description: None,
            priority: Priority::default(),
            kind,
            status: TaskStatus::Pending,
            target_location_id: target_location_id.into(),
            source_location_id: None,
            assigned_to_id: None,
            estimated_duration_seconds: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Materialize the stored record.
    pub fn into_task(self, now: DateTime<Utc>) -> Task {
        let started_at = (self.status == TaskStatus::InProgress).then_some(now);
        Task {
            id: Uuid::new_v4().to_string(),
            estimated_duration_seconds: self
                .estimated_duration_seconds
                .filter(|secs| *secs > 0)
                .unwrap_or_else(|| self.kind.default_duration_secs()),
            kind: self.kind,
            title: self.title,
            description: self.description,
            status: self.status,
            target_location_id: self.target_location_id,
            source_location_id: self.source_location_id,
            priority: self.priority,
            progress: 0.0,
            created_at: now,
            started_at,
            completed_at: None,
            assigned_to_id: self.assigned_to_id,
        }
    }
}
