//! Ward domain operations: the actions a tool call can trigger.
//!
//! Every operation takes a typed argument object and returns a typed record
//! or a [`WardError`]. They are invoked exclusively through the tool
//! executor, which turns both outcomes into a uniform tool result.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::WardError;
use crate::task::{NewTask, Priority, Task, TaskKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Available,
    Occupied,
    Cleaning,
    Maintenance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    /// Location id, e.g. `room-101`
    pub id: String,
    pub number: String,
    /// `general`, `icu`, `isolation`, ...
    pub room_type: String,
    pub floor: u8,
    pub status: RoomStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    pub admitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discharged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomContext {
    pub room: Room,
    pub patient: Option<Patient>,
    pub active_tasks: Vec<Task>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientContext {
    pub patient: Patient,
    pub room: Option<Room>,
    pub active_tasks: Vec<Task>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HospitalContext {
    pub rooms_total: usize,
    pub rooms_available: usize,
    pub patients_admitted: usize,
    pub rooms: Vec<Room>,
    pub active_tasks: Vec<Task>,
}

// --- Tool argument shapes ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskArgs {
    #[serde(rename = "type")]
    pub kind: TaskKind,
    #[serde(alias = "targetLocationId")]
    pub target_location_id: String,
    #[serde(default, alias = "sourceLocationId")]
    pub source_location_id: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "assignedToId")]
    pub assigned_to_id: Option<String>,
}

impl CreateTaskArgs {
    pub fn into_new_task(self) -> NewTask {
        let mut draft = NewTask::new(self.kind, self.target_location_id);
        if let Some(title) = self.title.filter(|t| !t.trim().is_empty()) {
            draft.title = title;
        }
        draft.description = self.description;
        draft.priority = self.priority.unwrap_or_default();
        draft.source_location_id = self.source_location_id;
        draft.assigned_to_id = self.assigned_to_id;
        draft
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmitPatientArgs {
    pub name: String,
    /// When absent, the first available room is used.
    #[serde(default, alias = "roomId")]
    pub room_id: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DischargePatientArgs {
    #[serde(alias = "patientId")]
    pub patient_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomContextArgs {
    #[serde(alias = "roomId")]
    pub room_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientContextArgs {
    #[serde(alias = "patientId")]
    pub patient_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindRoomArgs {
    #[serde(default, alias = "roomType")]
    pub room_type: Option<String>,
    #[serde(default)]
    pub floor: Option<u8>,
}

/// The domain operations behind the tool executor.
#[async_trait]
pub trait WardOperations: Send + Sync {
    async fn create_task(&self, args: CreateTaskArgs) -> Result<Task, WardError>;

    async fn admit_patient(&self, args: AdmitPatientArgs) -> Result<Patient, WardError>;

    async fn discharge_patient(&self, args: DischargePatientArgs) -> Result<Patient, WardError>;

    async fn room_context(&self, args: RoomContextArgs) -> Result<RoomContext, WardError>;

    async fn patient_context(&self, args: PatientContextArgs) -> Result<PatientContext, WardError>;

    async fn hospital_context(&self) -> Result<HospitalContext, WardError>;

    async fn find_available_room(&self, args: FindRoomArgs) -> Result<Room, WardError>;
}
