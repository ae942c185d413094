//! The closed set of ward tools and their schemas.
//!
//! Tool names arriving from the model are parsed once into [`ToolName`];
//! everything downstream matches on [`WardTool`] exhaustively, so adding a
//! tool means adding a variant and the compiler points at every place that
//! has to handle it.

use wardops_core::provider::ToolDefinition;
use wardops_core::task::TaskKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WardTool {
    CreateTask,
    AdmitPatient,
    DischargePatient,
    GetRoomContext,
    GetPatientContext,
    GetHospitalContext,
    FindAvailableRoom,
}

/// A tool name as requested by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolName {
    Known(WardTool),
    Unknown(String),
}

impl ToolName {
    pub fn parse(name: &str) -> Self {
        match WardTool::ALL.iter().find(|t| t.name() == name.trim()) {
            Some(tool) => ToolName::Known(*tool),
            None => ToolName::Unknown(name.to_string()),
        }
    }
}

impl WardTool {
    pub const ALL: [WardTool; 7] = [
        WardTool::CreateTask,
        WardTool::AdmitPatient,
        WardTool::DischargePatient,
        WardTool::GetRoomContext,
        WardTool::GetPatientContext,
        WardTool::GetHospitalContext,
        WardTool::FindAvailableRoom,
    ];

    pub fn name(self) -> &'static str {
        match self {
            WardTool::CreateTask => "create_task",
            WardTool::AdmitPatient => "admit_patient",
            WardTool::DischargePatient => "discharge_patient",
            WardTool::GetRoomContext => "get_room_context",
            WardTool::GetPatientContext => "get_patient_context",
            WardTool::GetHospitalContext => "get_hospital_context",
            WardTool::FindAvailableRoom => "find_available_room",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            WardTool::CreateTask => {
                "Create a ward task such as a food, medication or equipment delivery, \
                 cleaning, or patient transport. The task is dispatched to staff and \
                 shows up on the live board."
            }
            WardTool::AdmitPatient => {
                "Admit a patient to the ward. Assigns the given room, or the first \
                 available room when none is given."
            }
            WardTool::DischargePatient => {
                "Discharge an admitted patient and free their room."
            }
            WardTool::GetRoomContext => {
                "Get a room's status, its current patient and the active tasks targeting it."
            }
            WardTool::GetPatientContext => {
                "Get a patient's record, their room and the active tasks for that room."
            }
            WardTool::GetHospitalContext => {
                "Get an overview of the ward: rooms, occupancy and all active tasks."
            }
            WardTool::FindAvailableRoom => {
                "Find an available room, optionally of a given type or on a given floor."
            }
        }
    }

    /// JSON Schema of the tool's arguments.
    pub fn parameters_schema(self) -> serde_json::Value {
        match self {
            WardTool::CreateTask => {
                let kinds: Vec<&str> = TaskKind::ALL.iter().map(|k| k.as_str()).collect();
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "type": {
                            "type": "string",
                            "enum": kinds,
                            "description": "The kind of ward task"
                        },
                        "target_location_id": {
                            "type": "string",
                            "description": "Location id the task targets, e.g. room-101"
                        },
                        "source_location_id": {
                            "type": "string",
                            "description": "Where the task starts, e.g. kitchen or pharmacy"
                        },
                        "priority": {
                            "type": "string",
                            "enum": ["low", "medium", "high", "urgent"],
                            "default": "medium"
                        },
                        "title": { "type": "string" },
                        "description": { "type": "string" },
                        "assigned_to_id": {
                            "type": "string",
                            "description": "Staff member to assign"
                        }
                    },
                    "required": ["type", "target_location_id"]
                })
            }
            WardTool::AdmitPatient => serde_json::json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Patient full name" },
                    "room_id": { "type": "string", "description": "Room to admit into, e.g. room-204" },
                    "condition": { "type": "string" }
                },
                "required": ["name"]
            }),
            WardTool::DischargePatient => serde_json::json!({
                "type": "object",
                "properties": {
                    "patient_id": { "type": "string" }
                },
                "required": ["patient_id"]
            }),
            WardTool::GetRoomContext => serde_json::json!({
                "type": "object",
                "properties": {
                    "room_id": { "type": "string", "description": "e.g. room-101" }
                },
                "required": ["room_id"]
            }),
            WardTool::GetPatientContext => serde_json::json!({
                "type": "object",
                "properties": {
                    "patient_id": { "type": "string" }
                },
                "required": ["patient_id"]
            }),
            WardTool::GetHospitalContext => serde_json::json!({
                "type": "object",
                "properties": {}
            }),
            WardTool::FindAvailableRoom => serde_json::json!({
                "type": "object",
                "properties": {
                    "room_type": {
                        "type": "string",
                        "description": "general, icu or isolation"
                    },
                    "floor": { "type": "integer", "minimum": 0 }
                }
            }),
        }
    }

    pub fn to_definition(self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

impl std::fmt::Display for WardTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Every tool definition, in a stable order, for the provider request.
pub fn definitions() -> Vec<ToolDefinition> {
    WardTool::ALL.iter().map(|t| t.to_definition()).collect()
}
