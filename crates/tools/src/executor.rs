//! Tool executor: one tool call in, one [`ToolResult`] out.
//!
//! `execute` never fails. Unknown names, bad arguments, domain errors and
//! even panics inside a domain operation all come back as
//! `ToolResult { success: false, .. }` so the conversation can carry on.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use wardops_core::error::{ToolError, WardError};
use wardops_core::event::{DomainEvent, EventBus};
use wardops_core::provider::ToolDefinition;
use wardops_core::tool::{ToolCall, ToolResult};
use wardops_core::ward::{
    AdmitPatientArgs, CreateTaskArgs, DischargePatientArgs, FindRoomArgs, PatientContextArgs,
    RoomContextArgs, WardOperations,
};

use crate::catalog::{self, ToolName, WardTool};
use crate::safe_json::{error_message, panic_message, to_safe_value};

#[derive(Clone)]
pub struct ToolExecutor {
    ward: Arc<dyn WardOperations>,
    event_bus: Option<Arc<EventBus>>,
}

impl ToolExecutor {
    pub fn new(ward: Arc<dyn WardOperations>) -> Self {
        Self {
            ward,
            event_bus: None,
        }
    }

    /// Publish a `ToolExecuted` event for every call.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Schemas of every tool this executor can run.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        catalog::definitions()
    }

    /// Execute a call and tag the result with its id.
    pub async fn execute_call(&self, call: &ToolCall) -> ToolResult {
        self.execute(&call.name, call.arguments.clone())
            .await
            .for_call(&call.id)
    }

    pub async fn execute(&self, name: &str, args: Value) -> ToolResult {
        let started = std::time::Instant::now();

        let result = match ToolName::parse(name) {
            ToolName::Unknown(unknown) => {
                ToolResult::failure(ToolError::UnknownTool(unknown).to_string())
            }
            ToolName::Known(tool) => {
                match AssertUnwindSafe(self.dispatch(tool, args))
                    .catch_unwind()
                    .await
                {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) => ToolResult::failure(error_message(&e)),
                    Err(payload) => ToolResult::failure(format!(
                        "{tool} panicked: {}",
                        panic_message(payload.as_ref())
                    )),
                }
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        if result.success {
            debug!(tool = %name, duration_ms, "Tool succeeded");
        } else {
            warn!(tool = %name, duration_ms, error = %result.message, "Tool failed");
        }

        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::ToolExecuted {
                tool_name: name.to_string(),
                success: result.success,
                duration_ms,
                timestamp: chrono::Utc::now(),
            });
        }

        result
    }

    async fn dispatch(&self, tool: WardTool, args: Value) -> Result<ToolResult, ToolError> {
        let ward = self.ward.as_ref();
        match tool {
            WardTool::CreateTask => {
                let args: CreateTaskArgs = parse_args(tool, args)?;
                let task = ward.create_task(args).await.map_err(|e| failed(tool, e))?;
                Ok(ToolResult::ok(
                    format!(
                        "Created {} task '{}' for {} ({})",
                        task.kind.as_str(),
                        task.title,
                        task.target_location_id,
                        task.id
                    ),
                    Some(to_safe_value(&task)),
                ))
            }
            WardTool::AdmitPatient => {
                let args: AdmitPatientArgs = parse_args(tool, args)?;
                let patient = ward.admit_patient(args).await.map_err(|e| failed(tool, e))?;
                let room = patient.room_id.as_deref().unwrap_or("no room");
                Ok(ToolResult::ok(
                    format!("Admitted {} to {room}", patient.name),
                    Some(to_safe_value(&patient)),
                ))
            }
            WardTool::DischargePatient => {
                let args: DischargePatientArgs = parse_args(tool, args)?;
                let patient = ward
                    .discharge_patient(args)
                    .await
                    .map_err(|e| failed(tool, e))?;
                Ok(ToolResult::ok(
                    format!("Discharged {}", patient.name),
                    Some(to_safe_value(&patient)),
                ))
            }
            WardTool::GetRoomContext => {
                let args: RoomContextArgs = parse_args(tool, args)?;
                let context = ward.room_context(args).await.map_err(|e| failed(tool, e))?;
                Ok(ToolResult::ok(
                    format!(
                        "Room {} is {:?} with {} active task(s)",
                        context.room.number,
                        context.room.status,
                        context.active_tasks.len()
                    ),
                    Some(to_safe_value(&context)),
                ))
            }
            WardTool::GetPatientContext => {
                let args: PatientContextArgs = parse_args(tool, args)?;
                let context = ward
                    .patient_context(args)
                    .await
                    .map_err(|e| failed(tool, e))?;
                Ok(ToolResult::ok(
                    format!("Found patient {}", context.patient.name),
                    Some(to_safe_value(&context)),
                ))
            }
            WardTool::GetHospitalContext => {
                let context = ward.hospital_context().await.map_err(|e| failed(tool, e))?;
                Ok(ToolResult::ok(
                    format!(
                        "{} of {} rooms available, {} patients admitted, {} active task(s)",
                        context.rooms_available,
                        context.rooms_total,
                        context.patients_admitted,
                        context.active_tasks.len()
                    ),
                    Some(to_safe_value(&context)),
                ))
            }
            WardTool::FindAvailableRoom => {
                let args: FindRoomArgs = parse_args(tool, args)?;
                let room = ward
                    .find_available_room(args)
                    .await
                    .map_err(|e| failed(tool, e))?;
                Ok(ToolResult::ok(
                    format!("Room {} ({}) is available", room.number, room.id),
                    Some(to_safe_value(&room)),
                ))
            }
        }
    }
}

/// Missing arguments are treated as an empty object.
fn parse_args<T: DeserializeOwned>(tool: WardTool, args: Value) -> Result<T, ToolError> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments {
        tool_name: tool.name().to_string(),
        reason: e.to_string(),
    })
}

fn failed(tool: WardTool, err: WardError) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: tool.name().to_string(),
        reason: error_message(&err),
    }
}
