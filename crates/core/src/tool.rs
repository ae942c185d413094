//! Tool call and tool result value types.
//!
//! A [`ToolCall`] is created by the completion provider and consumed exactly
//! once by the tool executor, which always answers with a [`ToolResult`].

use serde::{Deserialize, Serialize};

/// A request to execute a tool, with arguments already parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// The uniform outcome of a tool execution.
///
/// Always serializable: `data` is run through a depth-bounded serializer
/// before it is stored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub call_id: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// Human-readable outcome
    pub message: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn ok(message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            call_id: String::new(),
            success: true,
            message: message.into(),
            data,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            call_id: String::new(),
            success: false,
            message: message.into(),
            data: None,
        }
    }

    pub fn for_call(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = call_id.into();
        self
    }

    /// The text fed back to the model as a tool-role message.
    pub fn to_message_content(&self) -> String {
        let mut body = serde_json::json!({
            "success": self.success,
            "message": self.message,
        });
        if let Some(data) = &self.data {
            body["data"] = data.clone();
        }
        body.to_string()
    }
}
