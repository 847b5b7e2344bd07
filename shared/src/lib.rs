use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

/// Durable queue that receives one message per finished task.
pub const RESULT_QUEUE: &str = "image_task_result";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ImageAction {
    RemoveBackground,
    GeneratePreview,
    SearchSimilar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskStatus {
    Success,
    Error,
}

/// Task as it arrives over the wire. The action stays a plain string until
/// the orchestrator parses it, so an unknown action still gets an error result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSubmission {
    pub task_id: Uuid,
    pub action: String,
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub task_id: Uuid,
    pub action: ImageAction,
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub result: Map<String, Value>,
}

impl TaskResult {
    pub fn success(task_id: Uuid, result: Map<String, Value>) -> Self {
        Self {
            task_id,
            status: TaskStatus::Success,
            result,
        }
    }

    pub fn error(task_id: Uuid, message: impl Into<String>) -> Self {
        let mut result = Map::new();
        result.insert("error".into(), Value::String(message.into()));
        Self {
            task_id,
            status: TaskStatus::Error,
            result,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }

    pub fn error_message(&self) -> Option<&str> {
        match self.status {
            TaskStatus::Error => self.result.get("error").and_then(Value::as_str),
            TaskStatus::Success => None,
        }
    }
}
