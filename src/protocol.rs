//! Wire format of the solving service (`/createTask`, `/getTaskResult`).

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{RemoteError, TransportError};

pub(crate) const CREATE_TASK_PATH: &str = "/createTask";
pub(crate) const GET_TASK_RESULT_PATH: &str = "/getTaskResult";

/// `POST /createTask` body.
#[derive(Debug)]
pub(crate) struct CreateTaskRequest<'a> {
    pub client_key: &'a str,
    pub task: Value,
}

impl CreateTaskRequest<'_> {
    pub fn to_value(&self) -> Value {
        json!({ "clientKey": self.client_key, "task": self.task })
    }
}

/// `POST /getTaskResult` body.
#[derive(Debug)]
pub(crate) struct GetTaskResultRequest<'a> {
    pub client_key: &'a str,
    pub task_id: &'a str,
}

impl GetTaskResultRequest<'_> {
    pub fn to_value(&self) -> Value {
        json!({ "clientKey": self.client_key, "taskId": self.task_id })
    }
}

/// `POST /createTask` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateTaskResponse {
    #[serde(default)]
    pub error_id: i64,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    /// String on most services, number on some
    #[serde(default)]
    pub task_id: Option<Value>,
    /// Sent alongside an inline solution by some services
    #[serde(default)]
    pub status: Option<String>,
    /// Present when the service answers synchronously
    #[serde(default)]
    pub solution: Option<Value>,
}

impl CreateTaskResponse {
    pub fn remote_error(&self) -> Option<RemoteError> {
        remote_error(self.error_id, &self.error_code, &self.error_description)
    }

    /// Task id normalised to a non-empty string.
    pub fn task_id(&self) -> Option<String> {
        match self.task_id.as_ref()? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Solution delivered with the submission itself.
    ///
    /// Only a non-empty object counts, and only when no status other than
    /// `ready` accompanies it.
    pub fn inline_solution(&self) -> Option<Value> {
        if matches!(self.status.as_deref(), Some(status) if status != "ready") {
            return None;
        }
        match &self.solution {
            Some(Value::Object(fields)) if !fields.is_empty() => self.solution.clone(),
            _ => None,
        }
    }
}

/// `POST /getTaskResult` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GetTaskResultResponse {
    #[serde(default)]
    pub error_id: i64,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub solution: Option<Value>,
}

impl GetTaskResultResponse {
    pub fn remote_error(&self) -> Option<RemoteError> {
        remote_error(self.error_id, &self.error_code, &self.error_description)
    }
}

/// Task status reported by `/getTaskResult`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TaskStatus {
    Ready,
    Processing,
    Other(String),
}

impl TaskStatus {
    pub fn parse(status: Option<&str>) -> Self {
        match status {
            Some("ready") => TaskStatus::Ready,
            Some("processing") => TaskStatus::Processing,
            Some(other) => TaskStatus::Other(other.to_string()),
            None => TaskStatus::Other(String::new()),
        }
    }
}

fn remote_error(
    error_id: i64,
    code: &Option<String>,
    description: &Option<String>,
) -> Option<RemoteError> {
    (error_id != 0).then(|| RemoteError::new(error_id, code.clone(), description.clone()))
}

/// Decode a response body, treating a shape mismatch as a transport failure.
pub(crate) fn decode<T: DeserializeOwned>(value: Value) -> Result<T, TransportError> {
    serde_json::from_value(value)
        .map_err(|e| TransportError::Malformed(format!("unexpected response shape: {}", e)))
}
