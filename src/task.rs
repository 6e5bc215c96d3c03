//! Task and solution types.
//!
//! A [`TaskDescriptor`] is what gets submitted; a [`SolutionResult`] is what
//! comes back once the service reports the task as ready. Field names follow
//! Rust conventions; [`TaskDescriptor::to_wire`] and the serde renames map them
//! to the service's camelCase JSON.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Recognition model used for image tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImageModel {
    /// General purpose model (the service's recommended default)
    #[default]
    M1,
    /// Legacy model
    Muggle,
}

impl ImageModel {
    fn wire_type(self) -> &'static str {
        match self {
            ImageModel::M1 => "ImageToTextTaskM1",
            ImageModel::Muggle => "ImageToTextTaskMuggle",
        }
    }
}

/// Image recognition task: the service reads the text out of an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTask {
    pub payload: Vec<u8>,
    pub model: ImageModel,
}

impl ImageTask {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            model: ImageModel::default(),
        }
    }

    pub fn with_model(mut self, model: ImageModel) -> Self {
        self.model = model;
        self
    }
}

/// Interactive challenge (hCaptcha) task, solved without a proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeTask {
    pub site_key: String,
    pub site_url: String,
    pub user_agent: Option<String>,
    pub invisible: Option<bool>,
    /// Opaque extra challenge data (`rqdata`) some sites require
    pub extra_data: Option<String>,
}

impl ChallengeTask {
    pub fn new(site_key: impl Into<String>, site_url: impl Into<String>) -> Self {
        Self {
            site_key: site_key.into(),
            site_url: site_url.into(),
            user_agent: None,
            invisible: None,
            extra_data: None,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn invisible(mut self, invisible: bool) -> Self {
        self.invisible = Some(invisible);
        self
    }

    pub fn with_extra_data(mut self, extra_data: impl Into<String>) -> Self {
        self.extra_data = Some(extra_data.into());
        self
    }
}

/// A unit of work accepted by the solving service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskDescriptor {
    Image(ImageTask),
    Challenge(ChallengeTask),
}

/// Discriminant of [`TaskDescriptor`] / [`SolutionResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Image,
    Challenge,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Image => write!(f, "image"),
            TaskKind::Challenge => write!(f, "challenge"),
        }
    }
}

impl TaskDescriptor {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskDescriptor::Image(_) => TaskKind::Image,
            TaskDescriptor::Challenge(_) => TaskKind::Challenge,
        }
    }

    /// Encode as the `task` object of a `createTask` request.
    pub fn to_wire(&self) -> Value {
        match self {
            TaskDescriptor::Image(task) => json!({
                "type": task.model.wire_type(),
                "body": STANDARD.encode(&task.payload),
            }),
            TaskDescriptor::Challenge(task) => {
                let mut wire = Map::new();
                wire.insert("type".into(), json!("HCaptchaTaskProxyless"));
                wire.insert("websiteURL".into(), json!(task.site_url));
                wire.insert("websiteKey".into(), json!(task.site_key));
                if let Some(ua) = &task.user_agent {
                    wire.insert("userAgent".into(), json!(ua));
                }
                if let Some(invisible) = task.invisible {
                    wire.insert("isInvisible".into(), json!(invisible));
                }
                if let Some(rqdata) = &task.extra_data {
                    wire.insert("rqdata".into(), json!(rqdata));
                }
                Value::Object(wire)
            }
        }
    }
}

impl From<ImageTask> for TaskDescriptor {
    fn from(task: ImageTask) -> Self {
        TaskDescriptor::Image(task)
    }
}

impl From<ChallengeTask> for TaskDescriptor {
    fn from(task: ChallengeTask) -> Self {
        TaskDescriptor::Challenge(task)
    }
}

/// Opaque identifier the service assigns to a submitted task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskHandle(String);

impl TaskHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Solution of an image task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSolution {
    pub text: String,
}

/// Solution of a challenge task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeSolution {
    /// Response token to submit to the protected site
    #[serde(rename = "gRecaptchaResponse")]
    pub token: String,
    /// User agent the token is bound to
    #[serde(rename = "userAgent", default)]
    pub user_agent: String,
    #[serde(rename = "respKey", default, skip_serializing_if = "Option::is_none")]
    pub response_key: Option<String>,
}

/// Typed solution, matching the kind of the originating task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolutionResult {
    Image(ImageSolution),
    Challenge(ChallengeSolution),
}

impl SolutionResult {
    /// Decode a raw `solution` object for a task of the given kind.
    pub fn decode(kind: TaskKind, raw: Value) -> Result<Self, serde_json::Error> {
        match kind {
            TaskKind::Image => serde_json::from_value(raw).map(SolutionResult::Image),
            TaskKind::Challenge => serde_json::from_value(raw).map(SolutionResult::Challenge),
        }
    }

    pub fn kind(&self) -> TaskKind {
        match self {
            SolutionResult::Image(_) => TaskKind::Image,
            SolutionResult::Challenge(_) => TaskKind::Challenge,
        }
    }

    pub fn into_image(self) -> Option<ImageSolution> {
        match self {
            SolutionResult::Image(s) => Some(s),
            SolutionResult::Challenge(_) => None,
        }
    }

    pub fn into_challenge(self) -> Option<ChallengeSolution> {
        match self {
            SolutionResult::Challenge(s) => Some(s),
            SolutionResult::Image(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_task_wire_shape() {
        let task = TaskDescriptor::from(ImageTask::new(b"abc".to_vec()));
        assert_eq!(
            task.to_wire(),
            json!({ "type": "ImageToTextTaskM1", "body": "YWJj" })
        );

        let muggle = TaskDescriptor::from(ImageTask::new(b"abc".to_vec()).with_model(ImageModel::Muggle));
        assert_eq!(muggle.to_wire()["type"], "ImageToTextTaskMuggle");
    }

    #[test]
    fn test_challenge_task_omits_absent_fields() {
        let task = TaskDescriptor::from(ChallengeTask::new("key-1", "https://example.com"));
        assert_eq!(
            task.to_wire(),
            json!({
                "type": "HCaptchaTaskProxyless",
                "websiteURL": "https://example.com",
                "websiteKey": "key-1",
            })
        );
    }

    #[test]
    fn test_challenge_task_full_shape() {
        let task = TaskDescriptor::from(
            ChallengeTask::new("key-1", "https://example.com")
                .with_user_agent("Mozilla/5.0")
                .invisible(true)
                .with_extra_data("rq"),
        );
        let wire = task.to_wire();
        assert_eq!(wire["userAgent"], "Mozilla/5.0");
        assert_eq!(wire["isInvisible"], true);
        assert_eq!(wire["rqdata"], "rq");
        assert_eq!(task.kind(), TaskKind::Challenge);
    }

    #[test]
    fn test_decode_solutions() {
        let image = SolutionResult::decode(TaskKind::Image, json!({ "text": "ab12" })).unwrap();
        assert_eq!(image.into_image().unwrap().text, "ab12");

        let challenge = SolutionResult::decode(
            TaskKind::Challenge,
            json!({ "gRecaptchaResponse": "P1_tok", "userAgent": "UA", "respKey": "E0_x" }),
        )
        .unwrap();
        let challenge = challenge.into_challenge().unwrap();
        assert_eq!(challenge.token, "P1_tok");
        assert_eq!(challenge.user_agent, "UA");
        assert_eq!(challenge.response_key.as_deref(), Some("E0_x"));
    }

    #[test]
    fn test_decode_rejects_mismatched_shape() {
        assert!(SolutionResult::decode(TaskKind::Challenge, json!({ "text": "ab12" })).is_err());
    }
}
