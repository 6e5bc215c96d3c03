//! Task submission with linear backoff.
//!
//! Every failed attempt, whether the service rejected it or the request never
//! got an answer, is retried until `create_task_max_retries` retries have been
//! used. The wait before retry `k` is `create_task_base_delay * k`, so retries
//! reach the service at increasing spacing.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::{AttemptError, SolverError, SolverResult, TransportError};
use crate::protocol::{decode, CreateTaskRequest, CreateTaskResponse, CREATE_TASK_PATH};
use crate::support::{log_phase, run_or_cancel, sleep_or_cancel};
use crate::task::{TaskDescriptor, TaskHandle};
use crate::transport::Transport;

/// Retry policy for `/createTask`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl SubmissionPolicy {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_retries: config.create_task_max_retries,
            base_delay: config.create_task_base_delay(),
        }
    }

    /// Wait before attempt `attempt` (zero for the first attempt).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// A task the service accepted.
#[derive(Debug, Clone, PartialEq)]
pub enum CreatedTask {
    /// Queued; its result has to be polled for.
    Pending(TaskHandle),
    /// Solved synchronously. The service may omit the task id in this case.
    Solved {
        handle: Option<TaskHandle>,
        solution: Value,
    },
}

impl CreatedTask {
    pub fn handle(&self) -> Option<&TaskHandle> {
        match self {
            CreatedTask::Pending(handle) => Some(handle),
            CreatedTask::Solved { handle, .. } => handle.as_ref(),
        }
    }
}

impl fmt::Display for CreatedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.handle() {
            Some(handle) => write!(f, "{}", handle),
            None => f.write_str("(inline)"),
        }
    }
}

/// Submits tasks to the solving service.
pub struct TaskCreator {
    transport: Arc<dyn Transport>,
    client_key: String,
    policy: SubmissionPolicy,
    debug: bool,
}

impl TaskCreator {
    pub fn new(transport: Arc<dyn Transport>, config: &ClientConfig) -> Self {
        Self {
            transport,
            client_key: config.api_key.clone(),
            policy: SubmissionPolicy::from_config(config),
            debug: config.debug,
        }
    }

    pub fn policy(&self) -> SubmissionPolicy {
        self.policy
    }

    /// Submit a task, retrying failed attempts.
    pub async fn create_task(&self, descriptor: &TaskDescriptor) -> SolverResult<CreatedTask> {
        self.create_task_with_cancel(descriptor, &CancellationToken::new())
            .await
    }

    /// Submit a task, retrying failed attempts, until done or `cancel` fires.
    pub async fn create_task_with_cancel(
        &self,
        descriptor: &TaskDescriptor,
        cancel: &CancellationToken,
    ) -> SolverResult<CreatedTask> {
        let body = CreateTaskRequest {
            client_key: &self.client_key,
            task: descriptor.to_wire(),
        }
        .to_value();

        let start = Instant::now();
        let mut last_error: Option<AttemptError> = None;

        for attempt in 0..self.policy.max_attempts() {
            if attempt > 0 {
                let wait = self.policy.delay_before(attempt);
                log_phase(
                    self.debug,
                    format_args!(
                        "Retrying {} task creation, attempt {}/{}, waiting {:?}",
                        descriptor.kind(),
                        attempt,
                        self.policy.max_retries,
                        wait
                    ),
                );
                sleep_or_cancel(wait, cancel).await?;
            }

            match run_or_cancel(self.submit_once(&body), cancel).await? {
                Ok(created) => {
                    if attempt > 0 {
                        tracing::info!(
                            "Task {} created after {} retries (total time: {:?})",
                            created,
                            attempt,
                            start.elapsed()
                        );
                    }
                    return Ok(created);
                }
                Err(error) => {
                    match &error {
                        AttemptError::Remote(remote) if remote.is_account_error() => {
                            tracing::warn!(
                                "Create task attempt {} failed with account error, retrying anyway: {}",
                                attempt + 1,
                                remote
                            );
                        }
                        _ => {
                            tracing::warn!("Create task attempt {} failed: {}", attempt + 1, error);
                        }
                    }
                    last_error = Some(error);
                }
            }
        }

        let attempts = self.policy.max_attempts();
        let last = last_error.unwrap_or_else(|| {
            TransportError::Request("no submission attempt was made".to_string()).into()
        });
        tracing::error!(
            "Task creation failed after {} attempts (total time: {:?}): {}",
            attempts,
            start.elapsed(),
            last
        );
        Err(SolverError::SubmissionFailed { attempts, last })
    }

    /// One `/createTask` round trip without retry.
    async fn submit_once(&self, body: &Value) -> Result<CreatedTask, AttemptError> {
        let value = self.transport.post_json(CREATE_TASK_PATH, body).await?;
        let response: CreateTaskResponse = decode(value)?;

        if let Some(remote) = response.remote_error() {
            return Err(remote.into());
        }

        let handle = response.task_id().map(TaskHandle::new);
        match (handle, response.inline_solution()) {
            (handle, Some(solution)) => Ok(CreatedTask::Solved { handle, solution }),
            (Some(handle), None) => Ok(CreatedTask::Pending(handle)),
            (None, None) => Err(TransportError::Malformed(
                "createTask succeeded without a taskId".to_string(),
            )
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::task::{ChallengeTask, ImageTask};
    use crate::transport::mock::ScriptedTransport;
    use serde_json::json;

    fn config(max_retries: u32, base_delay_ms: u64) -> ClientConfig {
        ClientConfig::builder("test-key")
            .create_task_max_retries(max_retries)
            .create_task_base_delay_ms(base_delay_ms)
            .build()
            .unwrap()
    }

    fn remote_failure() -> Result<Value, TransportError> {
        Ok(json!({
            "errorId": 1,
            "errorCode": "ERROR_ZERO_BALANCE",
            "errorDescription": "Account has zero balance",
        }))
    }

    fn challenge() -> TaskDescriptor {
        ChallengeTask::new("site-key", "https://example.com").into()
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(CREATE_TASK_PATH, Ok(json!({ "errorId": 0, "taskId": "T1" })));
        let creator = TaskCreator::new(transport.clone(), &config(3, 1000));

        let start = Instant::now();
        let created = creator.create_task(&challenge()).await.unwrap();
        assert_eq!(created, CreatedTask::Pending(TaskHandle::new("T1")));
        assert_eq!(start.elapsed(), Duration::ZERO);

        let requests = transport.requests(CREATE_TASK_PATH);
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].0,
            json!({
                "clientKey": "test-key",
                "task": {
                    "type": "HCaptchaTaskProxyless",
                    "websiteURL": "https://example.com",
                    "websiteKey": "site-key",
                },
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_error_exhausts_all_attempts() {
        for retries in [0u32, 1, 4] {
            let transport = Arc::new(ScriptedTransport::new());
            transport.push(CREATE_TASK_PATH, remote_failure());
            let creator = TaskCreator::new(transport.clone(), &config(retries, 10));

            let err = creator.create_task(&challenge()).await.unwrap_err();
            match err {
                SolverError::SubmissionFailed { attempts, last } => {
                    assert_eq!(attempts, retries + 1);
                    assert!(matches!(last, AttemptError::Remote(RemoteError { error_id: 1, .. })));
                }
                other => panic!("unexpected error: {other}"),
            }
            assert_eq!(transport.count(CREATE_TASK_PATH), (retries + 1) as usize);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_linearly() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(
            CREATE_TASK_PATH,
            Err(TransportError::Connect("refused".into())),
        );
        let creator = TaskCreator::new(transport.clone(), &config(3, 1000));

        let err = creator.create_task(&challenge()).await.unwrap_err();
        assert!(matches!(
            err,
            SolverError::SubmissionFailed {
                attempts: 4,
                last: AttemptError::Transport(TransportError::Connect(_))
            }
        ));

        let times: Vec<_> = transport
            .requests(CREATE_TASK_PATH)
            .into_iter()
            .map(|(_, at)| at)
            .collect();
        assert_eq!(times.len(), 4);
        let gaps: Vec<_> = times.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(
            gaps,
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(3000),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transport_failures() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push(CREATE_TASK_PATH, Err(TransportError::Timeout("slow".into())))
            .push(CREATE_TASK_PATH, Err(TransportError::Connect("reset".into())))
            .push(CREATE_TASK_PATH, Ok(json!({ "errorId": 0, "taskId": "T3" })));
        let creator = TaskCreator::new(transport.clone(), &config(3, 500));

        let start = Instant::now();
        let created = creator.create_task(&challenge()).await.unwrap();
        assert_eq!(created.handle().map(TaskHandle::as_str), Some("T3"));
        assert_eq!(start.elapsed(), Duration::from_millis(500 + 1000));
        assert_eq!(transport.count(CREATE_TASK_PATH), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_fails_immediately() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(
            CREATE_TASK_PATH,
            Err(TransportError::Status {
                status: 502,
                body: "bad gateway".into(),
            }),
        );
        let creator = TaskCreator::new(transport.clone(), &config(0, 3000));

        let start = Instant::now();
        let err = creator.create_task(&challenge()).await.unwrap_err();
        assert!(matches!(err, SolverError::SubmissionFailed { attempts: 1, .. }));
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(transport.count(CREATE_TASK_PATH), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_error_is_surfaced() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push(CREATE_TASK_PATH, remote_failure())
            .push(CREATE_TASK_PATH, Err(TransportError::Timeout("slow".into())));
        let creator = TaskCreator::new(transport.clone(), &config(1, 10));

        let err = creator.create_task(&challenge()).await.unwrap_err();
        assert!(matches!(
            err,
            SolverError::SubmissionFailed {
                last: AttemptError::Transport(TransportError::Timeout(_)),
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_task_id_is_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push(CREATE_TASK_PATH, Ok(json!({ "errorId": 0 })))
            .push(CREATE_TASK_PATH, Ok(json!({ "errorId": 0, "taskId": 77 })));
        let creator = TaskCreator::new(transport.clone(), &config(1, 10));

        let created = creator.create_task(&challenge()).await.unwrap();
        assert_eq!(created.handle().map(TaskHandle::as_str), Some("77"));
        assert_eq!(transport.count(CREATE_TASK_PATH), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inline_solution_is_returned() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(
            CREATE_TASK_PATH,
            Ok(json!({ "errorId": 0, "taskId": "T9", "solution": { "text": "xy" } })),
        );
        let creator = TaskCreator::new(transport.clone(), &config(3, 10));

        let task = TaskDescriptor::from(ImageTask::new(vec![1, 2, 3]));
        let created = creator.create_task(&task).await.unwrap();
        assert_eq!(
            created,
            CreatedTask::Solved {
                handle: Some(TaskHandle::new("T9")),
                solution: json!({ "text": "xy" }),
            }
        );
        assert_eq!(
            transport.requests(CREATE_TASK_PATH)[0].0["task"],
            json!({ "type": "ImageToTextTaskM1", "body": "AQID" })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_inline_solution_without_task_id_is_accepted() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(
            CREATE_TASK_PATH,
            Ok(json!({ "errorId": 0, "status": "ready", "solution": { "text": "ab12" } })),
        );
        let creator = TaskCreator::new(transport.clone(), &config(3, 10));

        let task = TaskDescriptor::from(ImageTask::new(vec![1, 2, 3]));
        let created = creator.create_task(&task).await.unwrap();
        assert_eq!(
            created,
            CreatedTask::Solved {
                handle: None,
                solution: json!({ "text": "ab12" }),
            }
        );
        assert_eq!(created.to_string(), "(inline)");
        assert_eq!(transport.count(CREATE_TASK_PATH), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_inline_solution_leaves_task_pending() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(
            CREATE_TASK_PATH,
            Ok(json!({ "errorId": 0, "taskId": "T1", "solution": {} })),
        );
        let creator = TaskCreator::new(transport.clone(), &config(3, 10));

        let created = creator.create_task(&challenge()).await.unwrap();
        assert_eq!(created, CreatedTask::Pending(TaskHandle::new("T1")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(CREATE_TASK_PATH, remote_failure());
        let creator = TaskCreator::new(transport.clone(), &config(5, 60_000));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let err = creator
            .create_task_with_cancel(&challenge(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SolverError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(60));
        assert_eq!(transport.count(CREATE_TASK_PATH), 1);
    }

    #[test]
    fn test_policy_delays() {
        let policy = SubmissionPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(3000),
        };
        assert_eq!(policy.delay_before(0), Duration::ZERO);
        assert_eq!(policy.delay_before(1), Duration::from_millis(3000));
        assert_eq!(policy.delay_before(3), Duration::from_millis(9000));
        assert_eq!(policy.max_attempts(), 4);
    }
}
