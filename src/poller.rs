//! Fixed-interval result polling.
//!
//! Each cycle waits `polling_interval` and then asks `/getTaskResult` once:
//! - transport failure: ignored, the task may still be running server-side
//! - `errorId != 0`: fatal, the task is abandoned
//! - `processing` (or an unknown status): wait for the next cycle
//! - `ready`: the solution is decoded and returned
//!
//! After `max_polling_attempts` cycles without a terminal answer the poll
//! times out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::{SolverError, SolverResult, TransportError};
use crate::protocol::{
    decode, GetTaskResultRequest, GetTaskResultResponse, TaskStatus, GET_TASK_RESULT_PATH,
};
use crate::support::{log_phase, run_or_cancel, sleep_or_cancel};
use crate::task::{SolutionResult, TaskHandle, TaskKind};
use crate::transport::Transport;

/// Counters for polling behaviour that does not surface as an error.
#[derive(Debug, Default)]
pub struct PollDiagnostics {
    polls: AtomicU64,
    swallowed_transport_errors: AtomicU64,
}

impl PollDiagnostics {
    /// `/getTaskResult` requests issued.
    pub fn polls(&self) -> u64 {
        self.polls.load(Ordering::Relaxed)
    }

    /// Poll cycles whose transport failure was ignored.
    pub fn swallowed_transport_errors(&self) -> u64 {
        self.swallowed_transport_errors.load(Ordering::Relaxed)
    }
}

/// Outcome of one poll cycle.
enum PollStep {
    Waiting,
    Ready(Value),
}

/// Polls the service until a created task completes.
pub struct ResultPoller {
    transport: Arc<dyn Transport>,
    client_key: String,
    interval: Duration,
    max_attempts: u32,
    /// `interval * max_attempts`
    max_wait: Duration,
    debug: bool,
    diagnostics: Arc<PollDiagnostics>,
}

impl ResultPoller {
    pub fn new(transport: Arc<dyn Transport>, config: &ClientConfig) -> Self {
        Self {
            transport,
            client_key: config.api_key.clone(),
            interval: config.polling_interval(),
            max_attempts: config.max_polling_attempts,
            max_wait: config.max_poll_wait(),
            debug: config.debug,
            diagnostics: Arc::new(PollDiagnostics::default()),
        }
    }

    pub fn diagnostics(&self) -> Arc<PollDiagnostics> {
        Arc::clone(&self.diagnostics)
    }

    /// Poll until the task is ready, rejected, or the attempt budget runs out.
    pub async fn poll_until_ready(
        &self,
        handle: &TaskHandle,
        kind: TaskKind,
    ) -> SolverResult<SolutionResult> {
        self.poll_until_ready_with_cancel(handle, kind, &CancellationToken::new())
            .await
    }

    pub async fn poll_until_ready_with_cancel(
        &self,
        handle: &TaskHandle,
        kind: TaskKind,
        cancel: &CancellationToken,
    ) -> SolverResult<SolutionResult> {
        let raw = self.wait_for_solution(handle, kind, cancel).await?;
        decode_solution(handle, kind, raw)
    }

    /// Poll loop returning the undecoded `solution` object.
    async fn wait_for_solution(
        &self,
        handle: &TaskHandle,
        kind: TaskKind,
        cancel: &CancellationToken,
    ) -> SolverResult<Value> {
        let body = GetTaskResultRequest {
            client_key: &self.client_key,
            task_id: handle.as_str(),
        }
        .to_value();

        for attempt in 1..=self.max_attempts {
            sleep_or_cancel(self.interval, cancel).await?;

            self.diagnostics.polls.fetch_add(1, Ordering::Relaxed);
            let step = match run_or_cancel(self.poll_once(handle, kind, &body), cancel).await? {
                Ok(step) => step?,
                Err(e) => {
                    self.diagnostics
                        .swallowed_transport_errors
                        .fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        "Poll {}/{} for task {} failed, will retry: {}",
                        attempt,
                        self.max_attempts,
                        handle,
                        e
                    );
                    continue;
                }
            };

            match step {
                PollStep::Waiting => {
                    tracing::trace!(
                        "Task {} still processing ({}/{})",
                        handle,
                        attempt,
                        self.max_attempts
                    );
                }
                PollStep::Ready(raw) => {
                    log_phase(
                        self.debug,
                        format_args!("Task {} solved after {} polls", handle, attempt),
                    );
                    return Ok(raw);
                }
            }
        }

        tracing::warn!(
            "Task {} did not complete within {} polls ({:?})",
            handle,
            self.max_attempts,
            self.max_wait
        );
        Err(SolverError::PollTimeout {
            handle: handle.clone(),
            attempts: self.max_attempts,
        })
    }

    /// One `/getTaskResult` round trip.
    ///
    /// The outer error is a transport failure (swallowed by the caller); the
    /// inner one is terminal.
    async fn poll_once(
        &self,
        handle: &TaskHandle,
        kind: TaskKind,
        body: &Value,
    ) -> Result<SolverResult<PollStep>, TransportError> {
        let value = self.transport.post_json(GET_TASK_RESULT_PATH, body).await?;
        let response: GetTaskResultResponse = decode(value)?;

        if let Some(error) = response.remote_error() {
            tracing::error!("Task {} rejected by the service: {}", handle, error);
            return Ok(Err(SolverError::RemoteRejected {
                handle: handle.clone(),
                error,
            }));
        }

        let step = match TaskStatus::parse(response.status.as_deref()) {
            TaskStatus::Ready => match response.solution.filter(|s| !s.is_null()) {
                Some(solution) => Ok(PollStep::Ready(solution)),
                None => Err(SolverError::MalformedSolution {
                    handle: handle.clone(),
                    kind,
                    reason: "status is ready but no solution was returned".to_string(),
                }),
            },
            TaskStatus::Processing => Ok(PollStep::Waiting),
            TaskStatus::Other(status) => {
                tracing::debug!("Task {} reported unknown status {:?}", handle, status);
                Ok(PollStep::Waiting)
            }
        };
        Ok(step)
    }
}

/// Decode a `solution` object for `kind`, reporting a shape mismatch against `handle`.
pub(crate) fn decode_solution(
    handle: &TaskHandle,
    kind: TaskKind,
    raw: Value,
) -> SolverResult<SolutionResult> {
    SolutionResult::decode(kind, raw).map_err(|e| SolverError::MalformedSolution {
        handle: handle.clone(),
        kind,
        reason: e.to_string(),
    })
}
