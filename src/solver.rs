//! Public solving surface.
//!
//! [`Solver`] chains the two protocol components: submit with
//! [`TaskCreator`], then wait with [`ResultPoller`], then unwrap the solution
//! for the task kind. It adds no retry of its own and passes every error
//! through unchanged.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::creator::{CreatedTask, TaskCreator};
use crate::error::{SolverError, SolverResult};
use crate::poller::{decode_solution, PollDiagnostics, ResultPoller};
use crate::support::log_phase;
use crate::task::{
    ChallengeSolution, ChallengeTask, ImageSolution, ImageTask, SolutionResult, TaskDescriptor,
    TaskHandle, TaskKind,
};
use crate::transport::{HttpTransport, Transport};

/// Anything that can solve image and challenge captchas.
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    /// Recognise the text in an image.
    async fn solve_image(&self, image: &[u8]) -> SolverResult<String>;

    /// Solve an interactive challenge and return its response token.
    async fn solve_challenge(&self, site_key: &str, site_url: &str) -> SolverResult<String>;
}

/// Client for a createTask / getTaskResult style solving service.
pub struct Solver {
    creator: TaskCreator,
    poller: ResultPoller,
    debug: bool,
}

impl Solver {
    /// Create a solver talking HTTP to the configured service.
    ///
    /// Accepts a full [`ClientConfig`] or a bare API key.
    pub fn new(config: impl Into<ClientConfig>) -> SolverResult<Self> {
        let config = config.into();
        config.validate()?;
        let transport = Arc::new(HttpTransport::new(&config)?);
        Ok(Self::with_transport(transport, &config))
    }

    /// Create a solver over an existing transport.
    pub fn with_transport(transport: Arc<dyn Transport>, config: &ClientConfig) -> Self {
        Self {
            creator: TaskCreator::new(Arc::clone(&transport), config),
            poller: ResultPoller::new(transport, config),
            debug: config.debug,
        }
    }

    pub fn diagnostics(&self) -> Arc<PollDiagnostics> {
        self.poller.diagnostics()
    }

    /// Submit any task and wait for its typed solution.
    pub async fn solve(
        &self,
        descriptor: &TaskDescriptor,
        cancel: &CancellationToken,
    ) -> SolverResult<SolutionResult> {
        let (_, solution) = self.solve_tracked(descriptor, cancel).await?;
        Ok(solution)
    }

    pub async fn solve_image_task(
        &self,
        task: ImageTask,
        cancel: &CancellationToken,
    ) -> SolverResult<ImageSolution> {
        match self.solve_tracked(&task.into(), cancel).await? {
            (_, SolutionResult::Image(solution)) => Ok(solution),
            (handle, other) => Err(kind_mismatch(handle, TaskKind::Image, &other)),
        }
    }

    /// Solve a challenge with every optional field available.
    pub async fn solve_challenge_task(
        &self,
        task: ChallengeTask,
        cancel: &CancellationToken,
    ) -> SolverResult<ChallengeSolution> {
        match self.solve_tracked(&task.into(), cancel).await? {
            (_, SolutionResult::Challenge(solution)) => Ok(solution),
            (handle, other) => Err(kind_mismatch(handle, TaskKind::Challenge, &other)),
        }
    }

    pub async fn solve_image_with_cancel(
        &self,
        image: &[u8],
        cancel: &CancellationToken,
    ) -> SolverResult<String> {
        let solution = self.solve_image_task(ImageTask::new(image), cancel).await?;
        Ok(solution.text)
    }

    pub async fn solve_challenge_with_cancel(
        &self,
        site_key: &str,
        site_url: &str,
        cancel: &CancellationToken,
    ) -> SolverResult<String> {
        log_phase(self.debug, format_args!("Starting challenge: {}", site_url));
        let solution = self
            .solve_challenge_task(ChallengeTask::new(site_key, site_url), cancel)
            .await?;
        Ok(solution.token)
    }

    /// Submit, then poll unless the submission already carried the solution.
    async fn solve_tracked(
        &self,
        descriptor: &TaskDescriptor,
        cancel: &CancellationToken,
    ) -> SolverResult<(TaskHandle, SolutionResult)> {
        let kind = descriptor.kind();
        log_phase(self.debug, format_args!("Submitting {} task", kind));

        let created = self
            .creator
            .create_task_with_cancel(descriptor, cancel)
            .await?;
        log_phase(self.debug, format_args!("Task created ID: {}", created));

        match created {
            CreatedTask::Pending(handle) => {
                let solution = self
                    .poller
                    .poll_until_ready_with_cancel(&handle, kind, cancel)
                    .await?;
                Ok((handle, solution))
            }
            CreatedTask::Solved { handle, solution } => {
                let handle = handle.unwrap_or_else(|| TaskHandle::new(INLINE_HANDLE));
                log_phase(
                    self.debug,
                    format_args!("Task {} solved at submission", handle),
                );
                let solution = decode_solution(&handle, kind, solution)?;
                Ok((handle, solution))
            }
        }
    }
}

/// Handle reported for tasks the service solved without assigning an id.
const INLINE_HANDLE: &str = "inline";

fn kind_mismatch(handle: TaskHandle, kind: TaskKind, got: &SolutionResult) -> SolverError {
    SolverError::MalformedSolution {
        handle,
        kind,
        reason: format!("expected {} solution, got {}", kind, got.kind()),
    }
}

#[async_trait]
impl CaptchaSolver for Solver {
    async fn solve_image(&self, image: &[u8]) -> SolverResult<String> {
        self.solve_image_with_cancel(image, &CancellationToken::new())
            .await
    }

    async fn solve_challenge(&self, site_key: &str, site_url: &str) -> SolverResult<String> {
        self.solve_challenge_with_cancel(site_key, site_url, &CancellationToken::new())
            .await
    }
}

impl fmt::Debug for Solver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Solver")
            .field("submission", &self.creator.policy())
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}
