//! # captcha_solver
//!
//! Async client for remote captcha solving services that follow the
//! `createTask` / `getTaskResult` protocol.
//!
//! ## Architecture
//!
//! ```text
//!        ┌──────────────────────────────────┐
//!        │             Solver               │
//!        │  (solve_image / solve_challenge) │
//!        └───────┬──────────────────┬───────┘
//!                │                  │
//!                ▼                  ▼
//!       ┌─────────────────┐ ┌─────────────────┐
//!       │  TaskCreator    │ │  ResultPoller   │
//!       │ (linear backoff)│ │ (fixed interval)│
//!       └────────┬────────┘ └────────┬────────┘
//!                └────────┬──────────┘
//!                         ▼
//!                ┌─────────────────┐
//!                │    Transport    │
//!                └─────────────────┘
//! ```
//!
//! ## Solve Flow
//! 1. Submit the task, retrying failed submissions with growing delays
//! 2. Poll for the result at a fixed interval, ignoring network glitches
//! 3. Stop on `ready`, on a service error, or when the poll budget runs out
//! 4. Return the solution for the task kind
//!
//! ## Modules
//! - `config`: client configuration and its defaults
//! - `task`: task descriptors and solutions
//! - `transport`: HTTP transport abstraction
//! - `creator` / `poller`: the two protocol phases
//! - `solver`: the public facade

pub mod config;
pub mod creator;
pub mod error;
pub mod poller;
mod protocol;
pub mod solver;
mod support;
pub mod task;
pub mod transport;

pub use config::{ClientConfig, ClientConfigBuilder};
pub use creator::{CreatedTask, SubmissionPolicy, TaskCreator};
pub use error::{AttemptError, RemoteError, SolverError, SolverResult, TransportError};
pub use poller::{PollDiagnostics, ResultPoller};
pub use solver::{CaptchaSolver, Solver};
pub use task::{
    ChallengeSolution, ChallengeTask, ImageModel, ImageSolution, ImageTask, SolutionResult,
    TaskDescriptor, TaskHandle, TaskKind,
};
pub use transport::{HttpTransport, Transport};
pub use tokio_util::sync::CancellationToken;
