//! Error types for the solver client.
//!
//! Failures fall into two families:
//! - [`TransportError`]: the request never produced a usable answer
//!   (timeout, connection failure, HTTP status, unparseable body)
//! - [`RemoteError`]: the service answered and reported a nonzero `errorId`
//!
//! Whether either is retried depends on the phase; see [`AttemptError`] and
//! [`SolverError`].

use std::fmt;

use thiserror::Error;

use crate::task::{TaskHandle, TaskKind};

/// HTTP-level failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timeout: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if e.is_decode() {
            TransportError::Malformed(e.to_string())
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

/// Error reported by the service itself (`errorId != 0`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub error_id: i64,
    pub code: Option<String>,
    pub description: Option<String>,
}

/// Codes that indicate a problem with the account rather than the task.
const ACCOUNT_ERROR_CODES: &[&str] = &[
    "ERROR_KEY_DOES_NOT_EXIST",
    "ERROR_ZERO_BALANCE",
    "ERROR_IP_NOT_ALLOWED",
    "ERROR_ACCOUNT_SUSPENDED",
    "ERROR_IP_BLOCKED",
];

impl RemoteError {
    pub fn new(error_id: i64, code: Option<String>, description: Option<String>) -> Self {
        Self {
            error_id,
            code,
            description,
        }
    }

    /// Whether the code names an account-level condition (bad key, no balance).
    ///
    /// Only used for diagnostics; submission retries these like any other error.
    pub fn is_account_error(&self) -> bool {
        self.code
            .as_deref()
            .is_some_and(|code| ACCOUNT_ERROR_CODES.contains(&code))
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "remote error {}", self.error_id)?;
        if let Some(code) = &self.code {
            write!(f, " {}", code)?;
        }
        write!(
            f,
            ": {}",
            self.description.as_deref().unwrap_or("Unknown Error")
        )
    }
}

impl std::error::Error for RemoteError {}

/// Outcome of a single failed submission attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttemptError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Errors surfaced by a solve operation.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("task submission failed after {attempts} attempt(s): {last}")]
    SubmissionFailed {
        attempts: u32,
        #[source]
        last: AttemptError,
    },

    #[error("task {handle} rejected by the service: {error}")]
    RemoteRejected {
        handle: TaskHandle,
        #[source]
        error: RemoteError,
    },

    #[error("task {handle} did not complete after {attempts} polls")]
    PollTimeout { handle: TaskHandle, attempts: u32 },

    #[error("malformed {kind} solution for task {handle}: {reason}")]
    MalformedSolution {
        handle: TaskHandle,
        kind: TaskKind,
        reason: String,
    },

    #[error("solve cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SolverError {
    /// The service-reported error behind this failure, if any.
    pub fn remote_error(&self) -> Option<&RemoteError> {
        match self {
            SolverError::SubmissionFailed {
                last: AttemptError::Remote(e),
                ..
            } => Some(e),
            SolverError::RemoteRejected { error, .. } => Some(error),
            _ => None,
        }
    }
}

pub type SolverResult<T> = Result<T, SolverError>;
