//! Error taxonomy for one run of the pipeline
//!
//! Configuration errors stop a run before any issue is touched. Everything
//! else is scoped to a single issue attempt: the caller logs it and moves on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing or inconsistent settings (credentials, repository, service).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// HTTP or network failure talking to the tracker, the model, or a git remote.
    #[error("{service} request failed: {message}")]
    Transport { service: String, message: String },

    /// The model answered, but not with a fix we can read.
    #[error("could not parse model response: {0}")]
    Parse(String),

    /// The proposed change made the project's tests fail. Nothing was committed.
    #[error("tests failed after applying changes ({command})")]
    TestFailure { command: String, output: String },

    /// Clone, read, or write failure in the working copy.
    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl PipelineError {
    pub fn transport(service: impl Into<String>, message: impl ToString) -> Self {
        Self::Transport {
            service: service.into(),
            message: message.to_string(),
        }
    }

    pub fn filesystem(err: impl std::fmt::Display) -> Self {
        Self::Filesystem(err.to_string())
    }

    /// A rollback is a designed outcome, not a defect in the pipeline.
    pub fn is_test_failure(&self) -> bool {
        matches!(self, Self::TestFailure { .. })
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        Self::Filesystem(err.to_string())
    }
}
