//! issue-mender library crate
//!
//! Exposes the pipeline and its collaborators so the CLI and integration
//! tests drive the same code.

pub mod config;
pub mod context;
pub mod error;
pub mod git_ops;
pub mod github;
pub mod keyring;
pub mod model;
pub mod pipeline;
pub mod session;
pub mod setup;
pub mod testing;
pub mod util;
pub mod vagueness;

pub use error::PipelineError;
pub use pipeline::{decide, Decision, IssueState, Pipeline, Resolution};
pub use session::SessionTally;
