//! Issue resolution pipeline
//!
//! One attempt per issue: vagueness gate, fresh clone, context, a single
//! model proposal, then exactly one terminal action.
//!
//! ```text
//! Received ─┬─> Clarify
//!           ├─> NoCodeNeeded
//!           └─> Publishing ─┬─> Published
//!                           └─> RolledBack
//! ```
//!
//! Collaborator failures abort the attempt and are returned to the caller
//! unchanged. Nothing is retried.

pub mod comments;


use tracing::{debug, info, warn};

use crate::context::ContextBuilder;
use crate::error::PipelineError;
use crate::git_ops::{fix_branch_name, SourceControl};
use crate::github::{Comment, IssueReport, IssueTracker};
use crate::model::{Confidence, FixModel, FixProposal};
use crate::session::SessionTally;
use crate::testing::{TestCommand, TestRunner};
use crate::util::run_blocking;
use crate::vagueness::is_too_vague;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueState {
    Received,
    Clarify,
    NoCodeNeeded,
    Publishing,
    Published,
    RolledBack,
}

impl IssueState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, IssueState::Received | IssueState::Publishing)
    }
}

/// Where a proposal sends the issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Clarify(Vec<String>),
    NoCodeNeeded,
    Publish,
}

/// Route a proposal. A request for more information always wins, even when
/// the model also sent file changes.
pub fn decide(proposal: &FixProposal) -> Decision {
    if proposal.needs_more_info {
        let questions = if proposal.questions.is_empty() {
            comments::TEMPLATE_QUESTIONS
                .iter()
                .map(|q| q.to_string())
                .collect()
        } else {
            proposal.questions.clone()
        };
        return Decision::Clarify(questions);
    }
    if proposal.file_changes.is_empty() {
        Decision::NoCodeNeeded
    } else {
        Decision::Publish
    }
}

/// How an attempt ended. A rollback is reported as `PipelineError::TestFailure`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Clarified {
        questions: usize,
    },
    NoCodeNeeded {
        closed: bool,
    },
    Published {
        url: String,
        branch: String,
        closed: bool,
    },
}

impl Resolution {
    pub fn state(&self) -> IssueState {
        match self {
            Resolution::Clarified { .. } => IssueState::Clarify,
            Resolution::NoCodeNeeded { .. } => IssueState::NoCodeNeeded,
            Resolution::Published { .. } => IssueState::Published,
        }
    }
}

/// An issue needs another attempt unless the newest comment is ours.
pub fn needs_processing(comments: &[Comment]) -> bool {
    match comments.last() {
        Some(last) => !comments::is_marked(&last.body),
        None => true,
    }
}

/// Drives attempts against the injected collaborators.
///
/// Clone, context walk, test run and push block. On a multi-threaded runtime
/// they run through [`run_blocking`]; on a current-thread runtime they stall
/// that runtime for their duration.
pub struct Pipeline<'a> {
    tracker: &'a dyn IssueTracker,
    model: &'a dyn FixModel,
    tests: &'a dyn TestRunner,
    context: ContextBuilder,
}

fn enter(issue: u64, state: IssueState) {
    debug!(issue, ?state, "state transition");
}

impl<'a> Pipeline<'a> {
    pub fn new(
        tracker: &'a dyn IssueTracker,
        model: &'a dyn FixModel,
        tests: &'a dyn TestRunner,
    ) -> Self {
        Self {
            tracker,
            model,
            tests,
            context: ContextBuilder::default(),
        }
    }

    pub fn with_context_builder(mut self, context: ContextBuilder) -> Self {
        self.context = context;
        self
    }

    /// Open issues still waiting on the pipeline. An issue whose comments
    /// cannot be fetched is kept.
    pub async fn pending_issues(&self, limit: usize) -> Result<Vec<IssueReport>, PipelineError> {
        let issues = self.tracker.list_open_issues(limit).await?;
        let mut pending = Vec::with_capacity(issues.len());
        for issue in issues {
            match self.tracker.comments(issue.number).await {
                Ok(comments) if !needs_processing(&comments) => {
                    debug!(issue = issue.number, "already answered, skipping");
                }
                Ok(_) => pending.push(issue),
                Err(err) => {
                    warn!(issue = issue.number, %err, "could not fetch comments; keeping issue");
                    pending.push(issue);
                }
            }
        }
        Ok(pending)
    }

    /// Run one attempt against `issue` using the working copy behind `source`.
    pub async fn process_issue(
        &self,
        source: &mut dyn SourceControl,
        issue: &IssueReport,
        tally: &SessionTally,
    ) -> Result<Resolution, PipelineError> {
        let number = issue.number;
        enter(number, IssueState::Received);

        if is_too_vague(&issue.title, &issue.body) {
            info!(issue = number, "issue too vague, asking for details");
            self.tracker
                .add_comment(number, &comments::vague_issue_request())
                .await?;
            tally.record_question_asked();
            enter(number, IssueState::Clarify);
            return Ok(Resolution::Clarified {
                questions: comments::TEMPLATE_QUESTIONS.len(),
            });
        }

        let base_branch = run_blocking(|| source.clone_repo())?;
        let context = run_blocking(|| {
            self.context
                .build(source.working_dir(), &issue.title, &issue.body)
        })?;
        info!(issue = number, files = context.file_count, "built repository context");

        tally.record_model_call(self.model.cost_per_call());
        info!(issue = number, model = %self.model.name(), "requesting fix proposal");
        let proposal = self.model.propose_fix(issue, &context).await?;
        debug!(
            issue = number,
            confidence = proposal.confidence.label(),
            changes = proposal.file_changes.len(),
            "received proposal"
        );

        match decide(&proposal) {
            Decision::Clarify(questions) => {
                self.tracker
                    .add_comment(number, &comments::model_questions(&questions))
                    .await?;
                tally.record_question_asked();
                info!(issue = number, questions = questions.len(), "posted questions");
                enter(number, IssueState::Clarify);
                Ok(Resolution::Clarified {
                    questions: questions.len(),
                })
            }
            Decision::NoCodeNeeded => {
                self.tracker
                    .add_comment(number, &comments::no_code_response(&proposal.explanation))
                    .await?;
                let closed = self.close(number).await;
                tally.record_issue_handled();
                info!(issue = number, "responded without code changes");
                enter(number, IssueState::NoCodeNeeded);
                Ok(Resolution::NoCodeNeeded { closed })
            }
            Decision::Publish => {
                enter(number, IssueState::Publishing);
                let result = self
                    .publish(source, issue, &proposal, &base_branch, tally)
                    .await;
                if matches!(result, Err(ref err) if err.is_test_failure()) {
                    enter(number, IssueState::RolledBack);
                }
                result
            }
        }
    }

    async fn publish(
        &self,
        source: &mut dyn SourceControl,
        issue: &IssueReport,
        proposal: &FixProposal,
        base_branch: &str,
        tally: &SessionTally,
    ) -> Result<Resolution, PipelineError> {
        let number = issue.number;
        let branch = fix_branch_name(number, &issue.title);
        source.create_branch(&branch)?;

        for change in &proposal.file_changes {
            source.write_file(&change.path, change.content.as_bytes())?;
            debug!(issue = number, path = %change.path, "applied change");
        }

        let tested = run_blocking(|| self.run_tests(&*source))?;

        source.commit(&comments::commit_message(issue, &proposal.explanation))?;
        run_blocking(|| source.push(&branch))?;

        let url = self
            .tracker
            .create_change_request(
                &comments::change_request_title(issue),
                &comments::change_request_body(issue, proposal, tested.as_ref()),
                &branch,
                base_branch,
            )
            .await?;
        tally.record_change_published();
        tally.record_issue_handled();
        info!(issue = number, %url, "opened pull request");

        let closed = if proposal.confidence == Confidence::High {
            if let Err(err) = self
                .tracker
                .add_comment(number, &comments::closing_comment(proposal, &url))
                .await
            {
                warn!(issue = number, %err, "could not post closing comment");
            }
            self.close(number).await
        } else {
            if let Err(err) = self
                .tracker
                .add_comment(number, &comments::change_request_notice(&url))
                .await
            {
                warn!(issue = number, %err, "could not link pull request on issue");
            }
            false
        };

        enter(number, IssueState::Published);
        Ok(Resolution::Published {
            url,
            branch,
            closed,
        })
    }

    /// Returns the command that passed, `None` when no tests were detected.
    fn run_tests(&self, source: &dyn SourceControl) -> Result<Option<TestCommand>, PipelineError> {
        let Some(command) = self.tests.detect_command(source.working_dir()) else {
            info!("no test command detected, publishing without test validation");
            return Ok(None);
        };

        let outcome = self.tests.run(source.working_dir(), &command)?;
        if !outcome.passed {
            warn!(%command, "tests failed, abandoning changes");
            return Err(PipelineError::TestFailure {
                command: command.to_string(),
                output: outcome.output,
            });
        }
        info!(%command, duration_ms = outcome.duration_ms, "tests passed");
        Ok(Some(command))
    }

    /// Close failures are logged, never fatal.
    async fn close(&self, number: u64) -> bool {
        match self.tracker.close_issue(number).await {
            Ok(()) => {
                info!(issue = number, "closed issue");
                true
            }
            Err(err) => {
                warn!(issue = number, %err, "could not close issue");
                false
            }
        }
    }
}
