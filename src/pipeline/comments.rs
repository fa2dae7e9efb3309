//! Text the pipeline posts to the tracker and writes into commits
//!
//! Every comment ends with [`MARKER`] so a later run can tell whether the
//! newest comment on an issue is its own.

use crate::github::IssueReport;
use crate::model::{Confidence, FileChange, FixProposal};
use crate::testing::TestCommand;

/// Hidden marker carried by every comment the pipeline posts.
pub const MARKER: &str = "<!-- issue-mender -->";

const FOOTER: &str = "---\n\n<sub>🤖 Posted by issue-mender</sub>";

/// Asked when an issue is too vague to attempt, or the model wants more but says nothing specific.
pub const TEMPLATE_QUESTIONS: [&str; 5] = [
    "**What's the expected behavior?** What should happen?",
    "**What's the actual behavior?** What happens instead?",
    "**Steps to reproduce:** How can the problem be seen?",
    "**Any error messages?** Paste errors from the console or logs.",
    "**Which file(s) are affected?** (e.g. `src/main.js` or `components/Login.tsx`)",
];

fn signed(body: String) -> String {
    format!("{}\n\n{}\n{}", body.trim_end(), FOOTER, MARKER)
}

fn numbered<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, item.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn is_marked(body: &str) -> bool {
    body.contains(MARKER)
}

pub fn vague_issue_request() -> String {
    signed(format!(
        "## ❓ Need More Information\n\n\
         I'd like to help fix this issue, but I need more details to understand what's wrong.\n\n\
         Please provide:\n\n{}\n\n\
         The more detail you give, the better the fix will be.",
        numbered(&TEMPLATE_QUESTIONS)
    ))
}

pub fn model_questions(questions: &[String]) -> String {
    signed(format!(
        "## ❓ Need More Information\n\n\
         I need some clarification to fix this issue:\n\n{}\n\n\
         Please provide more details so I can create a proper fix.",
        numbered(questions)
    ))
}

pub fn no_code_response(explanation: &str) -> String {
    signed(format!(
        "## 💬 Response\n\n{}\n\n\
         This issue looks like a question or discussion rather than a change to the code. \
         If you need a specific code change, please reopen it with details about what should change.",
        explanation.trim()
    ))
}

pub fn confidence_banner(confidence: Confidence) -> &'static str {
    match confidence {
        Confidence::High => "✅ **High confidence** - This fix should resolve the issue.",
        Confidence::Medium => "⚠️ **Medium confidence** - Please review carefully.",
        Confidence::Low => {
            "⚠️ **Low confidence** - This is a best attempt, please review thoroughly."
        }
    }
}

pub fn commit_message(issue: &IssueReport, explanation: &str) -> String {
    format!("Fix #{}: {}\n\n{}", issue.number, issue.title, explanation.trim())
}

pub fn change_request_title(issue: &IssueReport) -> String {
    format!("Fix #{}: {}", issue.number, issue.title)
}

/// `tests` is the command that passed, if one was detected.
pub fn change_request_body(
    issue: &IssueReport,
    proposal: &FixProposal,
    tests: Option<&TestCommand>,
) -> String {
    let files = proposal
        .file_changes
        .iter()
        .map(|c| format!("- `{}`", c.path))
        .collect::<Vec<_>>()
        .join("\n");

    let test_note = match tests {
        Some(command) => format!(
            "### ✅ Tests Passed\n\nThe existing test suite (`{}`) passed with these changes applied.",
            command
        ),
        None => "### ⚠️ No Tests Run\n\nNo test command was detected for this repository.".to_string(),
    };

    signed(format!(
        "## 🔧 Automated Fix\n\n\
         Fixes #{}\n\n\
         **Confidence Level:** {}\n\n\
         ### 📋 Analysis\n\n{}\n\n\
         ### Modified Files\n\n{}\n\n\
         {}\n\n\
         Please verify the fix addresses the reported issue and check for side effects before merging.",
        issue.number,
        confidence_banner(proposal.confidence),
        proposal.explanation.trim(),
        files,
        test_note
    ))
}

/// First three paths, then "and N more".
pub fn file_summary(changes: &[FileChange]) -> String {
    let mut summary = changes
        .iter()
        .take(3)
        .map(|c| format!("`{}`", c.path))
        .collect::<Vec<_>>()
        .join(", ");
    if changes.len() > 3 {
        summary.push_str(&format!(" and {} more", changes.len() - 3));
    }
    summary
}

pub fn closing_comment(proposal: &FixProposal, change_request_url: &str) -> String {
    signed(format!(
        "## ✅ Issue Resolved\n\n\
         **What changed:**\n{}\n\n\
         **Files modified:** {}\n\n\
         **Pull request:** {}\n\n\
         Please review the pull request before merging. If the fix misses something, comment there.",
        proposal.explanation.trim(),
        file_summary(&proposal.file_changes),
        change_request_url
    ))
}

/// Posted when a fix ships below high confidence and the issue stays open.
pub fn change_request_notice(change_request_url: &str) -> String {
    signed(format!(
        "Pull request opened: {}\n\n\
         Leaving this issue open until the change has been reviewed.",
        change_request_url
    ))
}
