//! Cheap pre-filter for issue reports too thin to attempt a fix on
//!
//! Runs before any clone or model call. Leans toward letting reports
//! through: a missed vague report costs one model call, a false positive
//! denies the reporter a real attempt.

use crate::context::relevance::has_source_extension;

/// Generic complaint phrases that carry no diagnostic detail.
const GENERIC_PHRASES: &[&str] = &[
    "something is wrong",
    "something broken",
    "doesn't work",
    "not working",
    "broken",
    "fix this",
    "fix it",
    "help",
    "issue",
    "problem",
];

const SHORT_TITLE_CHARS: usize = 20;
const SHORT_BODY_CHARS: usize = 50;
const SHORT_REPORT_CHARS: usize = 30;

/// True when the report should get a clarification request instead of a fix attempt.
pub fn is_too_vague(title: &str, body: &str) -> bool {
    let combined = format!("{} {}", title, body).to_lowercase();

    let short_title = title.chars().count() < SHORT_TITLE_CHARS;
    let short_body = body.chars().count() < SHORT_BODY_CHARS;
    if short_title && short_body && GENERIC_PHRASES.iter().any(|p| combined.contains(p)) {
        return true;
    }

    !mentions_path(&combined) && combined.chars().count() < SHORT_REPORT_CHARS
}

fn mentions_path(text: &str) -> bool {
    text.contains('/')
        || text.split_whitespace().any(|word| {
            let word = word.trim_matches(|c: char| !c.is_alphanumeric());
            has_source_extension(word)
        })
}
