use serde::Deserialize;

use super::{Confidence, FileChange, FixProposal};
use crate::error::PipelineError;
use crate::util::truncate_chars;

const PREVIEW_CHARS: usize = 200;

#[derive(Deserialize)]
struct ProposalJson {
    #[serde(default)]
    confidence: String,
    #[serde(default)]
    needs_more_info: bool,
    #[serde(default)]
    questions: Vec<String>,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    files: Vec<FileJson>,
}

#[derive(Deserialize)]
struct FileJson {
    path: String,
    #[serde(default)]
    content: String,
}

/// Strip markdown code fences from a response
fn strip_markdown_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let clean = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let clean = clean.trim_end();
    clean.strip_suffix("```").unwrap_or(clean).trim()
}

/// The outermost `{ ... }` span, for models that wrap the JSON in prose.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start <= end).then(|| &text[start..=end])
}

/// Parse a model response into a fix proposal.
pub fn parse_fix(response: &str) -> Result<FixProposal, PipelineError> {
    let clean = strip_markdown_fences(response);

    let parsed: ProposalJson = match serde_json::from_str(clean) {
        Ok(parsed) => parsed,
        Err(first_err) => extract_json_object(clean)
            .and_then(|fragment| serde_json::from_str(fragment).ok())
            .ok_or_else(|| {
                PipelineError::Parse(format!(
                    "{} (response starts with: {})",
                    first_err,
                    truncate_chars(clean, PREVIEW_CHARS)
                ))
            })?,
    };

    let file_changes = parsed
        .files
        .into_iter()
        .filter(|f| !f.path.trim().is_empty())
        .map(|f| FileChange {
            path: f.path.trim().to_string(),
            content: f.content,
        })
        .collect();

    Ok(FixProposal {
        confidence: Confidence::from_label(&parsed.confidence),
        needs_more_info: parsed.needs_more_info,
        questions: parsed
            .questions
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect(),
        explanation: parsed.explanation,
        file_changes,
    })
}
