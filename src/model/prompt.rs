use std::fmt::Write;

use crate::context::RepositoryContext;
use crate::github::IssueReport;
use crate::util::truncate_chars;

/// Per-file content cap inside the prompt.
pub const MAX_PROMPT_FILE_CHARS: usize = 5000;

pub const SYSTEM_PROMPT: &str =
    "You are an expert software developer. Analyze issues and provide fixes in a structured JSON format.";

const TASK: &str = r#"# Task

Analyze the issue and provide a fix. Your response MUST be in the following JSON format:

{
  "confidence": "high|medium|low",
  "needs_more_info": false,
  "questions": [],
  "explanation": "Brief explanation of what the fix does",
  "files": [
    {
      "path": "relative/path/to/file.ext",
      "content": "complete file content with the fix applied"
    }
  ]
}

Instructions:
- If you're CONFIDENT you understand the issue and can fix it, set confidence to "high" and provide the fix
- If you need more information, set "needs_more_info" to true and list specific "questions" to ask in the issue
- If the issue is a question or discussion that needs no code change, return an empty "files" list and answer it in "explanation"
- Provide COMPLETE file content, not diffs or patches
- Only include files that need to be modified or created
- Use paths relative to the repository root
- Keep explanations concise but clear
- Return valid JSON only, no markdown code blocks

Now provide the fix:"#;

/// Render the user prompt for one issue. Files appear in context order.
pub fn build_prompt(issue: &IssueReport, context: &RepositoryContext) -> String {
    let mut prompt = String::new();

    let _ = write!(
        prompt,
        "# Issue to Fix\n\n**Title:** {}\n\n**Description:**\n{}\n\n",
        issue.title, issue.body
    );

    prompt.push_str("# Repository Context\n\n## Directory Structure\n```\n");
    prompt.push_str(&context.structure);
    prompt.push_str("\n```\n\n");

    if !context.files.is_empty() {
        prompt.push_str("## Key Files\n\n");
        for file in &context.files {
            let content = if file.content.chars().count() > MAX_PROMPT_FILE_CHARS {
                format!(
                    "{}\n... (truncated)",
                    truncate_chars(&file.content, MAX_PROMPT_FILE_CHARS)
                )
            } else {
                file.content.clone()
            };
            let _ = write!(prompt, "### {}\n```\n{}\n```\n\n", file.path, content);
        }
    }

    prompt.push_str(TASK);
    prompt
}
