//! Relevance scoring: how strongly an issue points at a file path
//!
//! Scoring is substring containment only, so the same issue text and path
//! always produce the same score.

/// Extensions treated as source code, both for mentions and file eligibility.
pub const SOURCE_EXTENSIONS: &[&str] = &[
    ".go", ".py", ".js", ".ts", ".jsx", ".tsx", ".java", ".c", ".cpp", ".h", ".hpp", ".rs",
    ".rb", ".php", ".cs", ".swift", ".kt", ".scala", ".sh", ".bash", ".html", ".css", ".scss",
    ".vue",
];

/// Path fragments that usually mark an entry point.
const ENTRY_POINT_HINTS: &[&str] = &["main", "index", "app", "server"];

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "is",
    "are", "was", "were", "been", "be", "have", "has", "had", "do", "does", "did", "will",
    "would", "should", "could", "this", "that", "these", "those", "i", "you", "he", "she", "it",
    "we", "they", "please", "help", "need", "want", "issue", "problem", "there", "their", "when",
    "then", "than", "what", "which", "from", "into",
];

/// Characters stripped from either end of a candidate mention.
const MENTION_PUNCTUATION: &str = "`,\"'()[]<>{}:;!?";

const MENTION_BONUS: u32 = 100;
const KEYWORD_BONUS: u32 = 10;
const ENTRY_POINT_BONUS: u32 = 5;
const BASELINE: u32 = 1;

/// True when `path` ends with one of the source extensions (case-insensitive).
pub fn has_source_extension(path: &str) -> bool {
    let lower = path.to_lowercase();
    SOURCE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Mentions and keywords extracted once per issue and reused for every file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueSignals {
    pub mentions: Vec<String>,
    pub keywords: Vec<String>,
}

impl IssueSignals {
    pub fn from_issue(title: &str, body: &str) -> Self {
        let text = format!("{} {}", title, body);
        Self {
            mentions: extract_mentions(&text),
            keywords: extract_keywords(&text),
        }
    }

    pub fn score(&self, path: &str) -> u32 {
        score(path, &self.mentions, &self.keywords)
    }
}

/// File paths mentioned in free text: tokens with a separator and a source extension.
pub fn extract_mentions(text: &str) -> Vec<String> {
    let mut mentions = Vec::new();

    for word in text.to_lowercase().split_whitespace() {
        let token = word
            .trim_start_matches(|c: char| MENTION_PUNCTUATION.contains(c))
            .trim_end_matches(|c: char| MENTION_PUNCTUATION.contains(c) || c == '.')
            .replace('\\', "/");
        let token = token.strip_prefix("./").unwrap_or(&token);

        if token.contains('/') && has_source_extension(token) && !mentions.iter().any(|m| m == token)
        {
            mentions.push(token.to_string());
        }
    }

    mentions
}

/// Meaningful words: alphanumeric runs longer than three characters, minus stop words.
///
/// Order follows first appearance; repeats are dropped.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut keywords: Vec<String> = Vec::new();

    for word in lower.split(|c: char| !c.is_ascii_alphanumeric()) {
        if word.len() <= 3 || STOP_WORDS.contains(&word) {
            continue;
        }
        if !keywords.iter().any(|k| k == word) {
            keywords.push(word.to_string());
        }
    }

    keywords
}

/// Score a candidate path against the issue's mentions and keywords.
///
/// Every eligible file scores at least 1.
pub fn score(path: &str, mentions: &[String], keywords: &[String]) -> u32 {
    let lower_path = path.to_lowercase();
    let mut total = 0;

    for mention in mentions {
        if lower_path.contains(mention.as_str()) {
            total += MENTION_BONUS;
        }
    }

    for keyword in keywords {
        if lower_path.contains(keyword.as_str()) {
            total += KEYWORD_BONUS;
        }
    }

    if total == 0 {
        if ENTRY_POINT_HINTS.iter().any(|hint| lower_path.contains(hint)) {
            total += ENTRY_POINT_BONUS;
        }
        total += BASELINE;
    }

    total
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_extract_mentions_strips_punctuation() {
        let mentions =
            extract_mentions("Crash in `src/auth/login.ts`, see (lib/util.go). Also README.md");
        assert_eq!(mentions, strings(&["src/auth/login.ts", "lib/util.go"]));
    }

    #[test]
    fn test_extract_mentions_requires_separator_and_extension() {
        assert!(extract_mentions("main.go is broken").is_empty());
        assert!(extract_mentions("see docs/guide.md").is_empty());
        assert_eq!(
            extract_mentions("check ./cmd/Server.GO please"),
            strings(&["cmd/server.go"])
        );
    }

    #[test]
    fn test_extract_mentions_normalizes_backslashes() {
        assert_eq!(
            extract_mentions(r"error in src\win\path.cs"),
            strings(&["src/win/path.cs"])
        );
    }

    #[test]
    fn test_extract_keywords_drops_short_and_stop_words() {
        let keywords = extract_keywords("Please help: the Login button does NOT work with OAuth");
        assert_eq!(keywords, strings(&["login", "button", "work", "oauth"]));
    }

    #[test]
    fn test_extract_keywords_dedupes_in_first_seen_order() {
        let keywords = extract_keywords("parser parser-error parser");
        assert_eq!(keywords, strings(&["parser", "error"]));
    }

    #[test]
    fn test_score_mention_outweighs_keywords() {
        let mentions = strings(&["src/util/parse.go"]);
        let with = score("src/util/parse.go", &mentions, &[]);
        let without = score("src/util/other.go", &mentions, &[]);
        assert_eq!(with, 100);
        assert_eq!(without, BASELINE);
    }

    #[test]
    fn test_score_mention_bonus_is_monotonic() {
        let keywords = strings(&["parse", "util"]);
        let mentions = strings(&["util/parse.go"]);
        let base = score("src/util/parse.go", &[], &keywords);
        let boosted = score("src/util/parse.go", &mentions, &keywords);
        assert_eq!(boosted, base + 100);
    }

    #[test]
    fn test_score_keywords_are_additive() {
        let keywords = strings(&["login", "auth"]);
        assert_eq!(score("src/auth/login.ts", &[], &keywords), 20);
        assert_eq!(score("src/auth/session.ts", &[], &keywords), 10);
    }

    #[test]
    fn test_score_baseline_and_entry_points() {
        assert_eq!(score("src/main.rs", &[], &[]), 6);
        assert_eq!(score("src/App.tsx", &[], &[]), 6);
        assert_eq!(score("lib/widgets.py", &[], &[]), 1);
    }

    #[test]
    fn test_score_skips_entry_bonus_once_matched() {
        let keywords = strings(&["server"]);
        assert_eq!(score("cmd/server.go", &[], &keywords), 10);
    }

    #[test]
    fn test_signals_from_empty_issue_score_baseline() {
        let signals = IssueSignals::from_issue("", "");
        assert!(signals.mentions.is_empty());
        assert!(signals.keywords.is_empty());
        assert_eq!(signals.score("pkg/thing.go"), 1);
    }

    #[test]
    fn test_has_source_extension() {
        assert!(has_source_extension("a/b/C.RS"));
        assert!(has_source_extension("index.vue"));
        assert!(!has_source_extension("README.md"));
        assert!(!has_source_extension("Makefile"));
    }
}
