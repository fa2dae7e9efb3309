//! Interactive terminal prompts
//!
//! First-run setup (repository, credentials, model service), issue
//! selection, and the confirmations asked between issues.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use crate::config::{Config, Credentials, ModelService};
use crate::github::IssueReport;
use crate::model;
use crate::session::estimate_cost;
use crate::util::truncate_chars;

/// Line-based prompts over any reader/writer pair.
pub struct Console<R, W> {
    input: R,
    output: W,
}

impl Console<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn say(&mut self, line: &str) -> Result<(), String> {
        writeln!(self.output, "{}", line).map_err(|e| e.to_string())
    }

    /// Ask a question; returns the trimmed answer. Closed input is an error.
    pub fn prompt(&mut self, label: &str) -> Result<String, String> {
        write!(self.output, "  {}: ", label).map_err(|e| e.to_string())?;
        self.output.flush().map_err(|e| e.to_string())?;

        let mut line = String::new();
        let read = self.input.read_line(&mut line).map_err(|e| e.to_string())?;
        if read == 0 {
            return Err("input closed".to_string());
        }
        Ok(line.trim().to_string())
    }

    /// Like `prompt`, but never echoes the current value back.
    pub fn prompt_secret(&mut self, label: &str, has_current: bool) -> Result<Option<String>, String> {
        let label = if has_current {
            format!("{} (leave blank to keep the saved one)", label)
        } else {
            label.to_string()
        };
        let answer = self.prompt(&label)?;
        Ok(if answer.is_empty() { None } else { Some(answer) })
    }

    pub fn prompt_with_default(&mut self, label: &str, default: &str) -> Result<String, String> {
        if default.is_empty() {
            return self.prompt(label);
        }
        let answer = self.prompt(&format!("{} [{}]", label, default))?;
        Ok(if answer.is_empty() {
            default.to_string()
        } else {
            answer
        })
    }

    /// Numbered menu. Blank picks `default`; a typed value that is not a
    /// number is returned as-is so free-form model names still work.
    pub fn prompt_with_options(
        &mut self,
        label: &str,
        options: &[String],
        default: usize,
    ) -> Result<String, String> {
        for (i, option) in options.iter().enumerate() {
            let marker = if i == default { " (default)" } else { "" };
            self.say(&format!("    [{}] {}{}", i + 1, option, marker))?;
        }
        loop {
            let answer = self.prompt(label)?;
            if answer.is_empty() {
                return Ok(options.get(default).cloned().unwrap_or_default());
            }
            match parse_choice(&answer, options.len()) {
                Some(index) => return Ok(options[index].clone()),
                None if answer.parse::<usize>().is_err() => return Ok(answer),
                None => self.say(&format!("  Please enter 1-{}.", options.len()))?,
            }
        }
    }

    pub fn confirm(&mut self, label: &str, default: bool) -> Result<bool, String> {
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        loop {
            let answer = self.prompt(&format!("{} {}", label, hint))?;
            match parse_yes_no(&answer, default) {
                Some(value) => return Ok(value),
                None => self.say("  Please answer y or n.")?,
            }
        }
    }
}

/// 1-based menu choice into a 0-based index.
pub fn parse_choice(input: &str, len: usize) -> Option<usize> {
    match input.trim().parse::<usize>() {
        Ok(n) if (1..=len).contains(&n) => Some(n - 1),
        _ => None,
    }
}

pub fn parse_yes_no(input: &str, default: bool) -> Option<bool> {
    match input.trim().to_lowercase().as_str() {
        "" => Some(default),
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSelection {
    One(u64),
    All,
    Quit,
}

/// `0` means every listed issue, `q` quits, anything else must be a listed number.
pub fn parse_issue_selection(input: &str, available: &[u64]) -> Result<IssueSelection, String> {
    let input = input.trim().trim_start_matches('#');
    if input.eq_ignore_ascii_case("q") || input.eq_ignore_ascii_case("quit") {
        return Ok(IssueSelection::Quit);
    }
    let number: u64 = input
        .parse()
        .map_err(|_| format!("'{}' is not an issue number", input))?;
    if number == 0 {
        return Ok(IssueSelection::All);
    }
    if available.contains(&number) {
        Ok(IssueSelection::One(number))
    } else {
        Err(format!("#{} is not in the list", number))
    }
}

/// List `issues` and ask which to process.
pub fn select_issues<R: BufRead, W: Write>(
    console: &mut Console<R, W>,
    issues: &[IssueReport],
) -> Result<IssueSelection, String> {
    console.say("")?;
    console.say(&format!("  {} open issue(s) need attention:", issues.len()))?;
    for issue in issues {
        console.say(&format!(
            "    #{:<5} {}",
            issue.number,
            truncate_chars(&issue.title, 70)
        ))?;
    }
    console.say("")?;

    let available: Vec<u64> = issues.iter().map(|i| i.number).collect();
    loop {
        let answer = console.prompt("Issue number to fix (0 = all, q = quit)")?;
        match parse_issue_selection(&answer, &available) {
            Ok(selection) => return Ok(selection),
            Err(message) => console.say(&format!("  {}", message))?,
        }
    }
}

/// Asked after a failed issue when more remain.
pub fn confirm_continue<R: BufRead, W: Write>(
    console: &mut Console<R, W>,
    remaining: usize,
) -> Result<bool, String> {
    console.confirm(
        &format!("Continue with the remaining {} issue(s)?", remaining),
        true,
    )
}

/// Shows the estimated spend before processing every issue.
pub fn confirm_fix_all<R: BufRead, W: Write>(
    console: &mut Console<R, W>,
    issue_count: usize,
    cost_per_call: f64,
) -> Result<bool, String> {
    let estimate = estimate_cost(issue_count, cost_per_call);
    if estimate > 0.0 {
        console.say(&format!(
            "  Estimated cost for {} issue(s): ~${:.4}",
            issue_count, estimate
        ))?;
    } else {
        console.say(&format!("  {} issue(s) queued (local model, free)", issue_count))?;
    }
    console.confirm("Process all of them?", false)
}

/// Walk through every setting, store secrets, save the config.
pub async fn interactive_setup<R: BufRead, W: Write>(
    console: &mut Console<R, W>,
    config: &mut Config,
) -> Result<Credentials, String> {
    console.say("")?;
    console.say("  ─────────────────────────────────────────────────────────────────")?;
    console.say("  issue-mender setup")?;
    console.say("  ─────────────────────────────────────────────────────────────────")?;
    console.say("")?;

    loop {
        let current = if config.repo_owner.is_empty() {
            String::new()
        } else {
            format!("{}/{}", config.repo_owner, config.repo_name)
        };
        let repo = console.prompt_with_default("GitHub repository (URL or owner/repo)", &current)?;
        match config.set_repository(&repo) {
            Ok(()) => break,
            Err(err) => console.say(&format!("  {}", err))?,
        }
    }

    let mut credentials = config.credentials();

    console.say("")?;
    console.say("  A GitHub token with repo scope: https://github.com/settings/tokens")?;
    if let Some(token) =
        console.prompt_secret("GitHub token", credentials.github_token.is_some())?
    {
        config.store_github_token(&token);
        credentials.github_token = Some(token);
    }

    console.say("")?;
    console.say("  Which AI service should propose fixes?")?;
    let services: Vec<String> = ModelService::ALL.iter().map(|s| s.to_string()).collect();
    let default_service = ModelService::ALL
        .iter()
        .position(|s| *s == config.model_service)
        .unwrap_or(0);
    loop {
        let choice = console.prompt_with_options("Service", &services, default_service)?;
        match choice.parse::<ModelService>() {
            Ok(service) => {
                config.model_service = service;
                break;
            }
            Err(err) => console.say(&format!("  {}", err))?,
        }
    }
    credentials.model_api_key = config.model_api_key();

    if config.model_service.requires_api_key() {
        if let Some(key) = console.prompt_secret(
            &format!("{} API key", config.model_service),
            credentials.model_api_key.is_some(),
        )? {
            config.store_model_api_key(&key);
            credentials.model_api_key = Some(key);
        }
    } else {
        config.ollama_url = console.prompt_with_default("Ollama URL", &config.ollama_url)?;
    }

    console.say("")?;
    console.say("  Fetching available models...")?;
    let models = model::list_models(config, &credentials)
        .await
        .map_err(|e| e.to_string())?;
    let default_model = models
        .iter()
        .position(|m| *m == config.model_name)
        .unwrap_or(0);
    config.model_name = console.prompt_with_options("Model", &models, default_model)?;

    let work_dir = console.prompt_with_default(
        "Working directory for clones",
        &config.work_dir.display().to_string(),
    )?;
    config.work_dir = PathBuf::from(work_dir);

    config.save()?;

    console.say("")?;
    console.say("  ✓ Settings saved!")?;
    console.say(&format!("  ✓ Config location: {}", Config::config_location()))?;
    console.say("")?;

    Ok(credentials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::IssueStatus;

    fn console(input: &str) -> Console<&[u8], Vec<u8>> {
        Console::new(input.as_bytes(), Vec::new())
    }

    fn issue(number: u64, title: &str) -> IssueReport {
        IssueReport {
            number,
            title: title.to_string(),
            body: String::new(),
            status: IssueStatus::Open,
            html_url: String::new(),
        }
    }

    #[test]
    fn test_parse_issue_selection() {
        let available = [3, 7];
        assert_eq!(parse_issue_selection("7", &available), Ok(IssueSelection::One(7)));
        assert_eq!(parse_issue_selection("#3", &available), Ok(IssueSelection::One(3)));
        assert_eq!(parse_issue_selection(" 0 ", &available), Ok(IssueSelection::All));
        assert_eq!(parse_issue_selection("Q", &available), Ok(IssueSelection::Quit));
        assert!(parse_issue_selection("9", &available).is_err());
        assert!(parse_issue_selection("seven", &available).is_err());
    }

    #[test]
    fn test_parse_yes_no_and_choice() {
        assert_eq!(parse_yes_no("", true), Some(true));
        assert_eq!(parse_yes_no("YES", false), Some(true));
        assert_eq!(parse_yes_no("n", true), Some(false));
        assert_eq!(parse_yes_no("maybe", true), None);

        assert_eq!(parse_choice("2", 3), Some(1));
        assert_eq!(parse_choice("0", 3), None);
        assert_eq!(parse_choice("4", 3), None);
    }

    #[test]
    fn test_select_issues_reprompts_until_valid() {
        let mut console = console("12\nabc\n7\n");
        let issues = [issue(3, "Crash on start"), issue(7, "Null pointer")];
        let selection = select_issues(&mut console, &issues).unwrap();
        assert_eq!(selection, IssueSelection::One(7));

        let shown = String::from_utf8(console.output).unwrap();
        assert!(shown.contains("#7     Null pointer"));
        assert!(shown.contains("#12 is not in the list"));
        assert!(shown.contains("'abc' is not an issue number"));
    }

    #[test]
    fn test_prompt_with_options_accepts_number_name_or_default() {
        let options = vec!["gpt-4o".to_string(), "gpt-4o-mini".to_string()];

        let mut c = console("2\n");
        assert_eq!(c.prompt_with_options("Model", &options, 0).unwrap(), "gpt-4o-mini");

        let mut c = console("\n");
        assert_eq!(c.prompt_with_options("Model", &options, 1).unwrap(), "gpt-4o-mini");

        let mut c = console("o1-preview\n");
        assert_eq!(c.prompt_with_options("Model", &options, 0).unwrap(), "o1-preview");

        let mut c = console("9\n1\n");
        assert_eq!(c.prompt_with_options("Model", &options, 1).unwrap(), "gpt-4o");
    }

    #[test]
    fn test_confirm_fix_all_shows_estimate() {
        let mut c = console("y\n");
        assert!(confirm_fix_all(&mut c, 10, 0.002).unwrap());
        let shown = String::from_utf8(c.output).unwrap();
        assert!(shown.contains("~$0.0300"));

        let mut c = console("\n");
        assert!(!confirm_fix_all(&mut c, 2, 0.0).unwrap());
        assert!(String::from_utf8(c.output).unwrap().contains("free"));
    }

    #[test]
    fn test_confirm_continue_defaults_to_yes_and_reprompts() {
        let mut c = console("\n");
        assert!(confirm_continue(&mut c, 2).unwrap());

        let mut c = console("what\nn\n");
        assert!(!confirm_continue(&mut c, 2).unwrap());
    }

    #[test]
    fn test_prompt_secret_blank_keeps_current() {
        let mut c = console("\n");
        assert_eq!(c.prompt_secret("GitHub token", true).unwrap(), None);
        let shown = String::from_utf8(c.output).unwrap();
        assert!(shown.contains("leave blank"));

        let mut c = console("ghp_new\n");
        assert_eq!(c.prompt_secret("GitHub token", false).unwrap().as_deref(), Some("ghp_new"));
    }
}
