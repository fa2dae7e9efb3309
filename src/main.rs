use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use issue_mender::config::{Config, Credentials, ModelService};
use issue_mender::git_ops::GitWorkingCopy;
use issue_mender::github::{GitHubClient, IssueReport};
use issue_mender::model;
use issue_mender::setup::{self, Console, IssueSelection};
use issue_mender::testing::ProjectTestRunner;
use issue_mender::util::truncate;
use issue_mender::{Pipeline, PipelineError, Resolution, SessionTally};

const MAX_TEST_OUTPUT_CHARS: usize = 2000;

#[derive(Parser, Debug)]
#[command(
    name = "issue-mender",
    about = "Triage open GitHub issues: propose fixes with a model and ship them behind tests",
    version
)]
struct Args {
    /// Repository URL or owner/repo
    #[arg(long)]
    repo_url: Option<String>,

    /// Repository owner (with --repo)
    #[arg(long, requires = "repo")]
    owner: Option<String>,

    /// Repository name (with --owner)
    #[arg(long, requires = "owner")]
    repo: Option<String>,

    /// GitHub token (defaults to GITHUB_TOKEN, then the keychain)
    #[arg(long)]
    github_token: Option<String>,

    /// AI service: openai, xai, or ollama
    #[arg(long)]
    ai_service: Option<ModelService>,

    /// API key for the AI service
    #[arg(long)]
    ai_key: Option<String>,

    /// Model name (defaults to the service's default)
    #[arg(long)]
    ai_model: Option<String>,

    /// Ollama server URL
    #[arg(long)]
    ollama_url: Option<String>,

    /// Directory for working copies
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Process only this issue
    #[arg(long, conflicts_with = "all")]
    issue: Option<u64>,

    /// Process every pending issue
    #[arg(long)]
    all: bool,

    /// Maximum number of open issues to fetch
    #[arg(long)]
    limit: Option<usize>,

    /// Skip confirmation prompts
    #[arg(short, long)]
    yes: bool,

    /// Run interactive setup before processing
    #[arg(long)]
    setup: bool,
}

impl Args {
    fn names_repository(&self) -> bool {
        self.repo_url.is_some() || self.owner.is_some()
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("issue_mender=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Flags win over the saved config for this run only.
fn apply_overrides(args: &Args, config: &mut Config, credentials: &mut Credentials) -> Result<()> {
    if let Some(url) = &args.repo_url {
        config.set_repository(url)?;
    }
    if let (Some(owner), Some(repo)) = (&args.owner, &args.repo) {
        config.set_repository(&format!("{}/{}", owner, repo))?;
    }
    if let Some(service) = args.ai_service {
        if service != config.model_service {
            config.model_service = service;
            config.model_name.clear();
            credentials.model_api_key = config.model_api_key();
        }
    }
    if let Some(model) = &args.ai_model {
        config.model_name = model.clone();
    }
    if let Some(url) = &args.ollama_url {
        config.ollama_url = url.clone();
    }
    if let Some(dir) = &args.work_dir {
        config.work_dir = dir.clone();
    }
    if let Some(limit) = args.limit {
        config.issue_limit = limit;
    }
    if let Some(token) = &args.github_token {
        credentials.github_token = Some(token.clone());
    }
    if let Some(key) = &args.ai_key {
        credentials.model_api_key = Some(key.clone());
    }
    Ok(())
}

fn choose_issues<R: BufRead, W: Write>(
    args: &Args,
    pending: Vec<IssueReport>,
    console: &mut Console<R, W>,
    cost_per_call: f64,
) -> Result<Vec<IssueReport>> {
    if let Some(number) = args.issue {
        let issue = pending
            .into_iter()
            .find(|i| i.number == number)
            .ok_or_else(|| anyhow!("issue #{} is not open or is already waiting on a reply", number))?;
        return Ok(vec![issue]);
    }

    let selection = if args.all {
        IssueSelection::All
    } else {
        setup::select_issues(console, &pending).map_err(|e| anyhow!(e))?
    };

    match selection {
        IssueSelection::One(number) => Ok(pending.into_iter().filter(|i| i.number == number).collect()),
        IssueSelection::All => {
            if pending.len() > 1 && !args.yes {
                let confirmed = setup::confirm_fix_all(console, pending.len(), cost_per_call)
                    .map_err(|e| anyhow!(e))?;
                if !confirmed {
                    return Ok(Vec::new());
                }
            }
            Ok(pending)
        }
        IssueSelection::Quit => Ok(Vec::new()),
    }
}

fn report_resolution(issue: &IssueReport, resolution: &Resolution) {
    match resolution {
        Resolution::Clarified { questions } => {
            println!("✓ Asked {} question(s) on issue #{}", questions, issue.number);
        }
        Resolution::NoCodeNeeded { closed } => {
            println!("✓ Responded to issue #{} without code changes", issue.number);
            if *closed {
                println!("✓ Issue #{} closed", issue.number);
            }
        }
        Resolution::Published {
            url,
            branch,
            closed,
        } => {
            println!("✓ Pushed {}", branch);
            println!("✓ Pull request created: {}", url);
            if *closed {
                println!("✓ Issue #{} closed (high confidence)", issue.number);
            }
        }
    }
}

fn report_failure(issue: &IssueReport, err: &PipelineError) {
    match err {
        PipelineError::TestFailure { command, output } => {
            println!("✗ Tests failed ({}). Changes for #{} were abandoned.", command, issue.number);
            println!("Test output:");
            println!("{}", truncate(output, MAX_TEST_OUTPUT_CHARS));
        }
        other => {
            error!(issue = issue.number, err = %other, "attempt failed");
            println!("✗ Issue #{} failed: {}", issue.number, other);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let mut console = Console::stdio();
    let mut config = Config::load();

    let mut credentials = if args.setup || (!Config::exists() && !args.names_repository()) {
        setup::interactive_setup(&mut console, &mut config)
            .await
            .map_err(|e| anyhow!("setup failed: {}", e))?
    } else {
        config.credentials()
    };

    apply_overrides(&args, &mut config, &mut credentials)?;
    config.validate(&credentials)?;

    let token = credentials
        .github_token
        .clone()
        .context("GitHub token is required")?;
    let tracker = GitHubClient::new(token.clone(), &config.repo_owner, &config.repo_name)?;
    let fixer = model::build_model(&config, &credentials)?;
    let tests = ProjectTestRunner::new(Duration::from_secs(config.test_timeout_secs));
    let pipeline = Pipeline::new(&tracker, fixer.as_ref(), &tests);
    let tally = SessionTally::new();

    info!(
        repo = %format!("{}/{}", config.repo_owner, config.repo_name),
        model = %fixer.name(),
        "fetching open issues"
    );
    let pending = pipeline.pending_issues(config.issue_limit).await?;
    if pending.is_empty() {
        println!("No open issues need attention.");
        return Ok(());
    }

    let selected = choose_issues(&args, pending, &mut console, fixer.cost_per_call())?;
    let total = selected.len();

    for (index, issue) in selected.iter().enumerate() {
        println!();
        println!("{}", "═".repeat(66));
        println!("Issue #{}: {}", issue.number, issue.title);
        println!("{}", "═".repeat(66));

        let mut source =
            GitWorkingCopy::new(&config.work_dir, &config.repo_owner, &config.repo_name, &token);
        let result = pipeline.process_issue(&mut source, issue, &tally).await;
        if let Err(err) = source.remove() {
            warn!(issue = issue.number, err = %format!("{:#}", err), "could not remove working copy");
        }

        match result {
            Ok(resolution) => report_resolution(issue, &resolution),
            Err(err) => {
                report_failure(issue, &err);
                let remaining = total - index - 1;
                if remaining > 0 && !args.yes {
                    let keep_going = setup::confirm_continue(&mut console, remaining)
                        .map_err(|e| anyhow!(e))?;
                    if !keep_going {
                        break;
                    }
                }
            }
        }
    }

    println!();
    println!("{}", "═".repeat(66));
    println!("{}", tally.snapshot());
    Ok(())
}
