//! Test runner detection and execution
//!
//! Detects the project type of a working copy and runs its test suite
//! under a timeout.

use std::fmt;
use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::PipelineError;
use crate::util::run_command_with_timeout;

pub const DEFAULT_TEST_TIMEOUT_SECS: u64 = 600;

/// Detected project type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectType {
    Node,
    Go,
    Python,
    Rust,
    Maven,
    Gradle,
    Php,
}

impl ProjectType {
    pub fn name(&self) -> &'static str {
        match self {
            ProjectType::Node => "Node.js",
            ProjectType::Go => "Go",
            ProjectType::Python => "Python",
            ProjectType::Rust => "Rust",
            ProjectType::Maven => "Maven",
            ProjectType::Gradle => "Gradle",
            ProjectType::Php => "PHP",
        }
    }

    fn command(&self) -> TestCommand {
        let (program, args): (&str, &[&str]) = match self {
            ProjectType::Node => ("npm", &["test"]),
            ProjectType::Go => ("go", &["test", "./..."]),
            ProjectType::Python => ("python", &["-m", "pytest"]),
            ProjectType::Rust => ("cargo", &["test"]),
            ProjectType::Maven => ("mvn", &["test"]),
            ProjectType::Gradle => ("gradle", &["test"]),
            ProjectType::Php => ("php", &["vendor/bin/phpunit"]),
        };
        TestCommand {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Marker files checked in order; the first hit wins.
const MARKERS: &[(&str, ProjectType)] = &[
    ("package.json", ProjectType::Node),
    ("go.mod", ProjectType::Go),
    ("requirements.txt", ProjectType::Python),
    ("setup.py", ProjectType::Python),
    ("Cargo.toml", ProjectType::Rust),
    ("pom.xml", ProjectType::Maven),
    ("build.gradle", ProjectType::Gradle),
    ("composer.json", ProjectType::Php),
];

/// Detect project type from files in directory
pub fn detect_project_type(repo_path: &Path) -> Option<ProjectType> {
    MARKERS
        .iter()
        .find(|(marker, _)| repo_path.join(marker).is_file())
        .map(|(_, project)| *project)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl fmt::Display for TestCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Result of running tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    pub passed: bool,
    pub output: String,
    pub duration_ms: u64,
}

pub trait TestRunner: Send + Sync {
    fn detect_command(&self, repo_path: &Path) -> Option<TestCommand>;

    /// Run `command` in `repo_path`. A command that cannot start or times out counts as failed.
    fn run(&self, repo_path: &Path, command: &TestCommand) -> Result<TestOutcome, PipelineError>;
}

/// Runs the conventional test command for the detected project type.
#[derive(Debug, Clone)]
pub struct ProjectTestRunner {
    timeout: Duration,
}

impl Default for ProjectTestRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TEST_TIMEOUT_SECS))
    }
}

impl ProjectTestRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl TestRunner for ProjectTestRunner {
    fn detect_command(&self, repo_path: &Path) -> Option<TestCommand> {
        let project = detect_project_type(repo_path)?;
        debug!(project = project.name(), "detected project type");
        Some(project.command())
    }

    fn run(&self, repo_path: &Path, command: &TestCommand) -> Result<TestOutcome, PipelineError> {
        info!(%command, "running tests");
        let start = Instant::now();

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args).current_dir(repo_path);

        let outcome = match run_command_with_timeout(&mut cmd, self.timeout) {
            Ok(result) => {
                let mut output = result.combined_output();
                if result.timed_out {
                    output.push_str(&format!(
                        "\n(test command timed out after {}s)",
                        self.timeout.as_secs()
                    ));
                }
                TestOutcome {
                    passed: result.success(),
                    output,
                    duration_ms: start.elapsed().as_millis() as u64,
                }
            }
            Err(e) => TestOutcome {
                passed: false,
                output: format!("Failed to run {}: {}", command, e),
                duration_ms: start.elapsed().as_millis() as u64,
            },
        };

        Ok(outcome)
    }
}
