//! Configuration management for issue-mender
//!
//! Stores settings in ~/.config/issue-mender/config.json. Secrets go to the
//! system keychain; the JSON file only carries them for setups where the
//! keychain is unavailable.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

use crate::error::PipelineError;
use crate::keyring;
use crate::model::ollama::DEFAULT_OLLAMA_URL;
use crate::testing::DEFAULT_TEST_TIMEOUT_SECS;

pub const DEFAULT_ISSUE_LIMIT: usize = 100;
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Which model backend proposes fixes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelService {
    #[default]
    #[serde(alias = "chatgpt")]
    OpenAi,
    #[serde(alias = "grok")]
    Xai,
    Ollama,
}

impl ModelService {
    pub const ALL: [ModelService; 3] = [ModelService::OpenAi, ModelService::Xai, ModelService::Ollama];

    pub fn label(&self) -> &'static str {
        match self {
            ModelService::OpenAi => "openai",
            ModelService::Xai => "xai",
            ModelService::Ollama => "ollama",
        }
    }

    /// Environment variable consulted for the API key, if the service needs one.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            ModelService::OpenAi => Some("OPENAI_API_KEY"),
            ModelService::Xai => Some("XAI_API_KEY"),
            ModelService::Ollama => None,
        }
    }

    pub fn requires_api_key(&self) -> bool {
        self.api_key_env().is_some()
    }
}

impl fmt::Display for ModelService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ModelService {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "chatgpt" => Ok(ModelService::OpenAi),
            "xai" | "grok" => Ok(ModelService::Xai),
            "ollama" => Ok(ModelService::Ollama),
            other => Err(format!(
                "unknown AI service '{}' (expected openai, xai, or ollama)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub repo_owner: String,
    pub repo_name: String,
    pub repo_url: String,
    pub model_service: ModelService,
    /// Empty selects the service default.
    pub model_name: String,
    pub ollama_url: String,
    pub work_dir: PathBuf,
    pub issue_limit: usize,
    pub test_timeout_secs: u64,
    /// Plaintext fallback, only written when the keychain refuses the token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,
    /// Plaintext fallback, only written when the keychain refuses the key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repo_owner: String::new(),
            repo_name: String::new(),
            repo_url: String::new(),
            model_service: ModelService::default(),
            model_name: String::new(),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            work_dir: default_work_dir(),
            issue_limit: DEFAULT_ISSUE_LIMIT,
            test_timeout_secs: DEFAULT_TEST_TIMEOUT_SECS,
            github_token: None,
            model_api_key: None,
        }
    }
}

/// Secrets resolved for one run. Never serialized.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub github_token: Option<String>,
    pub model_api_key: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("github_token", &self.github_token.as_ref().map(|_| "***"))
            .field("model_api_key", &self.model_api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Clones land in `<work_dir>/<owner>/<repo>`.
pub fn default_work_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".issue-mender").join("workspace"))
        .unwrap_or_else(|| PathBuf::from("./workspace"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn env_secret(name: &str) -> Option<String> {
    non_empty(std::env::var(name).ok())
}

impl Config {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("issue-mender"))
    }

    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Whether a config file has been written before.
    pub fn exists() -> bool {
        Self::config_path().is_some_and(|p| p.is_file())
    }

    /// Load config from disk, or return default
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from `path`. A corrupt file is moved aside and defaults are used.
    pub fn load_from(path: &Path) -> Self {
        if let Ok(content) = fs::read_to_string(path) {
            match serde_json::from_str(&content) {
                Ok(config) => return config,
                Err(err) => {
                    preserve_corrupt_config(path, &content);
                    warn!(
                        "config file was corrupted ({}). A backup was saved and defaults were loaded.",
                        err
                    );
                }
            }
        }
        Self::default()
    }

    /// Save config to disk
    pub fn save(&self) -> Result<(), String> {
        let path =
            Self::config_path().ok_or_else(|| "Could not determine config directory".to_string())?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Err(e) = fs::set_permissions(dir, fs::Permissions::from_mode(0o700)) {
                    warn!("failed to set config directory permissions: {}", e);
                }
            }
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        write_config_atomic(path, &content).map_err(|e| format!("Failed to write config: {}", e))
    }

    /// Get the config file location for display
    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/issue-mender/config.json".to_string())
    }

    /// GitHub token from `GITHUB_TOKEN`, then the keychain, then the config file.
    pub fn github_token(&self) -> Option<String> {
        if let Some(token) = env_secret(GITHUB_TOKEN_ENV) {
            return Some(token);
        }
        match keyring::get_github_token() {
            Ok(Some(token)) if !token.is_empty() => return Some(token),
            Ok(_) => {}
            Err(err) => keyring::warn_keychain_error_once("GitHub token", &err),
        }
        non_empty(self.github_token.clone())
    }

    /// Model API key from the service's env var, then the keychain, then the config file.
    pub fn model_api_key(&self) -> Option<String> {
        if let Some(key) = self.model_service.api_key_env().and_then(env_secret) {
            return Some(key);
        }
        match keyring::get_model_api_key() {
            Ok(Some(key)) if !key.is_empty() => return Some(key),
            Ok(_) => {}
            Err(err) => keyring::warn_keychain_error_once("model API key", &err),
        }
        non_empty(self.model_api_key.clone())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            github_token: self.github_token(),
            model_api_key: self.model_api_key(),
        }
    }

    /// Store the token in the keychain, or in the config file if the keychain refuses.
    pub fn store_github_token(&mut self, token: &str) {
        match keyring::set_github_token(token) {
            Ok(()) => self.github_token = None,
            Err(err) => {
                warn!("keychain unavailable ({}); storing GitHub token in the config file", err);
                self.github_token = Some(token.to_string());
            }
        }
    }

    pub fn store_model_api_key(&mut self, key: &str) {
        match keyring::set_model_api_key(key) {
            Ok(()) => self.model_api_key = None,
            Err(err) => {
                warn!("keychain unavailable ({}); storing API key in the config file", err);
                self.model_api_key = Some(key.to_string());
            }
        }
    }

    /// Apply a repository given as a URL or `owner/repo`.
    pub fn set_repository(&mut self, input: &str) -> Result<(), PipelineError> {
        let (owner, repo) = crate::github::parse_repo_url(input).ok_or_else(|| {
            PipelineError::Configuration(format!(
                "'{}' is not a GitHub repository URL or owner/repo",
                input.trim()
            ))
        })?;
        self.repo_url = crate::github::repo_web_url(&owner, &repo);
        self.repo_owner = owner;
        self.repo_name = repo;
        Ok(())
    }

    /// Everything needed before touching any issue.
    pub fn validate(&self, credentials: &Credentials) -> Result<(), PipelineError> {
        if self.repo_owner.trim().is_empty() || self.repo_name.trim().is_empty() {
            return Err(PipelineError::Configuration(
                "repository owner and name are required (use --repo-url or --owner/--repo)"
                    .to_string(),
            ));
        }
        if non_empty(credentials.github_token.clone()).is_none() {
            return Err(PipelineError::Configuration(format!(
                "GitHub token is required (set {} or use --github-token)",
                GITHUB_TOKEN_ENV
            )));
        }
        if self.model_service.requires_api_key()
            && non_empty(credentials.model_api_key.clone()).is_none()
        {
            return Err(PipelineError::Configuration(format!(
                "{} API key is required (set {} or use --ai-key)",
                self.model_service,
                self.model_service.api_key_env().unwrap_or("the API key env var")
            )));
        }
        if self.issue_limit == 0 {
            return Err(PipelineError::Configuration(
                "issue limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

fn write_config_atomic(path: &Path, content: &str) -> Result<(), String> {
    use std::fs::OpenOptions;

    let tmp_path = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)
        .map_err(|e| e.to_string())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = file.set_permissions(fs::Permissions::from_mode(0o600)) {
            warn!("failed to set temp config file permissions: {}", e);
        }
    }

    file.write_all(content.as_bytes())
        .map_err(|e| e.to_string())?;
    drop(file);

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.to_string());
    }
    Ok(())
}
