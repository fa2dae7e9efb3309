//! Language-model collaborators that turn an issue plus context into a fix proposal
//!
//! Every vendor shares the same prompt template and response parser; they
//! differ only in transport, authentication, and price.

pub mod client;
pub mod ollama;
pub mod parse;
pub mod prompt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{Config, Credentials, ModelService};
use crate::context::RepositoryContext;
use crate::error::PipelineError;
use crate::github::IssueReport;

pub use client::{ChatCompletionsClient, Vendor};
pub use ollama::OllamaClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Anything the model sends besides high/medium is treated as low.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "high" => Confidence::High,
            "medium" => Confidence::Medium,
            _ => Confidence::Low,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

/// A whole-file replacement. Never a patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    pub content: String,
}

/// What the model proposes for one issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixProposal {
    pub confidence: Confidence,
    pub needs_more_info: bool,
    pub questions: Vec<String>,
    pub explanation: String,
    pub file_changes: Vec<FileChange>,
}

#[async_trait]
pub trait FixModel: Send + Sync {
    /// Human-readable vendor and model, e.g. `openai (gpt-4o)`.
    fn name(&self) -> String;

    /// Estimated USD per `propose_fix` call. Zero for local models.
    fn cost_per_call(&self) -> f64;

    async fn propose_fix(
        &self,
        issue: &IssueReport,
        context: &RepositoryContext,
    ) -> Result<FixProposal, PipelineError>;
}

fn hosted_vendor(service: ModelService) -> Option<Vendor> {
    match service {
        ModelService::OpenAi => Some(Vendor::OpenAi),
        ModelService::Xai => Some(Vendor::Xai),
        ModelService::Ollama => None,
    }
}

fn required_key(service: ModelService, credentials: &Credentials) -> Result<String, PipelineError> {
    credentials
        .model_api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| {
            PipelineError::Configuration(format!("{} API key is required", service))
        })
}

/// Build the configured model backend.
pub fn build_model(
    config: &Config,
    credentials: &Credentials,
) -> Result<Box<dyn FixModel>, PipelineError> {
    match hosted_vendor(config.model_service) {
        Some(vendor) => {
            let key = required_key(config.model_service, credentials)?;
            Ok(Box::new(ChatCompletionsClient::new(
                vendor,
                key,
                &config.model_name,
            )?))
        }
        None => Ok(Box::new(OllamaClient::new(
            &config.ollama_url,
            &config.model_name,
        )?)),
    }
}

/// Models the configured service offers, for interactive selection.
pub async fn list_models(
    config: &Config,
    credentials: &Credentials,
) -> Result<Vec<String>, PipelineError> {
    match hosted_vendor(config.model_service) {
        Some(vendor) => {
            let key = required_key(config.model_service, credentials)?;
            Ok(ChatCompletionsClient::new(vendor, key, "")?
                .available_models()
                .await)
        }
        None => Ok(OllamaClient::new(&config.ollama_url, "")?
            .available_models()
            .await),
    }
}
