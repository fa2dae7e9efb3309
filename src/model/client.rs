use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::parse::parse_fix;
use super::prompt::{build_prompt, SYSTEM_PROMPT};
use super::{FixModel, FixProposal};
use crate::context::RepositoryContext;
use crate::error::PipelineError;
use crate::github::IssueReport;
use crate::util::truncate_chars;

const REQUEST_TIMEOUT_SECS: u64 = 120;
const TEMPERATURE: f32 = 0.2;
const MAX_TOKENS: u32 = 8000;
const MAX_ERROR_CHARS: usize = 200;

/// Hosted vendors speaking the OpenAI chat-completions protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vendor {
    OpenAi,
    Xai,
}

impl Vendor {
    pub fn label(&self) -> &'static str {
        match self {
            Vendor::OpenAi => "openai",
            Vendor::Xai => "xai",
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Vendor::OpenAi => "https://api.openai.com/v1",
            Vendor::Xai => "https://api.x.ai/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Vendor::OpenAi => "gpt-4o",
            Vendor::Xai => "grok-beta",
        }
    }

    /// Rough USD per fix request.
    pub fn cost_per_call(&self) -> f64 {
        match self {
            Vendor::OpenAi => 0.002,
            Vendor::Xai => 0.001,
        }
    }

    /// Offered when the model listing endpoint is unavailable.
    fn fallback_models(&self) -> Vec<String> {
        let models: &[&str] = match self {
            Vendor::OpenAi => &["gpt-4o", "gpt-4o-mini", "gpt-4-turbo", "gpt-3.5-turbo"],
            Vendor::Xai => &["grok-beta", "grok-vision-beta"],
        };
        models.iter().map(|m| m.to_string()).collect()
    }

    /// OpenAI lists embedding, audio, and image models too; only chat models are useful.
    fn keeps_model(&self, id: &str) -> bool {
        match self {
            Vendor::OpenAi => id.starts_with("gpt-"),
            Vendor::Xai => true,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

pub struct ChatCompletionsClient {
    http: reqwest::Client,
    vendor: Vendor,
    api_key: String,
    model: String,
    base_url: String,
}

impl ChatCompletionsClient {
    /// An empty `model` selects the vendor default.
    pub fn new(vendor: Vendor, api_key: impl Into<String>, model: &str) -> Result<Self, PipelineError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| PipelineError::transport(vendor.label(), e))?;

        let model = if model.trim().is_empty() {
            vendor.default_model().to_string()
        } else {
            model.trim().to_string()
        };

        Ok(Self {
            http,
            vendor,
            api_key: api_key.into(),
            model,
            base_url: vendor.base_url().to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn status_error(&self, status: reqwest::StatusCode, body: &str) -> PipelineError {
        let message = match status.as_u16() {
            401 => "invalid API key. Run 'issue-mender --setup' to update it.".to_string(),
            429 => "rate limited. Try again in a few minutes.".to_string(),
            500..=599 => format!("server error ({}). The service may be temporarily unavailable.", status),
            _ => format!("API error {}: {}", status, truncate_chars(body, MAX_ERROR_CHARS)),
        };
        PipelineError::transport(self.vendor.label(), message)
    }

    async fn complete(&self, user: &str) -> Result<String, PipelineError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Message {
                    role: "user",
                    content: user,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::transport(self.vendor.label(), e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PipelineError::transport(self.vendor.label(), e))?;
        if !status.is_success() {
            return Err(self.status_error(status, &text));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| PipelineError::Parse(format!("unexpected {} response: {}", self.vendor.label(), e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| PipelineError::Parse("no response from model".to_string()))
    }

    /// Chat models the key can use, falling back to a fixed list.
    pub async fn available_models(&self) -> Vec<String> {
        let response = self
            .http
            .get(format!("{}/models", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await;

        let list = match response {
            Ok(resp) if resp.status().is_success() => resp.json::<ModelList>().await.ok(),
            Ok(resp) => {
                debug!(status = %resp.status(), vendor = self.vendor.label(), "model listing unavailable");
                return self.vendor.fallback_models();
            }
            Err(err) => {
                warn!(%err, vendor = self.vendor.label(), "could not list models");
                return self.vendor.fallback_models();
            }
        };

        let models: Vec<String> = list
            .map(|l| l.data)
            .unwrap_or_default()
            .into_iter()
            .map(|m| m.id)
            .filter(|id| self.vendor.keeps_model(id))
            .collect();

        if models.is_empty() {
            vec![self.vendor.default_model().to_string()]
        } else {
            models
        }
    }
}

#[async_trait]
impl FixModel for ChatCompletionsClient {
    fn name(&self) -> String {
        format!("{} ({})", self.vendor.label(), self.model)
    }

    fn cost_per_call(&self) -> f64 {
        self.vendor.cost_per_call()
    }

    async fn propose_fix(
        &self,
        issue: &IssueReport,
        context: &RepositoryContext,
    ) -> Result<FixProposal, PipelineError> {
        let prompt = build_prompt(issue, context);
        debug!(chars = prompt.len(), model = %self.model, "sending fix request");
        let content = self.complete(&prompt).await?;
        parse_fix(&content)
    }
}
