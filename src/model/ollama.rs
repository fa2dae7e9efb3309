//! Local models served by Ollama (https://ollama.com). Free, but slow.

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

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama2";
const REQUEST_TIMEOUT_SECS: u64 = 300;
const SERVICE: &str = "ollama";

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct TagList {
    #[serde(default)]
    models: Vec<Tag>,
}

#[derive(Deserialize)]
struct Tag {
    name: String,
}

pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str) -> Result<Self, PipelineError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| PipelineError::transport(SERVICE, e))?;

        let base_url = if base_url.trim().is_empty() {
            DEFAULT_OLLAMA_URL
        } else {
            base_url.trim()
        };
        let model = if model.trim().is_empty() {
            DEFAULT_MODEL
        } else {
            model.trim()
        };

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, PipelineError> {
        let request = GenerateRequest {
            model: &self.model,
            system: SYSTEM_PROMPT,
            prompt,
            stream: false,
        };

        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::transport(SERVICE, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PipelineError::transport(SERVICE, e))?;
        if !status.is_success() {
            return Err(PipelineError::transport(
                SERVICE,
                format!("API error {}: {}", status, truncate_chars(&text, 200)),
            ));
        }

        let parsed: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| PipelineError::Parse(format!("unexpected ollama response: {}", e)))?;
        Ok(parsed.response)
    }

    /// Locally pulled models, falling back to common ones.
    pub async fn available_models(&self) -> Vec<String> {
        let fallback = || {
            ["llama2", "codellama", "mistral"]
                .iter()
                .map(|m| m.to_string())
                .collect::<Vec<_>>()
        };

        let resp = match self
            .http
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                debug!(status = %resp.status(), "ollama tag listing unavailable");
                return fallback();
            }
            Err(err) => {
                warn!(%err, url = %self.base_url, "could not reach ollama");
                return fallback();
            }
        };

        let names: Vec<String> = resp
            .json::<TagList>()
            .await
            .map(|tags| tags.models.into_iter().map(|t| t.name).collect())
            .unwrap_or_default();

        if names.is_empty() {
            vec![DEFAULT_MODEL.to_string()]
        } else {
            names
        }
    }
}

#[async_trait]
impl FixModel for OllamaClient {
    fn name(&self) -> String {
        format!("ollama ({})", self.model)
    }

    fn cost_per_call(&self) -> f64 {
        0.0
    }

    async fn propose_fix(
        &self,
        issue: &IssueReport,
        context: &RepositoryContext,
    ) -> Result<FixProposal, PipelineError> {
        let prompt = build_prompt(issue, context);
        debug!(chars = prompt.len(), model = %self.model, "sending fix request to ollama");
        let content = self.generate(&prompt).await?;
        parse_fix(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn test_defaults_fill_blank_settings() {
        let client = OllamaClient::new("", "").unwrap();
        assert_eq!(client.base_url, DEFAULT_OLLAMA_URL);
        assert_eq!(client.model(), "llama2");
        assert_eq!(client.cost_per_call(), 0.0);

        let client = OllamaClient::new("http://gpu-box:11434/", "codellama").unwrap();
        assert_eq!(client.base_url, "http://gpu-box:11434");
        assert_eq!(client.name(), "ollama (codellama)");
    }

    #[test]
    fn test_generate_request_disables_streaming() {
        let request = GenerateRequest {
            model: "llama2",
            system: SYSTEM_PROMPT,
            prompt: "p",
            stream: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["model"], "llama2");
    }

    #[test]
    fn test_tag_list_parses_names() {
        let tags: TagList =
            serde_json::from_str(r#"{"models": [{"name": "llama3:8b", "size": 1}]}"#).unwrap();
        assert_eq!(tags.models[0].name, "llama3:8b");
    }

    #[tokio::test]
    async fn test_unreachable_server_falls_back_to_common_models() {
        let client = OllamaClient::new("http://127.0.0.1:9", "").unwrap();
        let models = client.available_models().await;
        assert_eq!(models, vec!["llama2", "codellama", "mistral"]);
        let err = client.generate("hi").await.unwrap_err();
        assert!(matches!(err, PipelineError::Transport { .. }));
    }
    #[tokio::test]
    async fn test_generate_posts_non_streaming_request() {
        let server = MockServer::start();
        let generate = server.mock(|when, then| {
            when.method(POST)
                .path("/api/generate")
                .body_includes("\"stream\":false")
                .body_includes("\"model\":\"codellama\"");
            then.status(200).json_body(json!({
                "model": "codellama",
                "response": "{\"confidence\": \"medium\", \"explanation\": \"x\", \"files\": []}",
                "done": true
            }));
        });

        let client = OllamaClient::new(&server.base_url(), "codellama").unwrap();
        let text = client.generate("fix it").await.unwrap();
        generate.assert_calls(1);
        assert!(text.contains("\"medium\""));
    }

    #[tokio::test]
    async fn test_tag_listing_reads_local_models() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/tags");
            then.status(200)
                .json_body(json!({"models": [{"name": "llama3:8b"}, {"name": "qwen2.5-coder"}]}));
        });

        let client = OllamaClient::new(&server.base_url(), "").unwrap();
        assert_eq!(client.available_models().await, vec!["llama3:8b", "qwen2.5-coder"]);
    }
}
