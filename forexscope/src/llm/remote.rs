use serde::{Deserialize, Serialize};
use std::time::Duration;

use common::Settings;

use super::{build_prompt, Analyzer};
use crate::error::AnalysisError;

/// Analyzer backed by an OpenAI-compatible chat-completion HTTP API.
///
/// One request per article, no retry and no backoff: a failed call is
/// reported to the caller, which decides what to do with it.
pub struct RemoteAnalyzer {
    api_url: String,
    api_key: String,
    model: String,
    prompt_template: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl RemoteAnalyzer {
    pub fn new(api_url: impl Into<String>, settings: &Settings) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            prompt_template: settings.prompt.clone(),
            timeout: Duration::from_secs(30),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout = Duration::from_secs(timeout_secs);
        self
    }
}

#[async_trait::async_trait]
impl Analyzer for RemoteAnalyzer {
    async fn analyze(&self, title: &str, content: &str) -> Result<String, AnalysisError> {
        let req_body = ChatRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: build_prompt(&self.prompt_template, title, content),
            }],
        };

        let timeout_secs = self.timeout.as_secs();
        let response = tokio::time::timeout(
            self.timeout,
            self.client
                .post(&self.api_url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&req_body)
                .send(),
        )
        .await
        .map_err(|_| AnalysisError::Timeout(timeout_secs))??;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Api { status, body });
        }

        let resp_body: ChatResponse = response.json().await.map_err(AnalysisError::Decode)?;

        // A response with zero choices is treated as an empty analysis, not
        // an error.
        Ok(resp_body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}
