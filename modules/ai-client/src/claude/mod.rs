mod client;
pub(crate) mod types;

use crate::error::AiError;
use crate::traits::{CompletionRequest, TextModel};
use anyhow::Result;
use async_trait::async_trait;

use client::ClaudeClient;
use types::*;

// =============================================================================
// Claude
// =============================================================================

#[derive(Clone)]
pub struct Claude {
    api_key: String,
    pub(crate) model: String,
    base_url: Option<String>,
    http: reqwest::Client,
}

impl Claude {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub(crate) fn client(&self) -> ClaudeClient {
        let client = ClaudeClient::new(&self.api_key, self.http.clone());
        if let Some(ref url) = self.base_url {
            client.with_base_url(url)
        } else {
            client
        }
    }
}

#[async_trait]
impl TextModel for Claude {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let mut wire = ChatRequest::new(&self.model);
        wire.max_tokens = request.max_tokens;
        wire.system = request.system;
        wire.temperature = request.temperature;
        wire.messages = request.messages.iter().map(WireMessage::from).collect();

        let response = self.client().chat(&wire).await?;

        response
            .text()
            .ok_or_else(|| AiError::EmptyResponse("Claude").into())
    }
}
