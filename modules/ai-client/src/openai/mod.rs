mod client;
pub(crate) mod types;

use crate::error::AiError;
use crate::traits::{CompletionRequest, TextModel};
use anyhow::Result;
use async_trait::async_trait;

use client::OpenAiClient;

// =============================================================================
// OpenAi
// =============================================================================

/// Client for any OpenAI-compatible chat completions endpoint. Point
/// `with_base_url` at OpenRouter or a self-hosted gateway to reach other
/// model families.
#[derive(Clone)]
pub struct OpenAi {
    api_key: String,
    pub(crate) model: String,
    base_url: Option<String>,
    http: reqwest::Client,
}

impl OpenAi {
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

    /// Get the API key.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub(crate) fn client(&self) -> OpenAiClient {
        let client = OpenAiClient::new(&self.api_key, self.http.clone());
        if let Some(ref url) = self.base_url {
            client.with_base_url(url)
        } else {
            client
        }
    }
}

#[async_trait]
impl TextModel for OpenAi {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let mut wire = types::ChatRequest::new(&self.model);
        if let Some(system) = request.system {
            wire.messages.push(types::WireMessage::system(system));
        }
        wire.messages
            .extend(request.messages.iter().map(types::WireMessage::from));

        if types::uses_max_completion_tokens(&self.model) {
            wire.max_completion_tokens = Some(request.max_tokens);
        } else {
            wire.max_tokens = Some(request.max_tokens);
            wire.temperature = request.temperature;
        }

        let response = self.client().chat(&wire).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AiError::EmptyResponse("OpenAI").into())
    }
}
