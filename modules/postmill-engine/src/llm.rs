//! Generation and judging capabilities backed by a chat model.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use ai_client::{Claude, CompletionRequest, OpenAi, TextModel};
use postmill_common::{Config, PostmillError, Provider};

use crate::personas::PersonaSet;
use crate::pipeline::judge::{JudgeRequest, JudgingCapability};
use crate::pipeline::worker::{GenerationCapability, GenerationRequest};
use crate::prompts;

const GENERATION_TEMPERATURE: f32 = 1.0;
const GENERATION_MAX_TOKENS: u32 = 4096;
const JUDGE_TEMPERATURE: f32 = 0.2;
const JUDGE_MAX_TOKENS: u32 = 8192;

/// Build the chat model for `model` on the configured provider.
pub fn text_model(config: &Config, model: &str) -> Result<Arc<dyn TextModel>, PostmillError> {
    let api_key = config.api_key()?;
    let model: Arc<dyn TextModel> = match config.provider {
        Provider::Anthropic => Arc::new(Claude::new(api_key, model)),
        Provider::OpenAi => {
            let client = OpenAi::new(api_key, model);
            match &config.openai_base_url {
                Some(url) => Arc::new(client.with_base_url(url.as_str())),
                None => Arc::new(client),
            }
        }
    };
    Ok(model)
}

pub struct LlmGenerator {
    model: Arc<dyn TextModel>,
    personas: PersonaSet,
    rules: String,
}

impl LlmGenerator {
    pub fn new(model: Arc<dyn TextModel>, personas: PersonaSet, rules: impl Into<String>) -> Self {
        Self {
            model,
            personas,
            rules: rules.into(),
        }
    }
}

#[async_trait]
impl GenerationCapability for LlmGenerator {
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String> {
        let ctx = request.context;
        let persona = self.personas.get(&ctx.persona_id);
        let persona_name = persona.map_or(ctx.persona_id.as_str(), |p| p.name.as_str());

        let completion = CompletionRequest::user(prompts::generation_user_prompt(
            request.source,
            ctx,
            request.variant_count,
            persona_name,
        ))
        .system(prompts::generation_system_prompt(persona, ctx, &self.rules))
        .temperature(GENERATION_TEMPERATURE)
        .max_tokens(GENERATION_MAX_TOKENS);

        debug!(
            worker = request.worker_id,
            model = self.model.model(),
            persona = ctx.persona_id.as_str(),
            variants = request.variant_count,
            "Requesting generation"
        );
        self.model.complete(completion).await
    }
}

pub struct LlmJudge {
    model: Arc<dyn TextModel>,
}

impl LlmJudge {
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl JudgingCapability for LlmJudge {
    async fn judge(&self, request: &JudgeRequest<'_>) -> Result<String> {
        let completion = CompletionRequest::user(prompts::judge_user_prompt(
            request.candidates,
            request.source_digest,
        ))
        .system(prompts::judge_system_prompt(request.criteria, request.rules))
        .temperature(JUDGE_TEMPERATURE)
        .max_tokens(JUDGE_MAX_TOKENS);

        debug!(
            model = self.model.model(),
            candidates = request.candidates.len(),
            "Requesting judgment"
        );
        self.model.complete(completion).await
    }
}
