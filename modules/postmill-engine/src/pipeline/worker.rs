//! Generation worker: one call to the generation capability, parsed into
//! candidates tagged with this worker's id.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use ai_client::{
    extract_code_block, extract_json_span, strip_code_blocks, truncate_to_char_boundary,
};
use postmill_common::{Candidate, CreativityContext, SourceContent};

/// Everything one generation call conditions on.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub worker_id: u32,
    pub source: &'a SourceContent,
    pub context: &'a CreativityContext,
    pub variant_count: u32,
}

/// External text generator. Returns the raw reply; parsing happens in the
/// worker so every backend gets the same tolerance rules.
#[async_trait]
pub trait GenerationCapability: Send + Sync {
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String>;
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("generation call failed: {0:#}")]
    Capability(anyhow::Error),

    #[error("generation call timed out after {0:?}")]
    TimedOut(Duration),
}

/// Output the worker could not turn into candidates.
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("no JSON found in output")]
    NoJson,

    #[error("unexpected JSON shape: {0}")]
    Shape(&'static str),
}

/// One variant as the generator reports it.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RawVariant {
    pub content: String,
    #[serde(default)]
    pub hook_type: Option<String>,
    #[serde(default, alias = "what_makes_it_different")]
    pub distinctiveness_note: Option<String>,
}

pub struct GenerationWorker {
    id: u32,
    generator: Arc<dyn GenerationCapability>,
    timeout: Duration,
}

impl GenerationWorker {
    pub fn new(id: u32, generator: Arc<dyn GenerationCapability>, timeout: Duration) -> Self {
        Self {
            id,
            generator,
            timeout,
        }
    }

    /// Run one generation call. Transport failures and timeouts are errors;
    /// output that cannot be parsed yields an empty list.
    pub async fn run(
        &self,
        source: &SourceContent,
        context: &CreativityContext,
        variant_count: u32,
    ) -> Result<Vec<Candidate>, WorkerError> {
        let request = GenerationRequest {
            worker_id: self.id,
            source,
            context,
            variant_count,
        };

        let raw = match tokio::time::timeout(self.timeout, self.generator.generate(&request)).await
        {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => return Err(WorkerError::Capability(e)),
            Err(_) => return Err(WorkerError::TimedOut(self.timeout)),
        };

        let variants = match parse_variants(&raw) {
            Ok(variants) => variants,
            Err(e) => {
                warn!(
                    worker = self.id,
                    error = %e,
                    output = truncate_to_char_boundary(&raw, 200),
                    "Unparseable generation output, treating as empty"
                );
                return Ok(Vec::new());
            }
        };

        let candidates: Vec<Candidate> = variants
            .into_iter()
            .enumerate()
            .map(|(seq, v)| Candidate {
                content: v.content,
                hook_type: v
                    .hook_type
                    .unwrap_or_else(|| context.hook_pattern.clone()),
                structure: context.structure.clone(),
                persona_id: context.persona_id.clone(),
                worker_id: self.id,
                sequence_id: seq as u32,
                distinctiveness_note: v.distinctiveness_note.unwrap_or_default(),
            })
            .collect();

        debug!(worker = self.id, candidates = candidates.len(), "Worker finished");
        Ok(candidates)
    }
}

/// Parse a generator reply into variants.
///
/// Accepts a JSON array of variant objects, an object holding a `variants`
/// array, or a single variant object, optionally wrapped in a markdown code
/// fence or surrounded by prose. Entries without usable `content` are
/// skipped.
pub fn parse_variants(raw: &str) -> Result<Vec<RawVariant>, ParseError> {
    let value = parse_json_value(raw, &ARRAY_FIRST)?;

    let entries = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("variants") {
            Some(Value::Array(items)) => items,
            Some(_) => return Err(ParseError::Shape("`variants` is not an array")),
            None if map.contains_key("content") => vec![Value::Object(map)],
            None => return Err(ParseError::Shape("object without `variants` or `content`")),
        },
        _ => return Err(ParseError::Shape("expected an array or object")),
    };

    let total = entries.len();
    let variants: Vec<RawVariant> = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<RawVariant>(entry).ok())
        .filter(|v| !v.content.trim().is_empty())
        .map(|mut v| {
            v.content = v.content.trim().to_string();
            v
        })
        .collect();

    if variants.len() < total {
        debug!(
            skipped = total - variants.len(),
            kept = variants.len(),
            "Skipped variants without content"
        );
    }
    Ok(variants)
}

/// Span order for generator replies, which are usually a top-level array.
pub(crate) const ARRAY_FIRST: [(char, char); 2] = [('[', ']'), ('{', '}')];
/// Span order for judge replies, whose object holds a nested `scores` array.
pub(crate) const OBJECT_FIRST: [(char, char); 2] = [('{', '}'), ('[', ']')];

/// Bare or fully fenced JSON first, then the first fenced block anywhere in
/// the reply, then the widest bracket span in `spans` order.
pub(crate) fn parse_json_value(raw: &str, spans: &[(char, char)]) -> Result<Value, ParseError> {
    let stripped = strip_code_blocks(raw);
    if let Ok(value) = serde_json::from_str(stripped) {
        return Ok(value);
    }
    if let Some(block) = extract_code_block(raw) {
        if let Ok(value) = serde_json::from_str(block) {
            return Ok(value);
        }
    }
    for &(open, close) in spans {
        if let Some(span) = extract_json_span(raw, open, close) {
            if let Ok(value) = serde_json::from_str(span) {
                return Ok(value);
            }
        }
    }
    Err(ParseError::NoJson)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_context, MockGenerator};

    #[test]
    fn parses_fenced_array() {
        let raw = "```json\n[{\"content\": \"First post\", \"hook_type\": \"contrarian\", \"what_makes_it_different\": \"numbers\"}]\n```";
        let variants = parse_variants(raw).unwrap();
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].hook_type.as_deref(), Some("contrarian"));
        assert_eq!(variants[0].distinctiveness_note.as_deref(), Some("numbers"));
    }

    #[test]
    fn parses_variants_object_and_chatty_output() {
        let wrapped = r#"{"variants": [{"content": "a"}, {"content": "b"}]}"#;
        assert_eq!(parse_variants(wrapped).unwrap().len(), 2);

        let chatty = "Here are your posts:\n[{\"content\": \"a\"}]\nEnjoy.";
        assert_eq!(parse_variants(chatty).unwrap()[0].content, "a");

        let single = r#"{"content": "only one"}"#;
        assert_eq!(parse_variants(single).unwrap().len(), 1);
    }

    #[test]
    fn parses_fence_after_prose() {
        let raw = "Here are three takes [draft]:\n```json\n[{\"content\": \"Fenced post\"}]\n```\nLet me know.";
        let variants = parse_variants(raw).unwrap();
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].content, "Fenced post");
    }

    #[test]
    fn skips_entries_without_content() {
        let raw = r#"[{"content": "  keep  "}, {"hook_type": "x"}, {"content": ""}, 7]"#;
        let variants = parse_variants(raw).unwrap();
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].content, "keep");
    }

    #[test]
    fn rejects_non_json() {
        assert_eq!(parse_variants("I cannot help with that."), Err(ParseError::NoJson));
        assert!(matches!(parse_variants("42"), Err(ParseError::Shape(_))));
        assert!(matches!(parse_variants(r#"{"posts": []}"#), Err(ParseError::Shape(_))));
    }

    #[tokio::test]
    async fn tags_candidates_with_worker_and_sequence() {
        let generator = MockGenerator::new().on_worker(
            4,
            r#"[{"content": "one"}, {"content": "two", "hook_type": "question"}]"#,
        );
        let worker = GenerationWorker::new(4, Arc::new(generator), Duration::from_secs(5));
        let ctx = sample_context("witty");
        let source = SourceContent::new("X", "Y");

        let candidates = worker.run(&source, &ctx, 2).await.unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].worker_id, 4);
        assert_eq!(candidates[1].sequence_id, 1);
        assert_eq!(candidates[0].hook_type, ctx.hook_pattern);
        assert_eq!(candidates[1].hook_type, "question");
        assert_eq!(candidates[0].persona_id, "witty");
    }

    #[tokio::test]
    async fn unparseable_output_is_empty_not_error() {
        let generator = MockGenerator::new().on_worker(0, "Sorry, no.");
        let worker = GenerationWorker::new(0, Arc::new(generator), Duration::from_secs(5));
        let candidates = worker
            .run(&SourceContent::new("X", "Y"), &sample_context("witty"), 1)
            .await
            .unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn capability_failure_and_timeout_are_errors() {
        let generator = MockGenerator::new()
            .fail_worker(0)
            .delay_worker(1, Duration::from_millis(200));
        let generator = Arc::new(generator);
        let source = SourceContent::new("X", "Y");
        let ctx = sample_context("witty");

        let failing = GenerationWorker::new(0, generator.clone(), Duration::from_secs(5));
        assert!(matches!(
            failing.run(&source, &ctx, 1).await,
            Err(WorkerError::Capability(_))
        ));

        let slow = GenerationWorker::new(1, generator, Duration::from_millis(20));
        assert!(matches!(
            slow.run(&source, &ctx, 1).await,
            Err(WorkerError::TimedOut(_))
        ));
    }
}
