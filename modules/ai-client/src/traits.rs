use anyhow::Result;
use async_trait::async_trait;

// =============================================================================
// Message Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

// =============================================================================
// Completion Request
// =============================================================================

/// Provider-neutral description of a single chat completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub temperature: Option<f32>,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new() -> Self {
        Self {
            system: None,
            messages: Vec::new(),
            temperature: None,
            max_tokens: 4096,
        }
    }

    /// Shorthand for a request holding one user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new().message(Message::user(content))
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

impl Default for CompletionRequest {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TextModel Trait
// =============================================================================

/// A chat model that turns a request into the first text block of its reply.
#[async_trait]
pub trait TextModel: Send + Sync {
    fn model(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder_collects_messages_in_order() {
        let request = CompletionRequest::user("first")
            .message(Message::assistant("second"))
            .system("be terse")
            .temperature(1.0)
            .max_tokens(512);

        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, MessageRole::User);
        assert_eq!(request.messages[1].content, "second");
        assert_eq!(request.system.as_deref(), Some("be terse"));
        assert_eq!(request.temperature, Some(1.0));
        assert_eq!(request.max_tokens, 512);
    }
}
