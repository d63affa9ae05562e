//! One-shot chat completion: what a role sends and what comes back

use crate::Message;
use serde::{Deserialize, Serialize};

/// A single completion call against one model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model name as the provider's API expects it, e.g. `qwen-plus`
    pub model: String,

    pub messages: Vec<Message>,

    /// Sent ahead of `messages` as the system turn
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Output cap; also the basis for pre-call cost estimates
    pub max_tokens: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn builder(model: impl Into<String>) -> CompletionRequestBuilder {
        CompletionRequestBuilder::new(model)
    }
}

/// The assistant reply and the tokens it was billed for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub message: Message,
    pub stop_reason: StopReason,
    pub usage: TokenUsage,
}

impl CompletionResponse {
    /// Reply that ended normally
    pub fn from_text(text: impl Into<String>, input_tokens: usize, output_tokens: usize) -> Self {
        Self {
            message: Message::assistant(text),
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage {
                input_tokens,
                output_tokens,
            },
        }
    }

    pub fn text(&self) -> &str {
        self.message.text()
    }
}

/// Why the provider stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    /// Output was cut at `max_tokens`
    MaxTokens,
    /// Provider withheld or truncated the reply
    ContentFilter,
}

/// Billable token counts reported by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Builder for [`CompletionRequest`]; `max_tokens` defaults to 1024
pub struct CompletionRequestBuilder {
    model: String,
    messages: Vec<Message>,
    system: Option<String>,
    max_tokens: usize,
    temperature: Option<f32>,
}

impl CompletionRequestBuilder {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            system: None,
            max_tokens: 1024,
            temperature: None,
        }
    }

    pub fn add_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn build(self) -> CompletionRequest {
        CompletionRequest {
            model: self.model,
            messages: self.messages,
            system: self.system,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_request() {
        let request = CompletionRequest::builder("deepseek-chat")
            .system("You are a fundamental analyst")
            .add_message(Message::user("Analyze 600519"))
            .max_tokens(2048)
            .temperature(0.3)
            .build();

        assert_eq!(request.model, "deepseek-chat");
        assert_eq!(request.system.as_deref(), Some("You are a fundamental analyst"));
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.max_tokens, 2048);
        assert_eq!(request.temperature, Some(0.3));
    }

    #[test]
    fn test_defaults_leave_optional_fields_unset() {
        let request = CompletionRequest::builder("qwen-turbo").build();
        assert_eq!(request.max_tokens, 1024);
        assert!(request.system.is_none());

        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("system").is_none());
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_from_text() {
        let response = CompletionResponse::from_text("HOLD", 12, 3);
        assert_eq!(response.text(), "HOLD");
        assert_eq!(response.stop_reason, StopReason::EndTurn);
        assert_eq!(
            response.usage,
            TokenUsage {
                input_tokens: 12,
                output_tokens: 3
            }
        );
    }
}
