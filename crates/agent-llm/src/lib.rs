//! LLM provider abstraction layer
//!
//! This crate provides the provider-agnostic contract the routing and
//! collaboration layer talks to. It includes:
//!
//! - Message types for chat completion
//! - Completion request/response types with token usage
//! - The `LLMProvider` trait every adapter implements
//! - A static factory table that builds provider clients by name
//! - An OpenAI-compatible adapter (DeepSeek, DashScope, Gemini, SiliconFlow, OpenAI)

pub mod completion;
pub mod error;
pub mod factory;
pub mod messages;
pub mod provider;
pub mod providers;

// Re-export main types
pub use completion::{CompletionRequest, CompletionResponse, StopReason, TokenUsage};
pub use error::{LLMError, Result};
pub use factory::{ProviderFactory, builtin_factories};
pub use messages::{Message, Role};
pub use provider::LLMProvider;
