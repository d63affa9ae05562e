//! Concrete LLM provider implementations
//!
//! Every built-in provider speaks the OpenAI chat-completions dialect, so a
//! single adapter serves them all.

pub mod openai_compat;

pub use openai_compat::{OpenAICompatConfig, OpenAICompatProvider};
