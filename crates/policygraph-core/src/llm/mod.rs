//! LLM integration - OpenAI-compatible chat completions
//!
//! This module provides:
//! - HTTP client for chat completions with rate-limit retry
//! - Request/response types matching the OpenAI-compatible API
//! - The [`ChatModel`] seam used by the extraction collaborators

mod client;
mod types;

pub use client::{ChatModel, LlmClient, LlmClientBuilder};
pub use types::{ChatRequest, ChatResponse, Choice, FinishReason, LlmResponse, Message, MessageRole, Usage};
