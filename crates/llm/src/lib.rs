//! Hosted language-model boundary for withyou.
//!
//! Every model call goes through [`LlmClient`]. Concrete clients are wrapped
//! in a [`RetryingClient`] (bounded exponential backoff on transient HTTP
//! statuses) and a [`SemaphoredClient`] (shared concurrency limit).

pub mod client;
pub mod config;
pub mod openai;
pub mod retry;
pub mod scripted;

pub use client::{ChatMessage, LlmClient, LlmRequest, LlmResponse, Role, TokenUsage};
pub use config::{LlmConfig, ModelClients, SemaphoredClient, build_llm_client, build_model_clients};
pub use openai::OpenAiCompatClient;
pub use retry::{RetryPolicy, RetryingClient};
pub use scripted::ScriptedClient;
