//! Contracts for the upstream generation, limit-status and speech services.

pub mod client;
pub mod sse;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::AssistResult;

pub use client::HttpAssistClient;

pub type TokenStream = Pin<Box<dyn Stream<Item = AssistResult<String>> + Send>>;
pub type AudioStream = Pin<Box<dyn Stream<Item = AssistResult<Bytes>> + Send>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LimitStatus {
    pub limited: bool,
    pub remaining_count: u64,
    pub window_ms: u64,
    pub seconds_remaining: u64,
}

impl LimitStatus {
    /// What callers assume when the status endpoint cannot be reached.
    pub fn unlimited() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeakOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
}

#[async_trait]
pub trait AssistApi: Send + Sync {
    async fn generate(&self, prompt: &str, model: &str) -> AssistResult<String>;

    /// Tokens in arrival order; the stream ends at the server's sentinel.
    async fn generate_stream(&self, prompt: &str, model: &str) -> AssistResult<TokenStream>;

    /// Never fails: any error maps to [`LimitStatus::unlimited`].
    async fn limit_status(&self) -> LimitStatus;

    async fn speak(&self, text: &str) -> AssistResult<Bytes>;

    async fn speak_stream(&self, text: &str, options: &SpeakOptions) -> AssistResult<AudioStream>;
}
