use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{AssistError, AssistResult};

use super::{sse::token_stream, AssistApi, AudioStream, LimitStatus, SpeakOptions, TokenStream};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    text: String,
}

#[derive(Debug, Serialize)]
struct SpeakRequest<'a> {
    text: &'a str,
    #[serde(flatten)]
    options: &'a SpeakOptions,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default, alias = "message")]
    error: Option<String>,
}

/// HTTP client for the assistant backend.
pub struct HttpAssistClient {
    client: Client,
    base_url: String,
    speech_timeout: Duration,
}

impl HttpAssistClient {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration, speech_timeout: Duration) -> AssistResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AssistError::network(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            speech_timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Non-2xx responses become `Network` errors carrying the status and any
    /// message the server put in the body.
    async fn check(response: Response) -> AssistResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(parse_error(status, &body))
    }

    async fn post_speech(&self, path: &str, text: &str, options: &SpeakOptions) -> AssistResult<Response> {
        let response = self
            .client
            .post(self.url(path))
            .timeout(self.speech_timeout)
            .json(&SpeakRequest { text, options })
            .send()
            .await
            .map_err(speech_error)?;
        Self::check(response).await
    }
}

fn parse_error(status: StatusCode, body: &str) -> AssistError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or_default()
                .to_string()
        });
    AssistError::http(status.as_u16(), message)
}

fn speech_error(err: reqwest::Error) -> AssistError {
    if err.is_timeout() {
        AssistError::AudioTimeout
    } else {
        AssistError::from(err)
    }
}

#[async_trait]
impl AssistApi for HttpAssistClient {
    async fn generate(&self, prompt: &str, model: &str) -> AssistResult<String> {
        let response = self
            .client
            .post(self.url("/generate"))
            .json(&GenerateRequest { prompt, model })
            .send()
            .await?;
        let body: GenerateResponse = Self::check(response).await?.json().await?;
        Ok(body.text)
    }

    async fn generate_stream(&self, prompt: &str, model: &str) -> AssistResult<TokenStream> {
        let response = self
            .client
            .post(self.url("/generate/stream"))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&GenerateRequest { prompt, model })
            .send()
            .await?;
        let response = Self::check(response).await?;
        log_debug!("generation stream opened for model {model}");
        Ok(Box::pin(token_stream(response.bytes_stream())))
    }

    async fn limit_status(&self) -> LimitStatus {
        let result = async {
            let response = self.client.get(self.url("/limit-status")).send().await?;
            let status: LimitStatus = Self::check(response).await?.json().await?;
            Ok::<_, AssistError>(status)
        }
        .await;

        match result {
            Ok(status) => status,
            Err(err) => {
                log_warn!("limit status unavailable, assuming not limited: {err}");
                LimitStatus::unlimited()
            }
        }
    }

    async fn speak(&self, text: &str) -> AssistResult<Bytes> {
        let response = self.post_speech("/tts", text, &SpeakOptions::default()).await?;
        response.bytes().await.map_err(speech_error)
    }

    async fn speak_stream(&self, text: &str, options: &SpeakOptions) -> AssistResult<AudioStream> {
        let response = self.post_speech("/tts/stream", text, options).await?;
        Ok(Box::pin(
            response.bytes_stream().map(|chunk| chunk.map_err(speech_error)),
        ))
    }
}
