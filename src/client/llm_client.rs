//! Chat-completion client for OpenAI-compatible endpoints.
//!
//! Epistemic foundation:
//! - K_i: Groq, OpenRouter, vLLM and Ollama all speak the OpenAI chat schema
//! - B_i: API will respond within timeout (might fail)
//! - B_i: Server-sent `retry-after` is a usable delay (might not be)
//! - I^B: Network availability unknowable → retry with backoff
//!
//! Anything the model says is left for the services to interpret.

use crate::models::{LlmApiError, LlmConfig, MobgenError, ModelSpec, Result};
use regex::Regex;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Longest server-requested wait honoured between attempts.
const MAX_RETRY_AFTER_SECS: f64 = 60.0;

/// Message in a chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Response from a completion request.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    /// Model used (may differ from requested)
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub duration: Duration,
}

/// LLM client for one OpenAI-compatible endpoint.
pub struct LLMClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
    total_input_tokens: AtomicU64,
    total_output_tokens: AtomicU64,
}

impl LLMClient {
    /// Create a new LLM client.
    pub fn new(
        api_key: Option<String>,
        base_url: String,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self> {
        let timeout = Duration::from_secs(timeout_secs);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(MobgenError::Network)?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            max_retries: max_retries.max(1),
            total_input_tokens: AtomicU64::new(0),
            total_output_tokens: AtomicU64::new(0),
        })
    }

    /// Build a client from the `[llm]` config section.
    pub fn from_config(config: &LlmConfig, api_key: Option<String>) -> Result<Self> {
        Self::new(
            api_key,
            config.base_url.clone(),
            config.timeout_secs,
            config.max_retries,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        if let Some(ref api_key) = self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|_| {
                MobgenError::InvalidInput("API key is not a valid header value".to_string())
            })?;
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(headers)
    }

    fn backoff(attempt: u32) -> Duration {
        Duration::from_secs(2u64.pow(attempt).min(10))
    }

    /// Complete a chat request.
    pub async fn complete(
        &self,
        model: &ModelSpec,
        messages: Vec<Message>,
    ) -> Result<CompletionResponse> {
        let start = Instant::now();
        let request = ChatCompletionRequest {
            model: model.id.clone(),
            messages,
            max_tokens: model.max_tokens,
            temperature: model.temperature,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let headers = self.headers()?;
        let mut last_error: Option<MobgenError> = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let delay = last_error
                    .as_ref()
                    .and_then(MobgenError::retry_after)
                    .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                    .unwrap_or_else(|| Self::backoff(attempt - 1));
                debug!(
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying chat completion"
                );
                tokio::time::sleep(delay).await;
            }

            let response = match self
                .client
                .post(&url)
                .headers(headers.clone())
                .json(&request)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) if e.is_timeout() => {
                    last_error = Some(MobgenError::Timeout(self.timeout));
                    continue;
                }
                Err(e) => {
                    last_error = Some(MobgenError::Network(e));
                    continue;
                }
            };

            let status = response.status().as_u16();

            if status == 429 {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after)
                    .unwrap_or(1.0);
                last_error = Some(MobgenError::RateLimited {
                    retry_after_secs: retry_after,
                });
                continue;
            }

            if !response.status().is_success() {
                let error_body = response.text().await.unwrap_or_default();
                let error = match status {
                    401 => LlmApiError::AuthenticationFailed,
                    404 => LlmApiError::ModelNotFound(model.id.clone()),
                    _ => {
                        let message = serde_json::from_str::<ApiErrorResponse>(&error_body)
                            .map(|e| e.error.message)
                            .unwrap_or(error_body);
                        LlmApiError::ApiError { status, message }
                    }
                };
                let error = MobgenError::LlmApi(error);
                if !error.is_retryable() {
                    return Err(error);
                }
                last_error = Some(error);
                continue;
            }

            let body: ChatCompletionResponse = response.json().await.map_err(|e| {
                MobgenError::LlmApi(LlmApiError::InvalidResponse(format!(
                    "failed to decode completion: {e}"
                )))
            })?;

            let content = body
                .choices
                .first()
                .map(|c| c.message.content.clone())
                .ok_or_else(|| {
                    MobgenError::LlmApi(LlmApiError::InvalidResponse(
                        "no choices in response".to_string(),
                    ))
                })?;

            let (input_tokens, output_tokens) = body
                .usage
                .map(|u| (u.prompt_tokens, u.completion_tokens))
                .unwrap_or((0, 0));
            self.total_input_tokens
                .fetch_add(u64::from(input_tokens), Ordering::Relaxed);
            self.total_output_tokens
                .fetch_add(u64::from(output_tokens), Ordering::Relaxed);

            return Ok(CompletionResponse {
                content,
                model: body.model.unwrap_or_else(|| model.id.clone()),
                input_tokens,
                output_tokens,
                duration: start.elapsed(),
            });
        }

        Err(MobgenError::LlmApi(LlmApiError::MaxRetriesExceeded {
            attempts: self.max_retries,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string()),
        }))
    }

    /// Complete with system and user prompts.
    pub async fn complete_with_system(
        &self,
        model: &ModelSpec,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<CompletionResponse> {
        let messages = vec![Message::system(system_prompt), Message::user(user_prompt)];
        self.complete(model, messages).await
    }

    /// Complete and decode the first JSON object in the reply.
    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        model: &ModelSpec,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<T> {
        let response = self
            .complete_with_system(model, system_prompt, user_prompt)
            .await?;
        parse_json_reply(&response.content)
    }

    /// Total (input, output) tokens used by this client.
    pub fn total_tokens(&self) -> (u64, u64) {
        (
            self.total_input_tokens.load(Ordering::Relaxed),
            self.total_output_tokens.load(Ordering::Relaxed),
        )
    }

    /// Ping the /models endpoint.
    pub async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let url = format!("{}/models", self.base_url);
        let headers = match self.headers() {
            Ok(h) => h,
            Err(e) => {
                return HealthCheckResult {
                    status: HealthStatus::Unreachable,
                    latency_ms: None,
                    error: Some(e.to_string()),
                };
            }
        };

        match self
            .client
            .get(&url)
            .headers(headers)
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(response) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                if response.status().is_success() {
                    HealthCheckResult {
                        status: HealthStatus::Healthy,
                        latency_ms: Some(latency_ms),
                        error: None,
                    }
                } else {
                    HealthCheckResult {
                        status: HealthStatus::Unhealthy,
                        latency_ms: Some(latency_ms),
                        error: Some(format!("HTTP {}", response.status().as_u16())),
                    }
                }
            }
            Err(e) => HealthCheckResult {
                status: HealthStatus::Unreachable,
                latency_ms: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Seconds to wait from a `retry-after` header value.
///
/// Negative, NaN and infinite values are rejected; large ones are capped.
fn parse_retry_after(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| secs.min(MAX_RETRY_AFTER_SECS))
}

/// Pull a JSON object out of a model reply and decode it.
///
/// Accepts a fenced ```json block, or falls back to the outermost braces.
pub fn parse_json_reply<T: DeserializeOwned>(content: &str) -> Result<T> {
    let fenced = Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```")
        .ok()
        .and_then(|re| re.captures(content))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str());

    let candidate = match fenced {
        Some(block) => block,
        None => {
            let start = content.find('{');
            let end = content.rfind('}');
            match (start, end) {
                (Some(s), Some(e)) if s < e => &content[s..=e],
                _ => {
                    return Err(MobgenError::ParseError(
                        "no JSON object in model reply".to_string(),
                    ));
                }
            }
        }
    };

    serde_json::from_str(candidate)
        .map_err(|e| MobgenError::ParseError(format!("invalid JSON in model reply: {e}")))
}

/// Health check result.
#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

/// Health status of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Unreachable,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
            HealthStatus::Unreachable => write!(f, "unreachable"),
        }
    }
}
