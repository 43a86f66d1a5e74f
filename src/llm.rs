//! LLM client abstraction and Gemini API implementation.
//!
//! This module provides a generic [`LlmClient`] trait for interacting with
//! language models, along with concrete implementations:
//!
//! - [`GeminiClient`]: production client for Google's Generative Language API
//! - [`MockLlmClient`]: test double for unit tests
//!
//! Used by the SQL resolver to turn a question plus schema context into SQL.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default Gemini model when `GEMINI_MODEL` is unset.
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The GEMINI_API_KEY environment variable is not set.
    #[error("GEMINI_API_KEY environment variable not set")]
    MissingApiKey,

    /// HTTP or network error occurred.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Failed to parse the API response.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Model returned no text content.
    #[error("Model returned empty response")]
    EmptyResponse,
}

// ============================================================================
// Completion Type
// ============================================================================

/// The result of a successful LLM completion request.
#[derive(Debug, Clone)]
pub struct Completion {
    /// The generated text from the model.
    pub text: String,
}

// ============================================================================
// LlmClient Trait
// ============================================================================

/// Generic interface for LLM clients.
///
/// Supports simple system+user prompt completion with text response.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a completion given a system prompt and user message.
    async fn complete(&self, system: &str, user: &str) -> Result<Completion, LlmError>;
}

// ============================================================================
// Gemini API Implementation
// ============================================================================

/// Client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    api_key: String,
    model: String,
    max_output_tokens: u32,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: Option<u16>,
    message: String,
}

impl GeminiClient {
    /// Create a new client by reading the API key from the environment.
    ///
    /// Reads `GEMINI_API_KEY` and the optional `GEMINI_MODEL`.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::MissingApiKey`] if the key is not set or empty.
    pub fn from_env(timeout: Duration) -> Result<Self, LlmError> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(LlmError::MissingApiKey)?;
        let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::new(api_key, model, timeout)
    }

    /// Create a new client with an explicit API key and model.
    pub fn new(api_key: String, model: String, timeout: Duration) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Http(e.to_string()))?;
        Ok(Self {
            api_key,
            model,
            max_output_tokens: 2048,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(&self, system: &str, user: &str) -> Result<Completion, LlmError> {
        let request_body = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: system.to_string(),
                }],
            },
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: user.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.0,
                max_output_tokens: self.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(format!("{GEMINI_ENDPOINT}/{}:generateContent", self.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;

        let text = completion_text(&body).map_err(|e| match e {
            LlmError::Parse(msg) if !status.is_success() => {
                LlmError::Http(format!("status {status}: {msg}"))
            }
            other => other,
        })?;

        Ok(Completion { text })
    }
}

/// Pull the concatenated text of the first candidate out of a response body.
fn completion_text(body: &str) -> Result<String, LlmError> {
    let parsed: GenerateResponse =
        serde_json::from_str(body).map_err(|e| LlmError::Parse(e.to_string()))?;

    if let Some(err) = parsed.error {
        let code = err.code.map(|c| c.to_string()).unwrap_or_default();
        return Err(LlmError::Http(format!("{code} {}", err.message).trim().to_string()));
    }

    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .ok_or(LlmError::EmptyResponse)?
        .parts
        .into_iter()
        .map(|p| p.text)
        .collect();

    if text.trim().is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(text)
}

// ============================================================================
// Mock Implementation (Test Only)
// ============================================================================

/// Mock LLM client for testing. Returns pre-programmed replies in FIFO order
/// and records every prompt it receives.
#[cfg(test)]
pub struct MockLlmClient {
    /// Pre-programmed replies (or faults) to return in FIFO order.
    pub responses: std::sync::Mutex<std::collections::VecDeque<Result<String, String>>>,
    /// `(system, user)` pairs seen so far.
    pub prompts: std::sync::Mutex<Vec<(String, String)>>,
}

#[cfg(test)]
impl MockLlmClient {
    /// Create a new mock client with a sequence of successful responses.
    ///
    /// # Panics
    ///
    /// [`complete`](LlmClient::complete) panics when called more times
    /// than there are responses.
    pub fn new(responses: Vec<String>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    /// Create a mock whose queue may contain faults (`Err` becomes [`LlmError::Http`]).
    pub fn with_results(results: Vec<Result<String, String>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(results.into()),
            prompts: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<(String, String)> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[cfg(test)]
#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, system: &str, user: &str) -> Result<Completion, LlmError> {
        self.prompts
            .lock()
            .unwrap()
            .push((system.to_string(), user.to_string()));

        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("MockLlmClient: no more responses available");

        next.map(|text| Completion { text }).map_err(LlmError::Http)
    }
}

// ============================================================================
// Tests
// ============================================================================
