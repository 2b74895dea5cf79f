//! # Remote Model Client
//!
//! The seam for the out-of-process summarization and reduction calls. The
//! transport belongs to the host; this module fixes the request shape, the
//! error taxonomy and per-call timeouts.

use crate::error::InsightsError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Failures of a single remote call. The pipeline treats them alike.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RemoteCallError {
    #[error("Remote call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Remote transport error: {0}")]
    Transport(String),

    #[error("Remote output was not valid JSON: {0}")]
    MalformedOutput(String),
}

impl From<RemoteCallError> for InsightsError {
    fn from(err: RemoteCallError) -> Self {
        InsightsError::RemoteCallFailure(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

#[async_trait]
pub trait RemoteModelClient: Send + Sync {
    /// Model identifier, part of the relevant config for cache keys
    fn model_name(&self) -> &str;

    /// One chat round trip whose reply is expected to be a JSON document
    async fn chat_json(&self, prompt: &Prompt) -> Result<Value, RemoteCallError>;
}

/// Run one call under its own deadline
pub async fn call_with_timeout(
    client: &dyn RemoteModelClient,
    prompt: &Prompt,
    timeout: Duration,
) -> Result<Value, RemoteCallError> {
    match tokio::time::timeout(timeout, client.chat_json(prompt)).await {
        Ok(result) => result,
        Err(_) => Err(RemoteCallError::Timeout(timeout)),
    }
}

/// Pull the JSON document out of a text reply. Models occasionally wrap it
/// in a code fence or surround it with prose.
pub fn extract_json(reply: &str) -> Result<Value, RemoteCallError> {
    let trimmed = reply.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    let start = trimmed.find(['{', '[']);
    let end = trimmed.rfind(['}', ']']);
    match (start, end) {
        (Some(start), Some(end)) if start < end => serde_json::from_str(&trimmed[start..=end])
            .map_err(|e| RemoteCallError::MalformedOutput(e.to_string())),
        _ => Err(RemoteCallError::MalformedOutput(
            "reply contains no JSON document".to_string(),
        )),
    }
}
