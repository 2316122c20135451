//! Generative backend over the `edgequake-llm` provider abstraction.
//!
//! The adapter is intentionally thin: it converts a [`GenerateRequest`] into
//! provider chat messages, runs one completion, and classifies the failure.
//! No retries and no deadlines here — the structuring layer owns the
//! attempt/timeout policy, and stacking a second retry loop under it would
//! multiply worst-case latency.

use crate::backend::{BackendError, EncodedImage, GenerateRequest, GenerativeBackend};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::debug;

/// Production [`GenerativeBackend`] backed by any `edgequake-llm` provider.
pub struct EdgequakeBackend {
    provider: Arc<dyn LLMProvider>,
}

impl EdgequakeBackend {
    /// Wrap a pre-constructed provider (custom middleware, tests against a
    /// local server).
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        EdgequakeBackend { provider }
    }

    /// Instantiate a named provider, e.g. `("gemini", Some("gemini-1.5-pro"))`.
    ///
    /// The factory reads the matching API key (`GEMINI_API_KEY`,
    /// `OPENAI_API_KEY`, ...) from the environment.
    pub fn from_provider_name(name: &str, model: &str) -> Result<Self, BackendError> {
        let provider = ProviderFactory::create_llm_provider(name, model)
            .map_err(|e| BackendError::Auth(format!("provider {name} not configured: {e}")))?;
        Ok(EdgequakeBackend { provider })
    }

    /// Auto-detect a provider from the environment, optionally overriding the
    /// model.
    pub fn from_env(model: Option<&str>) -> Result<Self, BackendError> {
        if let (Ok(name), Some(model)) = (std::env::var("EDGEQUAKE_LLM_PROVIDER"), model) {
            return Self::from_provider_name(&name, model);
        }
        let (provider, _embedding) = ProviderFactory::from_env().map_err(|e| {
            BackendError::Auth(format!("no LLM provider auto-detected from environment: {e}"))
        })?;
        Ok(EdgequakeBackend { provider })
    }
}

#[async_trait]
impl GenerativeBackend for EdgequakeBackend {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, BackendError> {
        // Text-only requests carry instructions and payload in one user turn,
        // matching how single-shot structuring calls behave best across
        // providers. Vision requests split into a system turn plus a user
        // turn holding the attachments, since providers require at least one
        // user message and the images carry all the content.
        let messages = if request.images.is_empty() {
            vec![ChatMessage::user_with_images(&request.prompt, Vec::new())]
        } else {
            let images: Vec<ImageData> = request.images.iter().map(to_image_data).collect();
            vec![
                ChatMessage::system(&request.prompt),
                ChatMessage::user_with_images("", images),
            ]
        };

        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| classify(&e.to_string()))?;

        debug!(
            prompt_tokens = response.prompt_tokens,
            completion_tokens = response.completion_tokens,
            "completion finished"
        );

        if response.content.trim().is_empty() {
            return Err(BackendError::Blocked("empty completion".to_string()));
        }
        Ok(response.content)
    }
}

fn to_image_data(img: &EncodedImage) -> ImageData {
    ImageData::new(img.data.clone(), img.mime_type.clone()).with_detail("high")
}

/// Map a provider error message onto our failure classes.
///
/// Provider crates expose stringly errors across transports, so this is
/// substring matching on the stable parts (HTTP status codes and the usual
/// keywords).
fn classify(message: &str) -> BackendError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("401") || lower.contains("403") || lower.contains("api key")
        || lower.contains("unauthorized") || lower.contains("permission")
    {
        BackendError::Auth(message.to_string())
    } else if lower.contains("429") || lower.contains("quota") || lower.contains("rate limit")
        || lower.contains("resource exhausted")
    {
        BackendError::Quota(message.to_string())
    } else if lower.contains("blocked") || lower.contains("safety") {
        BackendError::Blocked(message.to_string())
    } else {
        BackendError::Other(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_auth() {
        assert!(matches!(
            classify("HTTP 401 Unauthorized: invalid API key"),
            BackendError::Auth(_)
        ));
        assert!(matches!(
            classify("PERMISSION_DENIED: caller lacks access"),
            BackendError::Auth(_)
        ));
    }

    #[test]
    fn classify_quota() {
        assert!(matches!(
            classify("429 Too Many Requests"),
            BackendError::Quota(_)
        ));
        assert!(matches!(
            classify("RESOURCE EXHAUSTED: quota exceeded for project"),
            BackendError::Quota(_)
        ));
    }

    #[test]
    fn classify_other_is_default() {
        assert!(matches!(
            classify("connection reset by peer"),
            BackendError::Other(_)
        ));
    }
}
