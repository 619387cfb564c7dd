use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::core::config::settings::LlmSettings;
use crate::core::errors::ApiError;
use crate::llm::provider::LlmProvider;
use crate::llm::types::{ChatMessage, ChatRequest};

/// Model-aware front for a provider: applies the configured model ids,
/// sampling defaults and a timeout to every call.
#[derive(Clone)]
pub struct LlmService {
    provider: Arc<dyn LlmProvider>,
    settings: LlmSettings,
}

impl LlmService {
    pub fn new(provider: Arc<dyn LlmProvider>, settings: LlmSettings) -> Self {
        Self { provider, settings }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn chat_model(&self) -> &str {
        &self.settings.chat_model
    }

    /// Single-prompt completion returning the full text.
    pub async fn complete(&self, prompt: &str) -> Result<String, ApiError> {
        self.complete_messages(vec![ChatMessage::user(prompt)]).await
    }

    pub async fn complete_messages(&self, messages: Vec<ChatMessage>) -> Result<String, ApiError> {
        let request = self.build_request(messages);
        let model = self.settings.chat_model.clone();
        with_timeout(
            self.settings.timeout(),
            "completion",
            self.provider.chat(request, &model),
        )
        .await
    }

    pub async fn stream_complete(
        &self,
        messages: Vec<ChatMessage>,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        let request = self.build_request(messages);
        let model = self.settings.chat_model.clone();
        with_timeout(
            self.settings.timeout(),
            "streaming completion",
            self.provider.stream_chat(request, &model),
        )
        .await
    }

    pub async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let model = self.settings.embedding_model.clone();
        with_timeout(
            self.settings.timeout(),
            "embedding",
            self.provider.embed(inputs, &model),
        )
        .await
    }

    pub async fn embed_one(&self, input: &str) -> Result<Vec<f32>, ApiError> {
        let mut vectors = self.embed(&[input.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ApiError::Upstream("embedding provider returned no vector".to_string()))
    }

    pub async fn health_check(&self) -> bool {
        match tokio::time::timeout(Duration::from_secs(5), self.provider.health_check()).await {
            Ok(Ok(healthy)) => healthy,
            Ok(Err(err)) => {
                tracing::debug!("LLM health check failed: {}", err);
                false
            }
            Err(_) => false,
        }
    }

    fn build_request(&self, messages: Vec<ChatMessage>) -> ChatRequest {
        ChatRequest::new(messages)
            .with_temperature(self.settings.temperature)
            .with_max_tokens(self.settings.max_tokens)
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    what: &str,
    fut: impl Future<Output = Result<T, ApiError>>,
) -> Result<T, ApiError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ApiError::Upstream(format!(
            "{} timed out after {}s",
            what,
            timeout.as_secs()
        ))),
    }
}
