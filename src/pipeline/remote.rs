//! Remote model: send page images to the vision LLM and return its reply.
//!
//! [`RemoteModel`] has two calls. `extract` asks for the structured JSON
//! payload and returns the raw text (or `None` when the service answered with
//! nothing). `advise` asks for free-form anomaly notes. Parsing is not done
//! here; see [`crate::normalize`].
//!
//! Each call is a single attempt with no retry. A failure surfaces to the
//! caller, who can start a new attempt.

use crate::config::ExtractionConfig;
use crate::error::BillReconError;
use crate::schema::{AnomalyRequest, ExtractionRequest};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Vision-capable remote service.
pub trait RemoteModel: Send + Sync {
    /// Structured extraction. `Ok(None)` means the reply was empty.
    fn extract(
        &self,
        request: &ExtractionRequest,
    ) -> impl Future<Output = Result<Option<String>, BillReconError>> + Send;

    /// Free-form anomaly advisory text.
    fn advise(
        &self,
        request: &AnomalyRequest,
    ) -> impl Future<Output = Result<String, BillReconError>> + Send;
}

/// [`RemoteModel`] backed by an `edgequake-llm` provider.
#[derive(Clone)]
pub struct LlmRemote {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
    api_timeout_secs: u64,
}

impl std::fmt::Debug for LlmRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmRemote")
            .field("provider", &"<dyn LLMProvider>")
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl LlmRemote {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            api_timeout_secs: config.api_timeout_secs,
        }
    }

    /// Resolve the provider from `config` and wrap it.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, BillReconError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config))
    }

    /// One chat round-trip: system instruction, then the page images.
    async fn send(
        &self,
        label: &str,
        instruction: String,
        images: &[crate::pipeline::encode::PageImage],
    ) -> Result<String, BillReconError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(instruction),
            // Empty text: the images carry the content, but the API needs a user turn.
            ChatMessage::user_with_images("", images.iter().map(|p| p.to_image_data()).collect()),
        ];
        let options = build_options(self.temperature, self.max_tokens);
        let call = self.provider.chat(&messages, Some(&options));

        let result = if self.api_timeout_secs == 0 {
            call.await
        } else {
            match timeout(Duration::from_secs(self.api_timeout_secs), call).await {
                Ok(r) => r,
                Err(_) => {
                    warn!("{}: no reply within {}s", label, self.api_timeout_secs);
                    return Err(BillReconError::ApiTimeout {
                        secs: self.api_timeout_secs,
                    });
                }
            }
        };

        match result {
            Ok(response) => {
                debug!(
                    "{}: {} pages, {} input tokens, {} output tokens, {:?}",
                    label,
                    images.len(),
                    response.prompt_tokens,
                    response.completion_tokens,
                    start.elapsed()
                );
                Ok(response.content)
            }
            Err(e) => {
                warn!("{}: request failed: {}", label, e);
                Err(BillReconError::ServiceFailure {
                    message: e.to_string(),
                })
            }
        }
    }
}

impl RemoteModel for LlmRemote {
    async fn extract(&self, request: &ExtractionRequest) -> Result<Option<String>, BillReconError> {
        let content = self
            .send("extraction", request.prompt(), &request.images)
            .await?;
        if content.trim().is_empty() {
            Ok(None)
        } else {
            Ok(Some(content))
        }
    }

    async fn advise(&self, request: &AnomalyRequest) -> Result<String, BillReconError> {
        self.send("anomaly check", request.instruction.clone(), &request.images)
            .await
    }
}

fn build_options(temperature: f32, max_tokens: usize) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, BillReconError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        BillReconError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model`.
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`,
///    when both are set.
/// 4. **OpenAI** when `OPENAI_API_KEY` is present.
/// 5. **Full auto-detection** via [`ProviderFactory::from_env`].
pub fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, BillReconError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| BillReconError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
