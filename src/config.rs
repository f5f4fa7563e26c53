//! Configuration types for bill extraction and reporting.
//!
//! Extraction behaviour is controlled through [`ExtractionConfig`], built via
//! [`ExtractionConfigBuilder`]; report layout through [`ReportConfig`]. One
//! struct per concern keeps configs easy to share across tasks and to log.

use crate::error::BillReconError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Configuration for extraction attempts and anomaly checks.
///
/// # Example
/// ```rust
/// use edgequake_billrecon::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .dpi(200)
///     .model("gpt-4.1-mini")
///     .api_timeout_secs(90)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Rendering DPI used when rasterising each page. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Maximum rendered image dimension in pixels. Default: 2000.
    ///
    /// Caps memory on oversized scans regardless of DPI.
    pub max_rendered_pixels: u32,

    /// LLM model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "gemini", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0.
    ///
    /// Extraction is transcription; any creativity shows up as invented
    /// bill numbers.
    pub temperature: f32,

    /// Maximum tokens the model may generate per call. Default: 8192.
    ///
    /// A long itemised document can list dozens of bills; the reply must fit.
    pub max_tokens: usize,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Custom extraction instruction. If None, uses the built-in one.
    pub extraction_prompt: Option<String>,

    /// Custom anomaly-check instruction. If None, uses the built-in one.
    pub anomaly_prompt: Option<String>,

    /// Per remote call timeout in seconds; 0 disables. Default: 120.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional progress callback for extraction attempts.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            max_rendered_pixels: 2000,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 8192,
            password: None,
            extraction_prompt: None,
            anomaly_prompt: None,
            api_timeout_secs: 120,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("extraction_prompt", &self.extraction_prompt.is_some())
            .field("anomaly_prompt", &self.anomaly_prompt.is_some())
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("progress_callback", &self.progress_callback.is_some())
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn extraction_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.extraction_prompt = Some(prompt.into());
        self
    }

    pub fn anomaly_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.anomaly_prompt = Some(prompt.into());
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, BillReconError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(BillReconError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.max_tokens == 0 {
            return Err(BillReconError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        for (label, prompt) in [
            ("extraction", &c.extraction_prompt),
            ("anomaly", &c.anomaly_prompt),
        ] {
            if matches!(prompt, Some(p) if p.trim().is_empty()) {
                return Err(BillReconError::InvalidConfig(format!(
                    "{label} prompt must not be blank"
                )));
            }
        }
        Ok(self.config)
    }
}

/// Layout options for the compiled report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Heading printed above the header lines. Default: "Medical Bill Summary".
    pub title: String,

    /// Table rows per rendered page. Default: 25.
    pub rows_per_page: usize,

    /// Currency label appended to the amount column heading. Default: "INR".
    pub currency_label: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            title: "Medical Bill Summary".to_string(),
            rows_per_page: 25,
            currency_label: "INR".to_string(),
        }
    }
}

impl ReportConfig {
    /// Validate and normalise; `rows_per_page` of 0 is rejected.
    pub fn validated(self) -> Result<Self, BillReconError> {
        if self.rows_per_page == 0 {
            return Err(BillReconError::InvalidConfig(
                "rows_per_page must be ≥ 1".into(),
            ));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ExtractionConfig::default();
        assert_eq!(c.dpi, 150);
        assert_eq!(c.temperature, 0.0);
        assert_eq!(c.max_tokens, 8192);
        assert_eq!(c.api_timeout_secs, 120);
        assert!(c.provider.is_none());
    }

    #[test]
    fn builder_clamps() {
        let c = ExtractionConfig::builder()
            .dpi(10)
            .temperature(9.0)
            .max_rendered_pixels(1)
            .build()
            .unwrap();
        assert_eq!(c.dpi, 72);
        assert_eq!(c.temperature, 2.0);
        assert_eq!(c.max_rendered_pixels, 100);
    }

    #[test]
    fn builder_rejects_zero_tokens_and_blank_prompt() {
        let err = ExtractionConfig::builder().max_tokens(0).build().unwrap_err();
        assert!(matches!(err, BillReconError::InvalidConfig(_)));

        let err = ExtractionConfig::builder()
            .extraction_prompt("   ")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("extraction prompt must not be blank"));
    }

    #[test]
    fn builder_rejects_blank_anomaly_prompt() {
        let err = ExtractionConfig::builder()
            .anomaly_prompt("\n\t ")
            .build()
            .unwrap_err();
        assert!(matches!(err, BillReconError::InvalidConfig(_)));
        assert!(err.to_string().contains("anomaly prompt must not be blank"));

        let config = ExtractionConfig::builder()
            .anomaly_prompt("List duplicate bills.")
            .build()
            .unwrap();
        assert_eq!(config.anomaly_prompt.as_deref(), Some("List duplicate bills."));
    }

    #[test]
    fn debug_redacts_password() {
        let c = ExtractionConfig::builder().password("hunter2").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn report_config_validation() {
        assert!(ReportConfig::default().validated().is_ok());
        let bad = ReportConfig {
            rows_per_page: 0,
            ..ReportConfig::default()
        };
        assert!(bad.validated().is_err());
    }
}
