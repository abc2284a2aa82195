//! Generative model providers for Madoguchi.
//!
//! All providers implement the `madoguchi_core::Provider` trait.
//! [`build_from_config`] assembles the production stack: Gemini wrapped in
//! bounded retry.

pub mod gemini;
pub mod retry;

pub use gemini::GeminiProvider;
pub use retry::RetryProvider;

use madoguchi_config::AppConfig;
use madoguchi_core::provider::Provider;
use std::sync::Arc;
use std::time::Duration;

/// Build the configured provider. A missing API key yields a provider whose
/// calls fail with `NotConfigured`, which the orchestrator degrades.
pub fn build_from_config(config: &AppConfig) -> Arc<dyn Provider> {
    let api_key = config.model.api_key.clone().unwrap_or_default();
    let gemini = match &config.model.api_url {
        Some(url) => GeminiProvider::with_base_url(url, api_key),
        None => GeminiProvider::new(api_key),
    };

    Arc::new(
        RetryProvider::new(Arc::new(gemini))
            .with_timeout(Duration::from_secs(config.model.timeout_secs))
            .with_max_retries(config.model.max_retries)
            .with_backoff(Duration::from_millis(config.model.retry_backoff_ms)),
    )
}
