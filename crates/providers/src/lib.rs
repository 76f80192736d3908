//! LLM Provider implementations for RepoLens.
//!
//! All providers implement the `repolens_core::Provider` trait.
//! [`build_from_config`] picks the endpoint from configuration.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use repolens_config::ProviderConfig;
use repolens_core::error::ProviderError;
use repolens_core::provider::Provider;
use std::sync::Arc;

/// Build the configured model provider.
pub fn build_from_config(config: &ProviderConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let api_key = config.api_key.clone().ok_or_else(|| {
        ProviderError::NotConfigured(format!(
            "no API key for provider '{}' (set provider.api_key or REPOLENS_API_KEY)",
            config.kind
        ))
    })?;

    let provider = match (config.kind.as_str(), config.api_url.as_deref()) {
        (name, Some(url)) => OpenAiCompatProvider::new(name, url, api_key)?,
        ("openrouter", None) => OpenAiCompatProvider::openrouter(api_key)?,
        ("openai", None) => OpenAiCompatProvider::openai(api_key)?,
        (other, None) => {
            return Err(ProviderError::NotConfigured(format!(
                "unknown provider kind '{other}'"
            )));
        }
    };
    Ok(Arc::new(provider))
}
