//! Build tier bridges from configuration

use aios_core::config::{LocalBridgeConfig, OracleConfig};
use aios_llm::{GeminiEndpoint, GeminiProvider, LlmProvider, OllamaProvider};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub fn local_provider(config: &LocalBridgeConfig) -> Arc<dyn LlmProvider> {
    Arc::new(
        OllamaProvider::new(&config.model)
            .with_base_url(&config.base_url)
            .with_timeout(Duration::from_secs(config.timeout_secs)),
    )
}

/// Oracle bridge, or `None` when no credentials are available.
///
/// Vertex is used when both project and location are configured; otherwise
/// AI Studio with the key from `api_key_env`.
pub fn oracle_provider(config: &OracleConfig) -> Option<Arc<dyn LlmProvider>> {
    oracle_provider_with(config, |name| std::env::var(name).ok())
}

pub fn oracle_provider_with(
    config: &OracleConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Option<Arc<dyn LlmProvider>> {
    let endpoint = match (&config.vertex_project, &config.vertex_location) {
        (Some(project), Some(location)) => {
            let token = env(&config.access_token_env).filter(|t| !t.is_empty())?;
            info!("oracle: Vertex AI {}/{}", project, location);
            GeminiEndpoint::vertex(project, location, token)
        }
        _ => {
            let key = env(&config.api_key_env).filter(|k| !k.is_empty())?;
            GeminiEndpoint::studio(key)
        }
    };
    let mut provider = GeminiProvider::new(endpoint, &config.model)
        .with_timeout(Duration::from_secs(config.timeout_secs));
    if let Some(url) = &config.base_url {
        provider = provider.with_base_url(url);
    }
    Some(Arc::new(provider))
}
