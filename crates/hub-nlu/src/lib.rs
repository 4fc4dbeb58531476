//! hub-nlu: NLU provider clients for schedule-hub
//!
//! OpenAI / Azure OpenAI, Azure CLU and LUIS clients implementing
//! [`hub_core::NluProvider`], plus the response schemas they decode.

pub mod clu;
pub mod error;
pub mod luis;
pub mod openai;
pub mod schema;

use std::sync::Arc;

use hub_core::{NluConfig, NluProvider, NluProviderKind};
use tracing::info;

pub use clu::CluClient;
pub use error::{NluError, Result};
pub use luis::LuisClient;
pub use openai::OpenAiExtractor;
pub use schema::ProviderPayload;

/// Build the provider selected by `config.provider`
pub fn build_provider(config: &NluConfig) -> Result<Arc<dyn NluProvider>> {
    let provider: Arc<dyn NluProvider> = match config.provider {
        NluProviderKind::OpenAi => Arc::new(OpenAiExtractor::new(config)?),
        NluProviderKind::Clu => Arc::new(CluClient::new(config)?),
        NluProviderKind::Luis => Arc::new(LuisClient::new(config)?),
    };
    info!(provider = provider.name(), "NLU provider initialized");
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_provider_by_kind() {
        let openai = build_provider(&NluConfig {
            api_key: "sk-test".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(openai.name(), "openai");

        let clu = build_provider(&NluConfig {
            provider: NluProviderKind::Clu,
            endpoint: Some("https://lang.cognitiveservices.azure.com".to_string()),
            project_name: Some("p".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(clu.name(), "clu");

        let luis = build_provider(&NluConfig {
            provider: NluProviderKind::Luis,
            ..Default::default()
        });
        assert!(luis.is_err());
    }
}
