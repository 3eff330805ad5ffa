pub mod keyword;
pub mod wit;

pub use keyword::KeywordNlu;
pub use wit::WitClient;

use std::sync::Arc;

use anyhow::{Context, Result};
use lisa_config::{NluConfig, NluProviderKind};
use lisa_core::NluClient;
use tracing::info;

/// Build the NLU collaborator selected by the configuration.
pub fn from_config(config: &NluConfig) -> Result<Arc<dyn NluClient>> {
    let client: Arc<dyn NluClient> = match config.provider.unwrap_or_default() {
        NluProviderKind::Wit => {
            let token = config.token.clone().context("nlu.token is required by the wit provider")?;
            let mut client = WitClient::new(token);
            if let Some(url) = &config.base_url {
                client = client.with_base_url(url);
            }
            if let Some(version) = &config.api_version {
                client = client.with_api_version(version);
            }
            Arc::new(client)
        }
        NluProviderKind::Keyword => Arc::new(KeywordNlu::new(&config.keywords)?),
    };
    info!(provider = %client.name(), "NLU provider ready");
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_from_config_selects_provider() {
        let keyword = NluConfig {
            keywords: HashMap::from([("lights_off".to_string(), vec!["lights off".to_string()])]),
            ..NluConfig::default()
        };
        assert_eq!(from_config(&keyword).unwrap().name(), "keyword");

        let wit = NluConfig {
            provider: Some(NluProviderKind::Wit),
            token: Some("secret".into()),
            ..NluConfig::default()
        };
        assert_eq!(from_config(&wit).unwrap().name(), "wit");

        let missing_token = NluConfig {
            provider: Some(NluProviderKind::Wit),
            ..NluConfig::default()
        };
        assert!(from_config(&missing_token).is_err());
    }
}
