use serde::Deserialize;
use validator::Validate;

use crate::models::product::Platform;

/// Configuration for the purchase lifecycle manager.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StoreConfig {
    /// Application name, first half of the validator Basic-auth credentials.
    #[validate(length(min = 1))]
    pub app_name: String,
    /// Public API key, second half of the validator credentials.
    #[validate(length(min = 1))]
    pub public_key: String,
    /// Base URL of the receipt validator (no trailing slash).
    #[validate(url)]
    pub base_url: String,
    /// Store platform this process runs against.
    pub platform: Platform,
    /// iOS bundle identifier, required to validate application receipts.
    #[serde(default)]
    pub ios_bundle_id: Option<String>,
}

impl StoreConfig {
    /// Load configuration from `purchasekit.{yml,toml,json}` with
    /// `PURCHASEKIT__`-prefixed environment variable overrides.
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load .env if present (for environment variable overrides)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("purchasekit").required(false))
            .add_source(
                config::Environment::with_prefix("PURCHASEKIT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config
            .validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(config)
    }
}
