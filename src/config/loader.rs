//! Configuration loader

use config::{Config, ConfigBuilder, Environment, File};
use config::builder::DefaultState;
use std::path::Path;

use super::types::AppConfig;
use crate::common::errors::{DcaError, Result};

/// Well-known credential variables mapped onto config keys
const CREDENTIAL_VARS: &[(&str, &str)] = &[
    ("BINANCE_API_KEY", "exchange.api_key"),
    ("BINANCE_API_SECRET", "exchange.api_secret"),
    ("ANTHROPIC_API_KEY", "oracle.api_key"),
    ("TELEGRAM_BOT_TOKEN", "telegram.bot_token"),
    ("TELEGRAM_CHAT_ID", "telegram.chat_id"),
];

/// Load configuration from file and environment variables
///
/// Priority (highest to lowest):
/// 1. Credential variables (`BINANCE_API_KEY`, `ANTHROPIC_API_KEY`, ...)
/// 2. Environment variables prefixed with `DCA_`, nested with `__`
/// 3. Configuration file (TOML format)
/// 4. Default values
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path).required(false));
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("DCA")
            .prefix_separator("_")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("pipeline.assets")
            .try_parsing(true),
    );

    builder = apply_credential_overrides(builder, |name| std::env::var(name).ok())?;

    let config = builder
        .build()
        .map_err(|e| DcaError::Configuration(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| DcaError::Configuration(e.to_string()))
}

/// Apply credential variables as overrides, reading them through `lookup`
fn apply_credential_overrides<F>(
    mut builder: ConfigBuilder<DefaultState>,
    lookup: F,
) -> Result<ConfigBuilder<DefaultState>>
where
    F: Fn(&str) -> Option<String>,
{
    for (var, key) in CREDENTIAL_VARS {
        let value = lookup(var).filter(|v| !v.trim().is_empty());
        builder = builder
            .set_override_option(*key, value)
            .map_err(|e| DcaError::Configuration(e.to_string()))?;
    }
    Ok(builder)
}
