//! Application configuration

pub mod loader;
pub mod types;

pub use loader::load_config;
pub use types::{
    ApiCredentials, AppConfig, AppSettings, ExchangeConfig, ExecutionConfig, OracleConfig,
    PipelineSettings, RiskLimits, SentimentConfig, SessionConfig, TelegramConfig,
};
