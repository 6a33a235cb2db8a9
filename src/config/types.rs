//! Configuration types

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::execution::ExecutionMode;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Exchange connection settings
    #[serde(default)]
    pub exchange: ExchangeConfig,
    /// Reasoning oracle settings
    #[serde(default)]
    pub oracle: OracleConfig,
    /// Hard limits enforced by the risk guardrail
    #[serde(default)]
    pub limits: RiskLimits,
    /// Order execution settings
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Cycle-level settings
    #[serde(default)]
    pub pipeline: PipelineSettings,
    /// Fear & Greed sentiment source
    #[serde(default)]
    pub sentiment: SentimentConfig,
    /// Session history and trace output
    #[serde(default)]
    pub session: SessionConfig,
    /// Telegram notifications (optional)
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,
}

/// Binance spot exchange configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// API key for signed requests
    #[serde(default)]
    pub api_key: Option<String>,
    /// API secret for HMAC signing
    #[serde(default)]
    pub api_secret: Option<String>,
    /// REST base URL (testnet by default)
    #[serde(default = "default_exchange_rest_url")]
    pub rest_url: String,
    /// recvWindow sent with signed requests, in milliseconds
    #[serde(default = "default_recv_window")]
    pub recv_window_ms: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_secret: None,
            rest_url: default_exchange_rest_url(),
            recv_window_ms: default_recv_window(),
        }
    }
}

impl ExchangeConfig {
    /// Credentials when both key and secret are configured
    pub fn credentials(&self) -> Option<ApiCredentials> {
        match (&self.api_key, &self.api_secret) {
            (Some(key), Some(secret)) if !key.is_empty() && !secret.is_empty() => {
                Some(ApiCredentials::new(key.clone(), secret.clone()))
            }
            _ => None,
        }
    }
}

fn default_exchange_rest_url() -> String {
    "https://testnet.binance.vision".to_string()
}

fn default_recv_window() -> u64 {
    5000
}

/// Reasoning oracle (LLM) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    /// Messages endpoint URL
    #[serde(default = "default_oracle_url")]
    pub api_url: String,
    #[serde(default = "default_oracle_model")]
    pub model: String,
    /// Per-request HTTP timeout in milliseconds
    #[serde(default = "default_oracle_timeout")]
    pub timeout_ms: u64,
    /// Retries on 429, timeouts and transport errors
    #[serde(default = "default_oracle_retries")]
    pub max_retries: u32,
    #[serde(default = "default_oracle_max_tokens")]
    pub max_tokens: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_oracle_url(),
            model: default_oracle_model(),
            timeout_ms: default_oracle_timeout(),
            max_retries: default_oracle_retries(),
            max_tokens: default_oracle_max_tokens(),
        }
    }
}

fn default_oracle_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_oracle_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_oracle_timeout() -> u64 {
    60_000
}

fn default_oracle_retries() -> u32 {
    2
}

fn default_oracle_max_tokens() -> u32 {
    4096
}

/// Hard limits enforced by the guardrail. Not negotiable by the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Maximum open limit orders per asset
    #[serde(default = "default_max_orders_per_asset")]
    pub max_orders_per_asset: usize,
    /// Maximum open limit orders across all assets
    #[serde(default = "default_max_total_orders")]
    pub max_total_orders: usize,
    /// Maximum pending notional as a percentage of portfolio value
    #[serde(default = "default_max_exposure_pct")]
    pub max_exposure_pct: Decimal,
    /// Maximum distance of a limit price from market, in percent
    #[serde(default = "default_price_deviation_pct")]
    pub price_deviation_pct: Decimal,
    /// Minimum quote value of any placed order
    #[serde(default = "default_min_order_value")]
    pub min_order_value: Decimal,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_orders_per_asset: default_max_orders_per_asset(),
            max_total_orders: default_max_total_orders(),
            max_exposure_pct: default_max_exposure_pct(),
            price_deviation_pct: default_price_deviation_pct(),
            min_order_value: default_min_order_value(),
        }
    }
}

fn default_max_orders_per_asset() -> usize {
    3
}

fn default_max_total_orders() -> usize {
    5
}

fn default_max_exposure_pct() -> Decimal {
    dec!(50)
}

fn default_price_deviation_pct() -> Decimal {
    dec!(5)
}

fn default_min_order_value() -> Decimal {
    dec!(10)
}

/// Order execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// DryRun never touches exchange order endpoints
    #[serde(default)]
    pub mode: ExecutionMode,
    /// How far above the intended notional a min_qty bump may go, in percent
    #[serde(default = "default_budget_slack_pct")]
    pub budget_slack_pct: Decimal,
    /// Decimal places for quote amounts on market buys
    #[serde(default = "default_quote_precision")]
    pub quote_precision: u32,
    /// Per exchange call timeout in seconds
    #[serde(default = "default_call_timeout")]
    pub call_timeout_seconds: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            budget_slack_pct: default_budget_slack_pct(),
            quote_precision: default_quote_precision(),
            call_timeout_seconds: default_call_timeout(),
        }
    }
}

fn default_budget_slack_pct() -> Decimal {
    dec!(1)
}

fn default_quote_precision() -> u32 {
    2
}

fn default_call_timeout() -> u64 {
    30
}

/// Cycle-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Accumulation assets (base symbols)
    #[serde(default = "default_assets")]
    pub assets: Vec<String>,
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,
    /// Below this free quote balance the cycle is skipped
    #[serde(default = "default_min_quote_balance")]
    pub min_quote_balance: Decimal,
    #[serde(default = "default_kline_interval")]
    pub kline_interval: String,
    /// 96 hourly candles cover the 96h statistics window
    #[serde(default = "default_kline_limit")]
    pub kline_limit: u32,
    #[serde(default = "default_order_book_depth")]
    pub order_book_depth: u32,
    /// Timeout for each research query; a timed-out query is dropped
    #[serde(default = "default_research_timeout")]
    pub research_timeout_seconds: u64,
    /// Timeout for planner, strategist, selector, guardrail and verifier calls
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_seconds: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            assets: default_assets(),
            quote_asset: default_quote_asset(),
            min_quote_balance: default_min_quote_balance(),
            kline_interval: default_kline_interval(),
            kline_limit: default_kline_limit(),
            order_book_depth: default_order_book_depth(),
            research_timeout_seconds: default_research_timeout(),
            stage_timeout_seconds: default_stage_timeout(),
        }
    }
}

impl PipelineSettings {
    /// Exchange pair symbols for the configured assets
    pub fn pairs(&self) -> Vec<String> {
        self.assets
            .iter()
            .map(|a| crate::common::types::pair_symbol(a, &self.quote_asset))
            .collect()
    }
}

fn default_assets() -> Vec<String> {
    vec!["BTC".to_string(), "ADA".to_string()]
}

fn default_quote_asset() -> String {
    "USDT".to_string()
}

fn default_min_quote_balance() -> Decimal {
    dec!(10)
}

fn default_kline_interval() -> String {
    "1h".to_string()
}

fn default_kline_limit() -> u32 {
    96
}

fn default_order_book_depth() -> u32 {
    10
}

fn default_research_timeout() -> u64 {
    90
}

fn default_stage_timeout() -> u64 {
    180
}

/// Fear & Greed index source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentConfig {
    #[serde(default = "default_fear_greed_url")]
    pub url: String,
    /// Cached readings younger than this are reused
    #[serde(default = "default_fear_greed_ttl")]
    pub ttl_hours: i64,
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            url: default_fear_greed_url(),
            ttl_hours: default_fear_greed_ttl(),
        }
    }
}

fn default_fear_greed_url() -> String {
    "https://api.alternative.me/fng/".to_string()
}

fn default_fear_greed_ttl() -> i64 {
    6
}

/// Session history and trace output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Directory holding `sessions-YYYY-MM-DD.jsonl`
    #[serde(default = "default_sessions_dir")]
    pub dir: String,
    #[serde(default = "default_traces_dir")]
    pub traces_dir: String,
    #[serde(default = "default_save_trace")]
    pub save_trace: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dir: default_sessions_dir(),
            traces_dir: default_traces_dir(),
            save_trace: default_save_trace(),
        }
    }
}

fn default_sessions_dir() -> String {
    "sessions".to_string()
}

fn default_traces_dir() -> String {
    "traces".to_string()
}

fn default_save_trace() -> bool {
    true
}

/// Telegram bot notification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
    #[serde(default = "default_telegram_url")]
    pub api_url: String,
}

impl TelegramConfig {
    /// Both token and chat id are present
    pub fn is_configured(&self) -> bool {
        !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }
}

fn default_telegram_url() -> String {
    "https://api.telegram.org".to_string()
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Request timeout in seconds for exchange and sentiment HTTP clients
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

/// API credentials for signed exchange requests
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl ApiCredentials {
    pub fn new(api_key: String, api_secret: String) -> Self {
        Self {
            api_key,
            api_secret,
        }
    }
}
