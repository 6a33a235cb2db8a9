//! DcaSentinel Library
//!
//! A guarded dollar-cost-averaging decision pipeline: concurrent research,
//! strategy options with specialist consultations, a selector gated by a
//! deterministic risk guardrail, and exchange-legal order execution.

pub mod common;
pub mod config;
pub mod execution;
pub mod market;
pub mod notify;
pub mod oracle;
pub mod pipeline;
pub mod risk;
pub mod session;

// Re-export commonly used types
pub use common::errors::{DcaError, Result};
pub use common::traits::{Exchange, Notifier, SessionStore};
pub use common::types::{Balance, OpenOrder, OrderAck, OrderBook, Portfolio, Side, SymbolFilters};
pub use config::types::AppConfig;
pub use execution::{normalize, BinanceClient, ExecutionMode, ExecutionResult, Executor};
pub use market::{ContextBuilder, FearGreedCache, FearGreedReading, MarketContext};
pub use oracle::{LlmOracle, Oracle, OracleError, OracleOutput, Role};
pub use pipeline::DcaPipeline;
pub use risk::{Guardrail, GuardrailOutcome, GuardrailStatus, Violation};
pub use session::{JsonlSessionStore, Session, SessionType};
