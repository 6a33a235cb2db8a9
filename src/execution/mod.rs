//! Order normalization and submission

pub mod auth;
pub mod binance;
pub mod executor;
pub mod messages;
pub mod normalizer;

pub use binance::BinanceClient;
pub use executor::{ExecutionMode, ExecutionResult, ExecutionSummary, Executor, DRY_RUN_FEE_RATE};
pub use normalizer::{normalize, NormalizedOrder, RejectReason};
