//! Per-cycle market snapshot, indicators and sentiment

pub mod context;
pub mod indicators;
pub mod sentiment;

pub use context::{ContextBuilder, MarketContext, MarketData};
pub use indicators::{Indicators, WindowStats, RSI_OVERBOUGHT, RSI_OVERSOLD};
pub use sentiment::{fear_greed_label, is_fresh, FearGreedCache, FearGreedClient, FearGreedReading};
