//! Frozen per-cycle market snapshot and the builder that assembles it

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::indicators::{Indicators, WindowStats};
use super::sentiment::FearGreedReading;
use crate::common::errors::{DcaError, Result};
use crate::common::traits::Exchange;
use crate::common::types::{pair_symbol, Balance, OpenOrder, OrderBook, Portfolio};
use crate::config::types::PipelineSettings;

/// Market telemetry for one asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MarketData {
    pub asset: String,
    pub pair: String,
    pub current_price: Decimal,
    pub price_change_24h_pct: Decimal,
    pub volume_24h: Decimal,
    pub price_change_96h_pct: Decimal,
    pub high_96h: Decimal,
    pub low_96h: Decimal,
    pub avg_96h: Decimal,
    /// Absent when the exchange returned too little history
    pub indicators: Option<Indicators>,
    /// Bid/ask spread as a percentage of the midpoint
    pub spread_pct: Option<Decimal>,
    pub order_book: OrderBook,
}

/// Immutable snapshot of everything a cycle reasons about
///
/// Built once per cycle and shared read-only (behind an `Arc`) by every
/// stage. Derived state is always a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MarketContext {
    pub timestamp: DateTime<Utc>,
    pub portfolio: Portfolio,
    /// Keyed by base asset symbol
    pub markets: BTreeMap<String, MarketData>,
    pub open_orders: Vec<OpenOrder>,
    pub fear_greed: Option<FearGreedReading>,
    /// Plan text of the previous cycle's decision, if any
    pub previous_plan: Option<String>,
}

impl MarketContext {
    pub fn quote_asset(&self) -> &str {
        &self.portfolio.quote_asset
    }

    /// Current price per base asset
    pub fn prices(&self) -> BTreeMap<String, Decimal> {
        self.markets
            .iter()
            .map(|(asset, data)| (asset.clone(), data.current_price))
            .collect()
    }

    pub fn price(&self, asset: &str) -> Option<Decimal> {
        self.markets.get(asset).map(|m| m.current_price)
    }

    pub fn rsi(&self, asset: &str) -> Option<Decimal> {
        self.markets
            .get(asset)
            .and_then(|m| m.indicators.as_ref())
            .map(|i| i.rsi)
    }

    /// Total portfolio value in quote currency
    pub fn portfolio_value(&self) -> Decimal {
        self.portfolio.total_value(&self.prices())
    }

    /// Free quote balance available to new buys
    pub fn available_capital(&self) -> Decimal {
        self.portfolio.free_quote()
    }

    /// Serialized form handed to the oracle
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Assembles a [`MarketContext`] through the exchange interface
pub struct ContextBuilder {
    exchange: Arc<dyn Exchange>,
    settings: PipelineSettings,
}

impl ContextBuilder {
    pub fn new(exchange: Arc<dyn Exchange>, settings: PipelineSettings) -> Self {
        Self { exchange, settings }
    }

    /// Fetch balances, market data and open orders
    ///
    /// Any exchange failure aborts the build with `DataUnavailable`, so a
    /// cycle never spends oracle calls on a partial snapshot.
    #[instrument(skip(self, fear_greed, previous_plan))]
    pub async fn build(
        &self,
        fear_greed: Option<FearGreedReading>,
        previous_plan: Option<String>,
    ) -> Result<MarketContext> {
        let quote = self.settings.quote_asset.to_uppercase();
        let assets: Vec<String> = self.settings.assets.iter().map(|a| a.to_uppercase()).collect();

        let balances = self
            .exchange
            .get_balances()
            .await
            .map_err(|e| unavailable("balances", e))?;
        let portfolio = build_portfolio(&quote, &assets, balances);

        let mut markets = BTreeMap::new();
        for asset in &assets {
            let data = self.fetch_market_data(asset, &quote).await?;
            debug!("{} @ {} ({}% 24h)", asset, data.current_price, data.price_change_24h_pct);
            markets.insert(asset.clone(), data);
        }

        let pairs: Vec<String> = assets.iter().map(|a| pair_symbol(a, &quote)).collect();
        let open_orders = self
            .exchange
            .get_open_orders(&pairs)
            .await
            .map_err(|e| unavailable("open orders", e))?;

        info!(
            "Market context built: {} assets, {} open orders, {} {} free",
            markets.len(),
            open_orders.len(),
            portfolio.free_quote(),
            quote
        );

        Ok(MarketContext {
            timestamp: Utc::now(),
            portfolio,
            markets,
            open_orders,
            fear_greed,
            previous_plan,
        })
    }

    async fn fetch_market_data(&self, asset: &str, quote: &str) -> Result<MarketData> {
        let pair = pair_symbol(asset, quote);

        let ticker = self
            .exchange
            .get_ticker(&pair)
            .await
            .map_err(|e| unavailable(&format!("{} ticker", pair), e))?;
        let klines = self
            .exchange
            .get_klines(&pair, &self.settings.kline_interval, self.settings.kline_limit)
            .await
            .map_err(|e| unavailable(&format!("{} klines", pair), e))?;
        let order_book = self
            .exchange
            .get_order_book(&pair, self.settings.order_book_depth)
            .await
            .map_err(|e| unavailable(&format!("{} order book", pair), e))?;

        let stats = WindowStats::from_klines(&klines)
            .ok_or_else(|| DcaError::DataUnavailable(format!("{} returned no klines", pair)))?;
        let closes: Vec<Decimal> = klines.iter().map(|k| k.close).collect();

        Ok(MarketData {
            asset: asset.to_string(),
            pair,
            current_price: ticker.last_price,
            price_change_24h_pct: ticker.price_change_pct,
            volume_24h: ticker.volume,
            price_change_96h_pct: stats.change_pct,
            high_96h: stats.high,
            low_96h: stats.low,
            avg_96h: stats.average,
            indicators: Indicators::from_closes(&closes),
            spread_pct: order_book.spread_pct(),
            order_book,
        })
    }
}

fn unavailable(what: &str, err: DcaError) -> DcaError {
    DcaError::DataUnavailable(format!("failed to fetch {}: {}", what, err))
}

/// Keep the quote and accumulation assets, zero-filling any that are missing
fn build_portfolio(quote: &str, assets: &[String], balances: Vec<Balance>) -> Portfolio {
    let mut wanted: Vec<Balance> = std::iter::once(quote.to_string())
        .chain(assets.iter().cloned())
        .map(|a| Balance::new(a, Decimal::ZERO, Decimal::ZERO))
        .collect();
    for balance in balances {
        if let Some(slot) = wanted.iter_mut().find(|w| w.asset == balance.asset) {
            *slot = balance;
        }
    }
    Portfolio::new(quote, wanted)
}
