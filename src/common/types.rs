//! Market and account types shared across the pipeline and exchange adapters

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// A single price level in an order book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PriceLevel {
    pub price: Decimal,
    pub size: Decimal,
}

impl PriceLevel {
    /// Create a new price level
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

/// Order book snapshot for a trading pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OrderBook {
    /// Trading pair, e.g. BTCUSDT
    pub pair: String,
    /// Bid (buy) orders sorted by price descending
    pub bids: Vec<PriceLevel>,
    /// Ask (sell) orders sorted by price ascending
    pub asks: Vec<PriceLevel>,
    /// Timestamp of this snapshot
    pub timestamp: DateTime<Utc>,
}

impl OrderBook {
    /// Get the best bid price (highest buy order)
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    /// Get the best ask price (lowest sell order)
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    /// Calculate the midpoint price
    pub fn midpoint(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / Decimal::from(2)),
            _ => None,
        }
    }

    /// Spread as a percentage of the midpoint
    pub fn spread_pct(&self) -> Option<Decimal> {
        let (bid, ask) = (self.best_bid()?, self.best_ask()?);
        let mid = self.midpoint()?;
        if mid.is_zero() {
            return None;
        }
        Some((ask.price - bid.price) / mid * Decimal::ONE_HUNDRED)
    }
}

/// Balance of one asset in the account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Balance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

impl Balance {
    pub fn new(asset: impl Into<String>, free: Decimal, locked: Decimal) -> Self {
        Self {
            asset: asset.into(),
            free,
            locked,
        }
    }

    pub fn total(&self) -> Decimal {
        self.free + self.locked
    }
}

/// Account balances keyed by asset symbol
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Portfolio {
    /// Quote currency the portfolio is valued in (USDT, EUR, ...)
    pub quote_asset: String,
    pub balances: BTreeMap<String, Balance>,
}

impl Portfolio {
    pub fn new(quote_asset: impl Into<String>, balances: Vec<Balance>) -> Self {
        Self {
            quote_asset: quote_asset.into(),
            balances: balances.into_iter().map(|b| (b.asset.clone(), b)).collect(),
        }
    }

    pub fn balance(&self, asset: &str) -> Option<&Balance> {
        self.balances.get(asset)
    }

    /// Free (unlocked) amount of an asset, zero when absent
    pub fn free(&self, asset: &str) -> Decimal {
        self.balance(asset).map(|b| b.free).unwrap_or_default()
    }

    /// Free quote currency available for new orders
    pub fn free_quote(&self) -> Decimal {
        self.free(&self.quote_asset)
    }

    /// Total portfolio value in quote currency
    ///
    /// Assets without a price in `prices` are ignored.
    pub fn total_value(&self, prices: &BTreeMap<String, Decimal>) -> Decimal {
        self.balances
            .values()
            .map(|b| {
                if b.asset == self.quote_asset {
                    b.total()
                } else {
                    prices
                        .get(&b.asset)
                        .map(|p| b.total() * p)
                        .unwrap_or_default()
                }
            })
            .sum()
    }
}

/// 24h rolling ticker for a pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub pair: String,
    pub last_price: Decimal,
    pub price_change_pct: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub volume: Decimal,
}

/// One candlestick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// An order resting on the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OpenOrder {
    pub order_id: String,
    /// Base asset symbol, e.g. BTC
    pub asset: String,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub time_placed: DateTime<Utc>,
}

impl OpenOrder {
    /// Quote-currency value of the order
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }
}

/// Exchange trading rules for one pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolFilters {
    pub tick_size: Decimal,
    /// Zero means unbounded
    pub min_price: Decimal,
    /// Zero means unbounded
    pub max_price: Decimal,
    pub step_size: Decimal,
    pub min_qty: Decimal,
    /// Zero means unbounded
    pub max_qty: Decimal,
    pub min_notional: Decimal,
}

/// Exchange acknowledgement of a submitted order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    pub pair: String,
    pub status: String,
    /// Base quantity filled so far
    pub executed_qty: Decimal,
    /// Quote amount filled so far
    pub cumulative_quote_qty: Decimal,
    /// Commission charged, in whatever asset the exchange reports
    pub fee: Decimal,
}

impl OrderAck {
    /// Average fill price, when anything filled
    pub fn average_price(&self) -> Option<Decimal> {
        if self.executed_qty.is_zero() {
            None
        } else {
            Some(self.cumulative_quote_qty / self.executed_qty)
        }
    }
}

/// Size argument of a market order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketOrderSize {
    /// Spend this much quote currency
    Quote(Decimal),
    /// Trade this much base asset
    Base(Decimal),
}

/// Join a base asset and quote asset into an exchange pair symbol
pub fn pair_symbol(asset: &str, quote_asset: &str) -> String {
    format!("{}{}", asset.to_uppercase(), quote_asset.to_uppercase())
}
