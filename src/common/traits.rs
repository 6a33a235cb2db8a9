//! Trait definitions for the external collaborators of a cycle

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::errors::Result;
use super::types::{Balance, Kline, MarketOrderSize, OpenOrder, OrderAck, OrderBook, Side, SymbolFilters, Ticker};
use crate::session::Session;

/// Trait for spot exchange clients (Binance, test doubles, ...)
///
/// All calls are request/response. Pairs are full exchange symbols such
/// as `BTCUSDT`.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Fetch every non-zero account balance
    async fn get_balances(&self) -> Result<Vec<Balance>>;

    /// Fetch the 24h rolling ticker for a pair
    async fn get_ticker(&self, pair: &str) -> Result<Ticker>;

    /// Fetch candlesticks, oldest first
    ///
    /// # Arguments
    /// * `pair` - Trading pair
    /// * `interval` - Exchange interval string, e.g. `1h`
    /// * `limit` - Number of candles
    async fn get_klines(&self, pair: &str, interval: &str, limit: u32) -> Result<Vec<Kline>>;

    /// Fetch the order book up to `depth` levels per side
    async fn get_order_book(&self, pair: &str, depth: u32) -> Result<OrderBook>;

    /// Fetch all open orders for the given pairs
    async fn get_open_orders(&self, pairs: &[String]) -> Result<Vec<OpenOrder>>;

    /// Fetch tick/step/notional trading rules for a pair
    async fn get_symbol_filters(&self, pair: &str) -> Result<SymbolFilters>;

    /// Place a GTC limit order with exchange-legal price and quantity
    async fn place_limit_order(
        &self,
        pair: &str,
        side: Side,
        price: Decimal,
        quantity: Decimal,
    ) -> Result<OrderAck>;

    /// Place a market order sized in quote or base units
    async fn place_market_order(&self, pair: &str, side: Side, size: MarketOrderSize) -> Result<OrderAck>;

    /// Cancel a single open order
    async fn cancel_order(&self, pair: &str, order_id: &str) -> Result<()>;
}

/// Append-only session history
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist one finalized session. There is no update or delete path.
    async fn append(&self, session: &Session) -> Result<()>;
}

/// Operator notification sink
///
/// Callers never propagate a failure from `notify`.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<()>;
}
