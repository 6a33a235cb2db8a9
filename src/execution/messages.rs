//! Binance spot REST payloads
//!
//! Numeric fields arrive as strings and are parsed into `Decimal` by the
//! client, never through floats.

use serde::{Deserialize, Serialize};

// ============================================================================
// Errors
// ============================================================================

/// Error body returned with non-2xx statuses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub code: i64,
    pub msg: String,
}

// ============================================================================
// Account
// ============================================================================

/// Response from GET /api/v3/account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResponse {
    pub balances: Vec<BalanceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub asset: String,
    pub free: String,
    pub locked: String,
}

// ============================================================================
// Market data
// ============================================================================

/// Response from GET /api/v3/ticker/24hr
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker24hResponse {
    pub symbol: String,
    pub last_price: String,
    pub price_change_percent: String,
    pub high_price: String,
    pub low_price: String,
    pub volume: String,
}

/// Response from GET /api/v3/depth
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthResponse {
    #[serde(default)]
    pub last_update_id: Option<u64>,
    /// `[price, quantity]` pairs
    pub bids: Vec<(String, String)>,
    pub asks: Vec<(String, String)>,
}

/// Response from GET /api/v3/exchangeInfo
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeInfoResponse {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub symbol: String,
    #[serde(default)]
    pub base_asset: Option<String>,
    #[serde(default)]
    pub quote_asset: Option<String>,
    pub filters: Vec<SymbolFilterEntry>,
}

/// Trading rule entry; only the filters the normalizer uses are modelled
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "filterType")]
pub enum SymbolFilterEntry {
    #[serde(rename = "PRICE_FILTER", rename_all = "camelCase")]
    Price {
        min_price: String,
        max_price: String,
        tick_size: String,
    },
    #[serde(rename = "LOT_SIZE", rename_all = "camelCase")]
    LotSize {
        min_qty: String,
        max_qty: String,
        step_size: String,
    },
    #[serde(rename = "NOTIONAL", rename_all = "camelCase")]
    Notional { min_notional: String },
    #[serde(rename = "MIN_NOTIONAL", rename_all = "camelCase")]
    MinNotional { min_notional: String },
    #[serde(other)]
    Other,
}

// ============================================================================
// Orders
// ============================================================================

/// Entry of GET /api/v3/openOrders
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOrderResponse {
    pub symbol: String,
    pub order_id: u64,
    pub price: String,
    pub orig_qty: String,
    #[serde(default)]
    pub executed_qty: Option<String>,
    pub side: String,
    /// Milliseconds since epoch
    pub time: i64,
}

/// Response from POST /api/v3/order with `newOrderRespType=FULL`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderResponse {
    pub symbol: String,
    pub order_id: u64,
    pub status: String,
    #[serde(default)]
    pub executed_qty: Option<String>,
    /// Binance's spelling
    #[serde(default)]
    pub cummulative_quote_qty: Option<String>,
    #[serde(default)]
    pub fills: Vec<FillEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillEntry {
    pub price: String,
    pub qty: String,
    pub commission: String,
    pub commission_asset: String,
}
