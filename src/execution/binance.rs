//! REST client for the Binance spot API

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::{Client, Method, Response};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument};

use super::auth::{signed_query, API_KEY_HEADER};
use super::messages::*;
use crate::common::errors::{DcaError, Result};
use crate::common::traits::Exchange;
use crate::common::types::{
    Balance, Kline, MarketOrderSize, OpenOrder, OrderAck, OrderBook, PriceLevel, Side, SymbolFilters, Ticker,
};
use crate::config::types::{ApiCredentials, ExchangeConfig};
use crate::oracle::types::asset_key;

/// REST client for Binance spot (production or testnet)
#[derive(Debug, Clone)]
pub struct BinanceClient {
    /// HTTP client
    client: Client,
    /// Base URL, e.g. https://testnet.binance.vision
    base_url: String,
    /// Credentials for signed endpoints
    credentials: Option<ApiCredentials>,
    recv_window_ms: u64,
    /// Quote currency used to derive base assets from pair symbols
    quote_asset: String,
}

impl BinanceClient {
    /// Create a new client (unauthenticated)
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    /// Create a new client with custom timeout
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DcaError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials: None,
            recv_window_ms: 5000,
            quote_asset: "USDT".to_string(),
        })
    }

    /// Build a client from configuration
    pub fn from_config(config: &ExchangeConfig, timeout: Duration) -> Result<Self> {
        let mut client = Self::with_timeout(&config.rest_url, timeout)?;
        client.recv_window_ms = config.recv_window_ms;
        if let Some(creds) = config.credentials() {
            client = client.with_credentials(creds);
        }
        Ok(client)
    }

    /// Set API credentials for signed requests
    pub fn with_credentials(mut self, credentials: ApiCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_quote_asset(mut self, quote_asset: &str) -> Self {
        self.quote_asset = quote_asset.to_uppercase();
        self
    }

    // ========================================================================
    // Transport
    // ========================================================================

    async fn get_public<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);
        let response = self.client.get(&url).query(params).send().await?;
        parse_response(response).await
    }

    async fn send_signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or_else(|| DcaError::Authentication("exchange API key and secret are not configured".into()))?;

        let query = signed_query(
            &creds.api_secret,
            params,
            Utc::now().timestamp_millis(),
            self.recv_window_ms,
        )?;
        let url = format!("{}{}?{}", self.base_url, path, query);
        debug!("{} {} (signed)", method, path);

        let response = self
            .client
            .request(method, &url)
            .header(API_KEY_HEADER, &creds.api_key)
            .send()
            .await?;
        parse_response(response).await
    }

    fn base_asset(&self, pair: &str) -> String {
        asset_key(pair, &self.quote_asset)
    }
}

/// Map non-2xx statuses to typed errors, then deserialize the body
async fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    if status.as_u16() == 429 || status.as_u16() == 418 {
        let retry_after_seconds = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let body = response.text().await.unwrap_or_default();
        return Err(DcaError::RateLimit {
            message: body,
            retry_after_seconds,
        });
    }

    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ApiErrorResponse>(&body) {
        Ok(err) if status.as_u16() == 401 => Err(DcaError::Authentication(format!("{}: {}", err.code, err.msg))),
        Ok(err) => Err(DcaError::Exchange {
            code: err.code,
            message: err.msg,
        }),
        Err(_) => Err(DcaError::InvalidResponse(format!(
            "Server returned status {}: {}",
            status, body
        ))),
    }
}

fn parse_decimal(field: &str, raw: &str) -> Result<Decimal> {
    raw.parse()
        .map_err(|e| DcaError::InvalidResponse(format!("Invalid {} '{}': {}", field, raw, e)))
}

fn parse_side(raw: &str) -> Result<Side> {
    match raw {
        "BUY" => Ok(Side::Buy),
        "SELL" => Ok(Side::Sell),
        other => Err(DcaError::InvalidResponse(format!("Unknown order side: {}", other))),
    }
}

fn kline_decimal(row: &[serde_json::Value], index: usize, field: &str) -> Result<Decimal> {
    row.get(index)
        .and_then(|v| v.as_str())
        .ok_or_else(|| DcaError::InvalidResponse(format!("Kline row missing {}", field)))
        .and_then(|raw| parse_decimal(field, raw))
}

fn parse_kline(row: &[serde_json::Value]) -> Result<Kline> {
    let open_ms = row
        .first()
        .and_then(|v| v.as_i64())
        .ok_or_else(|| DcaError::InvalidResponse("Kline row missing open time".into()))?;
    let open_time = Utc
        .timestamp_millis_opt(open_ms)
        .single()
        .ok_or_else(|| DcaError::InvalidResponse(format!("Invalid kline open time {}", open_ms)))?;

    Ok(Kline {
        open_time,
        open: kline_decimal(row, 1, "open")?,
        high: kline_decimal(row, 2, "high")?,
        low: kline_decimal(row, 3, "low")?,
        close: kline_decimal(row, 4, "close")?,
        volume: kline_decimal(row, 5, "volume")?,
    })
}

fn parse_levels(levels: Vec<(String, String)>, side: &str) -> Result<Vec<PriceLevel>> {
    levels
        .into_iter()
        .map(|(price, size)| {
            Ok(PriceLevel::new(
                parse_decimal(&format!("{} price", side), &price)?,
                parse_decimal(&format!("{} size", side), &size)?,
            ))
        })
        .collect()
}

fn convert_filters(info: SymbolInfo) -> Result<SymbolFilters> {
    let mut filters = SymbolFilters {
        tick_size: Decimal::ZERO,
        min_price: Decimal::ZERO,
        max_price: Decimal::ZERO,
        step_size: Decimal::ZERO,
        min_qty: Decimal::ZERO,
        max_qty: Decimal::ZERO,
        min_notional: Decimal::ZERO,
    };
    for entry in info.filters {
        match entry {
            SymbolFilterEntry::Price {
                min_price,
                max_price,
                tick_size,
            } => {
                filters.min_price = parse_decimal("minPrice", &min_price)?;
                filters.max_price = parse_decimal("maxPrice", &max_price)?;
                filters.tick_size = parse_decimal("tickSize", &tick_size)?;
            }
            SymbolFilterEntry::LotSize {
                min_qty,
                max_qty,
                step_size,
            } => {
                filters.min_qty = parse_decimal("minQty", &min_qty)?;
                filters.max_qty = parse_decimal("maxQty", &max_qty)?;
                filters.step_size = parse_decimal("stepSize", &step_size)?;
            }
            SymbolFilterEntry::Notional { min_notional } | SymbolFilterEntry::MinNotional { min_notional } => {
                filters.min_notional = parse_decimal("minNotional", &min_notional)?;
            }
            SymbolFilterEntry::Other => {}
        }
    }
    if filters.tick_size.is_zero() || filters.step_size.is_zero() {
        return Err(DcaError::InvalidResponse(format!(
            "{} is missing PRICE_FILTER or LOT_SIZE",
            info.symbol
        )));
    }
    Ok(filters)
}

fn convert_order_ack(response: NewOrderResponse) -> Result<OrderAck> {
    let executed_qty = match response.executed_qty.as_deref() {
        Some(raw) => parse_decimal("executedQty", raw)?,
        None => Decimal::ZERO,
    };
    let cumulative_quote_qty = match response.cummulative_quote_qty.as_deref() {
        Some(raw) => parse_decimal("cummulativeQuoteQty", raw)?,
        None => Decimal::ZERO,
    };
    let mut fee = Decimal::ZERO;
    for fill in &response.fills {
        fee += parse_decimal("commission", &fill.commission)?;
    }

    Ok(OrderAck {
        order_id: response.order_id.to_string(),
        pair: response.symbol,
        status: response.status,
        executed_qty,
        cumulative_quote_qty,
        fee,
    })
}

fn decimal_param(value: Decimal) -> String {
    value.normalize().to_string()
}

#[async_trait]
impl Exchange for BinanceClient {
    #[instrument(skip(self))]
    async fn get_balances(&self) -> Result<Vec<Balance>> {
        let account: AccountResponse = self.send_signed(Method::GET, "/api/v3/account", &[]).await?;
        let mut balances = Vec::new();
        for entry in account.balances {
            let balance = Balance::new(
                entry.asset,
                parse_decimal("free", &entry.free)?,
                parse_decimal("locked", &entry.locked)?,
            );
            if !balance.total().is_zero() {
                balances.push(balance);
            }
        }
        Ok(balances)
    }

    #[instrument(skip(self))]
    async fn get_ticker(&self, pair: &str) -> Result<Ticker> {
        let ticker: Ticker24hResponse = self
            .get_public("/api/v3/ticker/24hr", &[("symbol", pair.to_string())])
            .await?;
        Ok(Ticker {
            pair: ticker.symbol,
            last_price: parse_decimal("lastPrice", &ticker.last_price)?,
            price_change_pct: parse_decimal("priceChangePercent", &ticker.price_change_percent)?,
            high: parse_decimal("highPrice", &ticker.high_price)?,
            low: parse_decimal("lowPrice", &ticker.low_price)?,
            volume: parse_decimal("volume", &ticker.volume)?,
        })
    }

    #[instrument(skip(self))]
    async fn get_klines(&self, pair: &str, interval: &str, limit: u32) -> Result<Vec<Kline>> {
        let rows: Vec<Vec<serde_json::Value>> = self
            .get_public(
                "/api/v3/klines",
                &[
                    ("symbol", pair.to_string()),
                    ("interval", interval.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        rows.iter().map(|row| parse_kline(row)).collect()
    }

    #[instrument(skip(self))]
    async fn get_order_book(&self, pair: &str, depth: u32) -> Result<OrderBook> {
        let depth_response: DepthResponse = self
            .get_public(
                "/api/v3/depth",
                &[("symbol", pair.to_string()), ("limit", depth.to_string())],
            )
            .await?;
        Ok(OrderBook {
            pair: pair.to_string(),
            bids: parse_levels(depth_response.bids, "bid")?,
            asks: parse_levels(depth_response.asks, "ask")?,
            timestamp: Utc::now(),
        })
    }

    #[instrument(skip(self))]
    async fn get_open_orders(&self, pairs: &[String]) -> Result<Vec<OpenOrder>> {
        let mut orders = Vec::new();
        for pair in pairs {
            let entries: Vec<OpenOrderResponse> = self
                .send_signed(Method::GET, "/api/v3/openOrders", &[("symbol", pair.clone())])
                .await?;
            for entry in entries {
                orders.push(OpenOrder {
                    order_id: entry.order_id.to_string(),
                    asset: self.base_asset(&entry.symbol),
                    side: parse_side(&entry.side)?,
                    price: parse_decimal("price", &entry.price)?,
                    quantity: parse_decimal("origQty", &entry.orig_qty)?,
                    time_placed: Utc.timestamp_millis_opt(entry.time).single().unwrap_or_else(Utc::now),
                });
            }
        }
        debug!("{} open orders across {} pairs", orders.len(), pairs.len());
        Ok(orders)
    }

    #[instrument(skip(self))]
    async fn get_symbol_filters(&self, pair: &str) -> Result<SymbolFilters> {
        let info: ExchangeInfoResponse = self
            .get_public("/api/v3/exchangeInfo", &[("symbol", pair.to_string())])
            .await?;
        let symbol = info
            .symbols
            .into_iter()
            .find(|s| s.symbol == pair)
            .ok_or_else(|| DcaError::InvalidResponse(format!("No exchange info for {}", pair)))?;
        convert_filters(symbol)
    }

    #[instrument(skip(self))]
    async fn place_limit_order(&self, pair: &str, side: Side, price: Decimal, quantity: Decimal) -> Result<OrderAck> {
        let params = [
            ("symbol", pair.to_string()),
            ("side", side.to_string()),
            ("type", "LIMIT".to_string()),
            ("timeInForce", "GTC".to_string()),
            ("quantity", decimal_param(quantity)),
            ("price", decimal_param(price)),
            ("newOrderRespType", "FULL".to_string()),
        ];
        let response: NewOrderResponse = self.send_signed(Method::POST, "/api/v3/order", &params).await?;
        convert_order_ack(response)
    }

    #[instrument(skip(self))]
    async fn place_market_order(&self, pair: &str, side: Side, size: MarketOrderSize) -> Result<OrderAck> {
        let size_param = match size {
            MarketOrderSize::Quote(amount) => ("quoteOrderQty", decimal_param(amount)),
            MarketOrderSize::Base(quantity) => ("quantity", decimal_param(quantity)),
        };
        let params = [
            ("symbol", pair.to_string()),
            ("side", side.to_string()),
            ("type", "MARKET".to_string()),
            size_param,
            ("newOrderRespType", "FULL".to_string()),
        ];
        let response: NewOrderResponse = self.send_signed(Method::POST, "/api/v3/order", &params).await?;
        convert_order_ack(response)
    }

    #[instrument(skip(self))]
    async fn cancel_order(&self, pair: &str, order_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .send_signed(
                Method::DELETE,
                "/api/v3/order",
                &[("symbol", pair.to_string()), ("orderId", order_id.to_string())],
            )
            .await?;
        Ok(())
    }
}
