//! Sequential order submission with a DryRun mode

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, instrument, warn};

use super::normalizer::{floor_quote_amount, floor_to_step, normalize, NormalizedOrder};
use crate::common::errors::{DcaError, Result};
use crate::common::traits::Exchange;
use crate::common::types::{pair_symbol, MarketOrderSize, OrderAck, Side, SymbolFilters};
use crate::config::types::ExecutionConfig;
use crate::oracle::types::{Action, ActionType};

/// Synthetic fee rate applied to DryRun fills
pub const DRY_RUN_FEE_RATE: Decimal = dec!(0.001);

/// Whether orders reach the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Normalize and validate, then record a synthetic fill
    #[default]
    DryRun,
    Live,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::DryRun => write!(f, "dry_run"),
            ExecutionMode::Live => write!(f, "live"),
        }
    }
}

/// Outcome of one submitted action, immutable once recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub asset: String,
    pub action_type: ActionType,
    pub order_id: Option<String>,
    pub executed_price: Option<Decimal>,
    pub executed_quantity: Option<Decimal>,
    /// Quote value filled, or committed for a resting limit order
    pub notional_filled: Option<Decimal>,
    pub fee: Option<Decimal>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn failed(asset: &str, action_type: ActionType, error: impl Into<String>) -> Self {
        Self {
            success: false,
            asset: asset.to_string(),
            action_type,
            order_id: None,
            executed_price: None,
            executed_quantity: None,
            notional_filled: None,
            fee: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    fn cancelled(asset: &str, order_id: &str) -> Self {
        Self {
            success: true,
            asset: asset.to_string(),
            action_type: ActionType::CancelOrder,
            order_id: Some(order_id.to_string()),
            executed_price: None,
            executed_quantity: None,
            notional_filled: None,
            fee: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    fn filled(
        asset: &str,
        action_type: ActionType,
        order_id: String,
        price: Option<Decimal>,
        quantity: Decimal,
        notional: Decimal,
        fee: Decimal,
    ) -> Self {
        Self {
            success: true,
            asset: asset.to_string(),
            action_type,
            order_id: Some(order_id),
            executed_price: price,
            executed_quantity: Some(quantity),
            notional_filled: Some(notional),
            fee: Some(fee),
            error: None,
            timestamp: Utc::now(),
        }
    }
}

/// Totals over a batch of results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub executed: usize,
    pub failed: usize,
    pub total_notional: Decimal,
    pub total_fees: Decimal,
}

impl ExecutionSummary {
    pub fn from_results(results: &[ExecutionResult]) -> Self {
        results.iter().fold(Self::default(), |mut acc, r| {
            if r.success {
                acc.executed += 1;
                acc.total_notional += r.notional_filled.unwrap_or_default();
                acc.total_fees += r.fee.unwrap_or_default();
            } else {
                acc.failed += 1;
            }
            acc
        })
    }
}

/// Submits approved actions one at a time
///
/// Cancels run first so the slots they free are available to placements.
/// A rejected or failed action is recorded and the rest continue; only an
/// exchange call timeout aborts the batch.
pub struct Executor {
    exchange: Arc<dyn Exchange>,
    config: ExecutionConfig,
    quote_asset: String,
    dry_run_seq: AtomicU64,
}

impl Executor {
    pub fn new(exchange: Arc<dyn Exchange>, config: ExecutionConfig, quote_asset: &str) -> Self {
        Self {
            exchange,
            config,
            quote_asset: quote_asset.to_uppercase(),
            dry_run_seq: AtomicU64::new(0),
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.config.mode
    }

    fn is_dry_run(&self) -> bool {
        self.config.mode == ExecutionMode::DryRun
    }

    fn next_dry_run_id(&self) -> String {
        format!("DRY_RUN-{}", self.dry_run_seq.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Run an exchange call under the per-call timeout
    ///
    /// The outer error is the timeout, which is fatal; the inner result is
    /// the exchange's own answer.
    async fn call<T, F>(&self, what: &str, fut: F) -> Result<Result<T>>
    where
        F: Future<Output = Result<T>>,
    {
        let limit = Duration::from_secs(self.config.call_timeout_seconds);
        timeout(limit, fut)
            .await
            .map_err(|_| DcaError::Timeout(format!("{} exceeded {}s", what, self.config.call_timeout_seconds)))
    }

    /// Execute an approved action list
    ///
    /// # Arguments
    /// * `actions` - Approved decision actions
    /// * `prices` - Current price per base asset, used to size market orders
    pub async fn execute(
        &self,
        actions: &[Action],
        prices: &BTreeMap<String, Decimal>,
    ) -> Result<Vec<ExecutionResult>> {
        let mut results = Vec::new();
        self.execute_into(actions, prices, &mut results).await?;
        Ok(results)
    }

    /// Execute into a caller-owned list
    ///
    /// Results recorded before a fatal timeout stay in `results`.
    #[instrument(skip(self, actions, prices, results), fields(mode = %self.config.mode))]
    pub async fn execute_into(
        &self,
        actions: &[Action],
        prices: &BTreeMap<String, Decimal>,
        results: &mut Vec<ExecutionResult>,
    ) -> Result<()> {
        for action in actions.iter().filter(|a| a.action_type == ActionType::CancelOrder) {
            results.push(self.cancel(action).await?);
        }

        let mut filters_cache: HashMap<String, SymbolFilters> = HashMap::new();
        for action in actions.iter().filter(|a| a.action_type.is_place()) {
            let result = self.place(action, prices, &mut filters_cache).await?;
            if !result.success {
                warn!(
                    "{} {} failed: {}",
                    result.action_type,
                    result.asset,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
            results.push(result);
        }

        let summary = ExecutionSummary::from_results(results);
        info!(
            "Execution finished: {} ok, {} failed, {} {} notional, {} fees",
            summary.executed, summary.failed, summary.total_notional, self.quote_asset, summary.total_fees
        );
        Ok(())
    }

    async fn cancel(&self, action: &Action) -> Result<ExecutionResult> {
        let asset = action.asset_key(&self.quote_asset).unwrap_or_default();
        let order_id = match action.order_id.as_deref() {
            Some(id) => id,
            None => return Ok(ExecutionResult::failed(&asset, ActionType::CancelOrder, "cancel has no order id")),
        };
        if self.is_dry_run() {
            return Ok(ExecutionResult::cancelled(&asset, order_id));
        }

        let pair = pair_symbol(&asset, &self.quote_asset);
        let outcome = self
            .call("cancel_order", self.exchange.cancel_order(&pair, order_id))
            .await?;
        Ok(match outcome {
            Ok(()) => ExecutionResult::cancelled(&asset, order_id),
            Err(e) => ExecutionResult::failed(&asset, ActionType::CancelOrder, e.to_string()),
        })
    }

    async fn place(
        &self,
        action: &Action,
        prices: &BTreeMap<String, Decimal>,
        filters_cache: &mut HashMap<String, SymbolFilters>,
    ) -> Result<ExecutionResult> {
        let action_type = action.action_type;
        let asset = match action.asset_key(&self.quote_asset) {
            Some(a) if !a.is_empty() => a,
            _ => return Ok(ExecutionResult::failed("", action_type, "placement has no asset")),
        };
        let notional = match action.notional_amount {
            Some(n) if n > Decimal::ZERO => n,
            _ => return Ok(ExecutionResult::failed(&asset, action_type, "placement has no notional amount")),
        };
        let side = match action_type.side() {
            Some(side) => side,
            None => return Ok(ExecutionResult::failed(&asset, action_type, "not a placement")),
        };
        let pair = pair_symbol(&asset, &self.quote_asset);

        let filters = match filters_cache.get(&pair) {
            Some(f) => f.clone(),
            None => match self
                .call("get_symbol_filters", self.exchange.get_symbol_filters(&pair))
                .await?
            {
                Ok(f) => {
                    filters_cache.insert(pair.clone(), f.clone());
                    f
                }
                Err(e) => {
                    return Ok(ExecutionResult::failed(
                        &asset,
                        action_type,
                        format!("symbol filters unavailable: {}", e),
                    ))
                }
            },
        };

        let max_notional = notional * (Decimal::ONE + self.config.budget_slack_pct / Decimal::ONE_HUNDRED);

        if action_type.is_limit() {
            let price = match action.price {
                Some(p) => p,
                None => return Ok(ExecutionResult::failed(&asset, action_type, "limit order has no price")),
            };
            let order = match normalize(price, notional / price, &filters, max_notional) {
                Ok(o) => o,
                Err(reason) => return Ok(reject(&asset, action_type, reason)),
            };
            return self.submit_limit(&asset, &pair, action_type, side, order).await;
        }

        let market_price = match prices.get(&asset) {
            Some(p) if *p > Decimal::ZERO => *p,
            _ => return Ok(ExecutionResult::failed(&asset, action_type, "no market price for asset")),
        };

        match side {
            Side::Buy => {
                let quote_amount = floor_quote_amount(notional, self.config.quote_precision);
                if quote_amount < filters.min_notional || quote_amount.is_zero() {
                    return Ok(ExecutionResult::failed(
                        &asset,
                        action_type,
                        format!(
                            "normalization rejected: quote amount {} below min_notional {}",
                            quote_amount, filters.min_notional
                        ),
                    ));
                }
                let size = MarketOrderSize::Quote(quote_amount);
                self.submit_market(&asset, &pair, action_type, side, size, market_price, &filters)
                    .await
            }
            Side::Sell => {
                let order = match normalize(market_price, notional / market_price, &filters, max_notional) {
                    Ok(o) => o,
                    Err(reason) => return Ok(reject(&asset, action_type, reason)),
                };
                let size = MarketOrderSize::Base(order.quantity);
                self.submit_market(&asset, &pair, action_type, side, size, market_price, &filters)
                    .await
            }
        }
    }

    async fn submit_limit(
        &self,
        asset: &str,
        pair: &str,
        action_type: ActionType,
        side: Side,
        order: NormalizedOrder,
    ) -> Result<ExecutionResult> {
        if self.is_dry_run() {
            let notional = order.notional();
            info!("[DRY RUN] {} {} {} @ {}", side, order.quantity, pair, order.price);
            return Ok(ExecutionResult::filled(
                asset,
                action_type,
                self.next_dry_run_id(),
                Some(order.price),
                order.quantity,
                notional,
                notional * DRY_RUN_FEE_RATE,
            ));
        }

        let outcome = self
            .call(
                "place_limit_order",
                self.exchange.place_limit_order(pair, side, order.price, order.quantity),
            )
            .await?;
        Ok(match outcome {
            Ok(ack) => {
                info!("Placed {} {} {} @ {} (order {})", side, order.quantity, pair, order.price, ack.order_id);
                ExecutionResult::filled(
                    asset,
                    action_type,
                    ack.order_id,
                    Some(order.price),
                    order.quantity,
                    order.notional(),
                    ack.fee,
                )
            }
            Err(e) => ExecutionResult::failed(asset, action_type, e.to_string()),
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn submit_market(
        &self,
        asset: &str,
        pair: &str,
        action_type: ActionType,
        side: Side,
        size: MarketOrderSize,
        market_price: Decimal,
        filters: &SymbolFilters,
    ) -> Result<ExecutionResult> {
        if self.is_dry_run() {
            let (quantity, notional) = match size {
                MarketOrderSize::Quote(amount) => (floor_to_step(amount / market_price, filters.step_size), amount),
                MarketOrderSize::Base(quantity) => (quantity, quantity * market_price),
            };
            info!("[DRY RUN] market {} {} {} (~{} {})", side, quantity, pair, notional, self.quote_asset);
            return Ok(ExecutionResult::filled(
                asset,
                action_type,
                self.next_dry_run_id(),
                Some(market_price),
                quantity,
                notional,
                notional * DRY_RUN_FEE_RATE,
            ));
        }

        let outcome = self
            .call("place_market_order", self.exchange.place_market_order(pair, side, size))
            .await?;
        Ok(match outcome {
            Ok(ack) => {
                info!("Market {} filled {} {} (order {})", side, ack.executed_qty, pair, ack.order_id);
                market_result(asset, action_type, ack)
            }
            Err(e) => ExecutionResult::failed(asset, action_type, e.to_string()),
        })
    }

    /// Cancel every open order of a pair
    ///
    /// In DryRun nothing reaches the exchange and each result is synthetic.
    #[instrument(skip(self), fields(mode = %self.config.mode))]
    pub async fn cancel_all(&self, pair: &str) -> Result<Vec<ExecutionResult>> {
        let pairs = [pair.to_string()];
        let open_orders = self
            .call("get_open_orders", self.exchange.get_open_orders(&pairs))
            .await??;

        let mut results = Vec::with_capacity(open_orders.len());
        for order in &open_orders {
            let action = Action::cancel(&order.asset, &order.order_id);
            results.push(self.cancel(&action).await?);
        }
        if self.is_dry_run() {
            info!("[DRY RUN] would cancel {} open orders on {}", open_orders.len(), pair);
        } else {
            let cancelled = results.iter().filter(|r| r.success).count();
            info!("Cancelled {} of {} open orders on {}", cancelled, open_orders.len(), pair);
        }
        Ok(results)
    }
}

fn reject(asset: &str, action_type: ActionType, reason: super::normalizer::RejectReason) -> ExecutionResult {
    warn!("{} {} dropped: {}", action_type, asset, reason);
    ExecutionResult::failed(asset, action_type, format!("normalization rejected: {}", reason))
}

fn market_result(asset: &str, action_type: ActionType, ack: OrderAck) -> ExecutionResult {
    let price = ack.average_price();
    ExecutionResult::filled(
        asset,
        action_type,
        ack.order_id,
        price,
        ack.executed_qty,
        ack.cumulative_quote_qty,
        ack.fee,
    )
}
