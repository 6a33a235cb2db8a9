//! Hard-limit validation of a proposed action set
//!
//! The guardrail is a pure function of the proposed actions, the open
//! orders, current prices and the portfolio. It never sees the selector's
//! reasoning, and its tripwire cannot be overridden.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::common::types::{OpenOrder, Portfolio, Side};
use crate::config::types::RiskLimits;
use crate::market::MarketContext;
use crate::oracle::types::{Action, ActionType};

/// The five hard limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardLimit {
    OrderCount,
    Exposure,
    PriceBand,
    MinimumOrder,
    DuplicatePrice,
}

impl fmt::Display for HardLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HardLimit::OrderCount => "order_count",
            HardLimit::Exposure => "exposure",
            HardLimit::PriceBand => "price_band",
            HardLimit::MinimumOrder => "minimum_order",
            HardLimit::DuplicatePrice => "duplicate_price",
        };
        write!(f, "{}", name)
    }
}

/// One broken hard limit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    PerAssetOrderCap {
        asset: String,
        count: usize,
        cap: usize,
    },
    TotalOrderCap {
        count: usize,
        cap: usize,
    },
    Exposure {
        pending_notional: Decimal,
        portfolio_value: Decimal,
        max_pct: Decimal,
    },
    PriceDeviation {
        asset: String,
        price: Decimal,
        market: Decimal,
        deviation_pct: Decimal,
        max_pct: Decimal,
    },
    BuyAboveMarket {
        asset: String,
        price: Decimal,
        market: Decimal,
    },
    SellBelowMarket {
        asset: String,
        price: Decimal,
        market: Decimal,
    },
    /// A limit order whose price cannot be checked against the market
    UncheckablePrice {
        asset: String,
        reason: String,
    },
    BelowMinimumOrder {
        asset: String,
        action_type: ActionType,
        notional: Option<Decimal>,
        min: Decimal,
    },
    DuplicateLimitPrice {
        asset: String,
        price: Decimal,
    },
}

impl Violation {
    pub fn limit(&self) -> HardLimit {
        match self {
            Violation::PerAssetOrderCap { .. } | Violation::TotalOrderCap { .. } => HardLimit::OrderCount,
            Violation::Exposure { .. } => HardLimit::Exposure,
            Violation::PriceDeviation { .. }
            | Violation::BuyAboveMarket { .. }
            | Violation::SellBelowMarket { .. }
            | Violation::UncheckablePrice { .. } => HardLimit::PriceBand,
            Violation::BelowMinimumOrder { .. } => HardLimit::MinimumOrder,
            Violation::DuplicateLimitPrice { .. } => HardLimit::DuplicatePrice,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::PerAssetOrderCap { asset, count, cap } => write!(
                f,
                "per-asset order cap exceeded for {}: {} open orders > cap {}",
                asset, count, cap
            ),
            Violation::TotalOrderCap { count, cap } => {
                write!(f, "total order cap exceeded: {} open orders > cap {}", count, cap)
            }
            Violation::Exposure {
                pending_notional,
                portfolio_value,
                max_pct,
            } => write!(
                f,
                "exposure exceeded: pending {} of portfolio value {} is above {}%",
                pending_notional.round_dp(2),
                portfolio_value.round_dp(2),
                max_pct
            ),
            Violation::PriceDeviation {
                asset,
                price,
                market,
                deviation_pct,
                max_pct,
            } => write!(
                f,
                "{} limit price {} deviates {}% from market {} (max {}%)",
                asset,
                price,
                deviation_pct.round_dp(2),
                market,
                max_pct
            ),
            Violation::BuyAboveMarket { asset, price, market } => write!(
                f,
                "{} buy limit {} is above market {} and would fill as a market order",
                asset, price, market
            ),
            Violation::SellBelowMarket { asset, price, market } => write!(
                f,
                "{} sell limit {} is below market {} and would fill as a market order",
                asset, price, market
            ),
            Violation::UncheckablePrice { asset, reason } => {
                write!(f, "{} limit price cannot be checked: {}", asset, reason)
            }
            Violation::BelowMinimumOrder {
                asset,
                action_type,
                notional,
                min,
            } => match notional {
                Some(n) => write!(f, "{} {} notional {} is below minimum {}", action_type, asset, n, min),
                None => write!(f, "{} {} has no notional (minimum {})", action_type, asset, min),
            },
            Violation::DuplicateLimitPrice { asset, price } => {
                write!(f, "duplicate {} limit order at price {}", asset, price)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GuardrailStatus {
    Pass,
    Tripwire,
}

impl fmt::Display for GuardrailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardrailStatus::Pass => write!(f, "PASS"),
            GuardrailStatus::Tripwire => write!(f, "TRIPWIRE"),
        }
    }
}

/// Terminal result of a guardrail evaluation
///
/// `status` is `Tripwire` exactly when `violations` is non-empty. Warnings
/// never affect the status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailOutcome {
    status: GuardrailStatus,
    violations: Vec<Violation>,
    warnings: Vec<String>,
}

impl GuardrailOutcome {
    pub fn new(violations: Vec<Violation>, warnings: Vec<String>) -> Self {
        let status = if violations.is_empty() {
            GuardrailStatus::Pass
        } else {
            GuardrailStatus::Tripwire
        };
        Self {
            status,
            violations,
            warnings,
        }
    }

    pub fn status(&self) -> GuardrailStatus {
        self.status
    }

    pub fn is_tripwire(&self) -> bool {
        self.status == GuardrailStatus::Tripwire
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Limits broken by this action set, deduplicated
    pub fn broken_limits(&self) -> Vec<HardLimit> {
        let mut limits: Vec<HardLimit> = Vec::new();
        for v in &self.violations {
            if !limits.contains(&v.limit()) {
                limits.push(v.limit());
            }
        }
        limits
    }

    /// Human-readable validation report
    pub fn report(&self) -> String {
        let mut out = format!("Guardrail: {}\n", self.status);
        if self.violations.is_empty() {
            out.push_str("All hard limits respected\n");
        } else {
            out.push_str(&format!("Violations ({}):\n", self.violations.len()));
            for (i, v) in self.violations.iter().enumerate() {
                out.push_str(&format!("  {}. [{}] {}\n", i + 1, v.limit(), v));
            }
        }
        if !self.warnings.is_empty() {
            out.push_str("Warnings:\n");
            for w in &self.warnings {
                out.push_str(&format!("  - {}\n", w));
            }
        }
        out
    }
}

/// Hard-limit validator
#[derive(Debug, Clone)]
pub struct Guardrail {
    limits: RiskLimits,
}

impl Guardrail {
    pub fn new(limits: RiskLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Evaluate actions against the snapshot's orders, prices and portfolio
    pub fn evaluate_in(&self, actions: &[Action], context: &MarketContext) -> GuardrailOutcome {
        self.evaluate(actions, &context.open_orders, &context.prices(), &context.portfolio)
    }

    /// Evaluate a proposed action set
    ///
    /// # Arguments
    /// * `actions` - Proposed actions
    /// * `open_orders` - Orders already resting on the exchange
    /// * `prices` - Current market price per base asset
    /// * `portfolio` - Balances, valued in the portfolio's quote currency
    pub fn evaluate(
        &self,
        actions: &[Action],
        open_orders: &[OpenOrder],
        prices: &BTreeMap<String, Decimal>,
        portfolio: &Portfolio,
    ) -> GuardrailOutcome {
        let quote = portfolio.quote_asset.as_str();
        let mut violations = Vec::new();
        let mut warnings = Vec::new();

        // Cancellations free their slot and notional
        let open_ids: HashSet<&str> = open_orders.iter().map(|o| o.order_id.as_str()).collect();
        let mut cancelled: HashSet<&str> = HashSet::new();
        for action in actions.iter().filter(|a| a.action_type == ActionType::CancelOrder) {
            if let Some(id) = action.order_id.as_deref() {
                if open_ids.contains(id) {
                    cancelled.insert(id);
                } else {
                    warnings.push(format!("cancel references unknown order {}", id));
                }
            }
        }
        let surviving: Vec<&OpenOrder> = open_orders
            .iter()
            .filter(|o| !cancelled.contains(o.order_id.as_str()))
            .collect();

        let placements: Vec<(String, &Action)> = actions
            .iter()
            .filter(|a| a.action_type.is_place())
            .map(|a| (a.asset_key(quote).unwrap_or_default(), a))
            .collect();

        self.check_order_counts(&surviving, &placements, &mut violations);
        self.check_exposure(&surviving, &placements, prices, portfolio, &mut violations);
        self.check_price_band(&placements, prices, &mut violations);
        self.check_minimum_order(&placements, &mut violations);
        check_duplicate_prices(&surviving, &placements, &mut violations);

        let new_buys = checked_total(
            placements
                .iter()
                .filter(|(_, a)| a.action_type.side() == Some(Side::Buy))
                .map(|(_, a)| a.placed_notional()),
        );
        match new_buys {
            Some(total) if total <= portfolio.free_quote() => {}
            Some(total) => warnings.push(format!(
                "new buys total {} but only {} {} is free",
                total,
                portfolio.free_quote(),
                quote
            )),
            None => warnings.push(format!(
                "new buys overflow but only {} {} is free",
                portfolio.free_quote(),
                quote
            )),
        }

        GuardrailOutcome::new(violations, warnings)
    }

    fn check_order_counts(
        &self,
        surviving: &[&OpenOrder],
        placements: &[(String, &Action)],
        violations: &mut Vec<Violation>,
    ) {
        // Market orders fill immediately and never rest on the book
        let mut per_asset: BTreeMap<&str, usize> = BTreeMap::new();
        for order in surviving {
            *per_asset.entry(order.asset.as_str()).or_default() += 1;
        }
        let mut new_limits = 0usize;
        for (asset, _) in placements.iter().filter(|(_, a)| a.action_type.is_limit()) {
            *per_asset.entry(asset.as_str()).or_default() += 1;
            new_limits += 1;
        }

        for (asset, count) in &per_asset {
            if *count > self.limits.max_orders_per_asset {
                violations.push(Violation::PerAssetOrderCap {
                    asset: asset.to_string(),
                    count: *count,
                    cap: self.limits.max_orders_per_asset,
                });
            }
        }

        let total = surviving.len() + new_limits;
        if total > self.limits.max_total_orders {
            violations.push(Violation::TotalOrderCap {
                count: total,
                cap: self.limits.max_total_orders,
            });
        }
    }

    fn check_exposure(
        &self,
        surviving: &[&OpenOrder],
        placements: &[(String, &Action)],
        prices: &BTreeMap<String, Decimal>,
        portfolio: &Portfolio,
        violations: &mut Vec<Violation>,
    ) {
        // Market placements count too: they spend quote balance this cycle
        let pending = checked_total(
            surviving
                .iter()
                .map(|o| o.notional())
                .chain(placements.iter().map(|(_, a)| a.placed_notional())),
        );
        if pending == Some(Decimal::ZERO) {
            return;
        }

        let value = portfolio.total_value(prices);
        let exposure_pct = pending
            .filter(|_| value > Decimal::ZERO)
            .and_then(|p| p.checked_div(value))
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED));
        let over = exposure_pct.map_or(true, |pct| pct > self.limits.max_exposure_pct);
        if over {
            violations.push(Violation::Exposure {
                pending_notional: pending.unwrap_or(Decimal::MAX),
                portfolio_value: value,
                max_pct: self.limits.max_exposure_pct,
            });
        }
    }

    fn check_price_band(
        &self,
        placements: &[(String, &Action)],
        prices: &BTreeMap<String, Decimal>,
        violations: &mut Vec<Violation>,
    ) {
        for (asset, action) in placements.iter().filter(|(_, a)| a.action_type.is_limit()) {
            let price = match action.price {
                Some(p) if p > Decimal::ZERO => p,
                _ => {
                    violations.push(Violation::UncheckablePrice {
                        asset: asset.clone(),
                        reason: "limit order has no positive price".into(),
                    });
                    continue;
                }
            };
            let market = match prices.get(asset) {
                Some(m) if *m > Decimal::ZERO => *m,
                _ => {
                    violations.push(Violation::UncheckablePrice {
                        asset: asset.clone(),
                        reason: "no market price for asset".into(),
                    });
                    continue;
                }
            };

            let deviation_pct = (price - market)
                .abs()
                .checked_div(market)
                .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
                .unwrap_or(Decimal::MAX);
            if deviation_pct > self.limits.price_deviation_pct {
                violations.push(Violation::PriceDeviation {
                    asset: asset.clone(),
                    price,
                    market,
                    deviation_pct,
                    max_pct: self.limits.price_deviation_pct,
                });
            }

            match action.action_type {
                ActionType::PlaceLimitBuy if price > market => {
                    violations.push(Violation::BuyAboveMarket {
                        asset: asset.clone(),
                        price,
                        market,
                    });
                }
                ActionType::PlaceLimitSell if price < market => {
                    violations.push(Violation::SellBelowMarket {
                        asset: asset.clone(),
                        price,
                        market,
                    });
                }
                _ => {}
            }
        }
    }

    fn check_minimum_order(&self, placements: &[(String, &Action)], violations: &mut Vec<Violation>) {
        for (asset, action) in placements {
            let below = action
                .notional_amount
                .map_or(true, |n| n < self.limits.min_order_value);
            if below {
                violations.push(Violation::BelowMinimumOrder {
                    asset: asset.clone(),
                    action_type: action.action_type,
                    notional: action.notional_amount,
                    min: self.limits.min_order_value,
                });
            }
        }
    }
}

/// Sum that reports overflow instead of panicking
fn checked_total(mut values: impl Iterator<Item = Decimal>) -> Option<Decimal> {
    values.try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
}

fn check_duplicate_prices(
    surviving: &[&OpenOrder],
    placements: &[(String, &Action)],
    violations: &mut Vec<Violation>,
) {
    let mut seen: HashSet<(String, Decimal)> = surviving
        .iter()
        .map(|o| (o.asset.clone(), o.price.normalize()))
        .collect();

    for (asset, action) in placements.iter().filter(|(_, a)| a.action_type.is_limit()) {
        if let Some(price) = action.price {
            if !seen.insert((asset.clone(), price.normalize())) {
                violations.push(Violation::DuplicateLimitPrice {
                    asset: asset.clone(),
                    price,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::Balance;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn portfolio() -> Portfolio {
        Portfolio::new(
            "USDT",
            vec![
                Balance::new("USDT", dec!(1000), dec!(0)),
                Balance::new("BTC", dec!(0.01), dec!(0)),
            ],
        )
    }

    fn prices() -> BTreeMap<String, Decimal> {
        [("BTC".to_string(), dec!(90000)), ("ADA".to_string(), dec!(0.5))]
            .into_iter()
            .collect()
    }

    fn open_btc(id: &str, price: Decimal) -> OpenOrder {
        OpenOrder {
            order_id: id.to_string(),
            asset: "BTC".to_string(),
            side: Side::Buy,
            price,
            quantity: dec!(0.0002),
            time_placed: Utc::now(),
        }
    }

    #[test]
    fn test_compliant_set_passes() {
        let guardrail = Guardrail::new(RiskLimits::default());
        let actions = vec![
            Action::limit_buy("BTC", dec!(88000), dec!(200)),
            Action::limit_buy("ADA", dec!(0.49), dec!(100)),
            Action::hold("keep the rest"),
        ];
        let outcome = guardrail.evaluate(&actions, &[], &prices(), &portfolio());
        assert_eq!(outcome.status(), GuardrailStatus::Pass, "{}", outcome.report());
    }

    #[test]
    fn test_cancel_frees_a_slot() {
        let guardrail = Guardrail::new(RiskLimits::default());
        let open = vec![
            open_btc("1", dec!(87000)),
            open_btc("2", dec!(86000)),
            open_btc("3", dec!(85000)),
        ];
        let actions = vec![
            Action::cancel("BTC", "3"),
            Action::limit_buy("BTC", dec!(88000), dec!(50)),
        ];
        let outcome = guardrail.evaluate(&actions, &open, &prices(), &portfolio());
        assert!(!outcome.is_tripwire(), "{}", outcome.report());
    }

    #[test]
    fn test_buy_above_market_trips_even_within_band() {
        let guardrail = Guardrail::new(RiskLimits::default());
        let actions = vec![Action::limit_buy("BTC", dec!(91000), dec!(50))];
        let outcome = guardrail.evaluate(&actions, &[], &prices(), &portfolio());
        assert_eq!(outcome.broken_limits(), vec![HardLimit::PriceBand]);
        assert!(matches!(outcome.violations()[0], Violation::BuyAboveMarket { .. }));
    }

    #[test]
    fn test_unknown_cancel_is_only_a_warning() {
        let guardrail = Guardrail::new(RiskLimits::default());
        let actions = vec![Action::cancel("BTC", "nope")];
        let outcome = guardrail.evaluate(&actions, &[], &prices(), &portfolio());
        assert!(!outcome.is_tripwire());
        assert_eq!(outcome.warnings().len(), 1);
    }

    #[test]
    fn test_insufficient_balance_is_only_a_warning() {
        let limits = RiskLimits {
            max_exposure_pct: dec!(100),
            ..RiskLimits::default()
        };
        let guardrail = Guardrail::new(limits);
        let actions = vec![Action::market_buy("BTC", dec!(1200))];
        let mut rich = portfolio();
        rich.balances.insert("BTC".into(), Balance::new("BTC", dec!(1), dec!(0)));
        let outcome = guardrail.evaluate(&actions, &[], &prices(), &rich);
        assert!(!outcome.is_tripwire(), "{}", outcome.report());
        assert!(outcome.warnings()[0].contains("only 1000 USDT is free"));
    }

    #[test]
    fn test_report_lists_violations() {
        let guardrail = Guardrail::new(RiskLimits::default());
        let actions = vec![Action::market_buy("ADA", dec!(5))];
        let report = guardrail.evaluate(&actions, &[], &prices(), &portfolio()).report();
        assert!(report.starts_with("Guardrail: TRIPWIRE"));
        assert!(report.contains("[minimum_order]"));
    }
}
