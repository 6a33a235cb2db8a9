//! Advisory audit of an approved decision

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, instrument, warn};

use crate::market::{MarketContext, RSI_OVERBOUGHT, RSI_OVERSOLD};
use crate::oracle::{
    invoke_typed, Oracle, OracleError, Role, StrategyOptions, TradingDecision, VerificationResult, VerificationStatus,
};

const HIGH_CONVICTION: u8 = 8;
const LOW_CONVICTION: u8 = 3;
const THIN_ALLOCATION_PCT: Decimal = dec!(10);
const HEAVY_ALLOCATION_PCT: Decimal = dec!(50);
const EXTREME_FEAR_BELOW: u8 = 25;
const EXTREME_GREED_FROM: u8 = 75;
/// Tolerance on allocation arithmetic: max(1 quote unit, 1%)
const ARITHMETIC_TOLERANCE_PCT: Decimal = Decimal::ONE;

pub struct Verifier {
    oracle: Arc<dyn Oracle>,
    stage_timeout: Duration,
}

impl Verifier {
    pub fn new(oracle: Arc<dyn Oracle>, stage_timeout: Duration) -> Self {
        Self { oracle, stage_timeout }
    }

    /// Audit a decision against the alternatives and the observed market
    ///
    /// Never fails. An oracle failure is reported as an issue next to the
    /// deterministic findings.
    #[instrument(skip_all)]
    pub async fn verify(
        &self,
        context: &MarketContext,
        options: &StrategyOptions,
        decision: &TradingDecision,
    ) -> VerificationResult {
        let mut issues = audit(context, options, decision);

        let input = json!({
            "market_context": context.to_value(),
            "strategy_options": options,
            "decision": decision,
        });
        let reviewed = match timeout(
            self.stage_timeout,
            invoke_typed::<VerificationResult>(self.oracle.as_ref(), Role::Verifier, &input),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(OracleError::Timeout),
        };

        let (recommendations, summary) = match reviewed {
            Ok(review) => {
                for issue in review.issues {
                    if !issues.contains(&issue) {
                        issues.push(issue);
                    }
                }
                (review.recommendations, review.summary)
            }
            Err(e) => {
                warn!("Verifier oracle unavailable: {}", e);
                issues.push(format!("verifier oracle unavailable: {}", e));
                (Vec::new(), String::new())
            }
        };

        let status = if issues.is_empty() {
            VerificationStatus::Pass
        } else {
            VerificationStatus::Issues
        };
        if issues.is_empty() {
            info!("Verification passed");
        } else {
            warn!("Verification raised {} issues", issues.len());
        }

        VerificationResult {
            status,
            issues,
            recommendations,
            summary,
        }
    }
}

/// Deterministic checks that need no oracle
///
/// Covers conviction against sizing, the presence of a conservative
/// alternative, cited conditions against observed indicators, and action
/// notionals against allocation percentages.
pub fn audit(context: &MarketContext, options: &StrategyOptions, decision: &TradingDecision) -> Vec<String> {
    let mut issues = Vec::new();
    let Some(option) = options.get(decision.selected_option) else {
        issues.push(format!("selected option {} does not exist", decision.selected_option));
        return issues;
    };

    // Conviction vs sizing
    let allocated = option.total_allocation_pct();
    if option.conviction >= HIGH_CONVICTION && allocated < THIN_ALLOCATION_PCT {
        issues.push(format!(
            "conviction {}/10 paired with only {}% allocated",
            option.conviction, allocated
        ));
    }
    if option.conviction <= LOW_CONVICTION && allocated > HEAVY_ALLOCATION_PCT {
        issues.push(format!(
            "conviction {}/10 paired with {}% allocated",
            option.conviction, allocated
        ));
    }

    issues.extend(check_diversity(options));
    issues.extend(check_cited_conditions(context, decision));
    issues.extend(check_allocation_arithmetic(context, option.allocations.clone(), decision));
    issues
}

/// At least one option must lean towards holding: no placements, or a thin allocation
fn check_diversity(options: &StrategyOptions) -> Option<String> {
    let hold_leaning = options
        .options
        .iter()
        .any(|o| o.placed_notional().is_zero() || o.total_allocation_pct() <= THIN_ALLOCATION_PCT);
    if hold_leaning {
        return None;
    }
    let smallest = options
        .options
        .iter()
        .map(|o| o.total_allocation_pct())
        .min()
        .unwrap_or_default();
    Some(format!(
        "no conservative option among {}: every option places orders, smallest allocation {}%",
        options.options.len(),
        smallest
    ))
}

fn check_cited_conditions(context: &MarketContext, decision: &TradingDecision) -> Vec<String> {
    let text = format!("{} {}", decision.reasoning, decision.plan).to_lowercase();
    let rsi: Vec<Decimal> = context.markets.keys().filter_map(|a| context.rsi(a)).collect();
    let fear_greed = context.fear_greed.as_ref().map(|r| r.value);
    let mut issues = Vec::new();

    if text.contains("oversold") && !rsi.iter().any(|r| *r < RSI_OVERSOLD) {
        issues.push(format!("reasoning cites oversold but no asset has RSI below {}", RSI_OVERSOLD));
    }
    if text.contains("overbought") && !rsi.iter().any(|r| *r > RSI_OVERBOUGHT) {
        issues.push(format!("reasoning cites overbought but no asset has RSI above {}", RSI_OVERBOUGHT));
    }
    if text.contains("extreme fear") && !fear_greed.is_some_and(|v| v < EXTREME_FEAR_BELOW) {
        issues.push(format!(
            "reasoning cites extreme fear but Fear & Greed is {}",
            describe(fear_greed)
        ));
    }
    if text.contains("extreme greed") && !fear_greed.is_some_and(|v| v >= EXTREME_GREED_FROM) {
        issues.push(format!(
            "reasoning cites extreme greed but Fear & Greed is {}",
            describe(fear_greed)
        ));
    }
    issues
}

fn describe(value: Option<u8>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "unknown".into())
}

fn check_allocation_arithmetic(
    context: &MarketContext,
    allocations: BTreeMap<String, Decimal>,
    decision: &TradingDecision,
) -> Vec<String> {
    let quote = context.quote_asset();
    let available = context.available_capital();

    let mut placed: BTreeMap<String, Decimal> = BTreeMap::new();
    for action in decision.actions.iter().filter(|a| a.action_type.is_place()) {
        if let Some(asset) = action.asset_key(quote) {
            *placed.entry(asset).or_default() += action.placed_notional();
        }
    }

    let allocations: BTreeMap<String, Decimal> = allocations
        .into_iter()
        .map(|(asset, pct)| (crate::oracle::asset_key(&asset, quote), pct))
        .collect();

    let mut issues = Vec::new();
    for (asset, notional) in &placed {
        let Some(pct) = allocations.get(asset) else {
            issues.push(format!("{} {} placed on {} which has no allocation", notional, quote, asset));
            continue;
        };
        let expected = *pct / Decimal::ONE_HUNDRED * available;
        let tolerance = (expected * ARITHMETIC_TOLERANCE_PCT / Decimal::ONE_HUNDRED).max(Decimal::ONE);
        if (*notional - expected).abs() > tolerance {
            issues.push(format!(
                "{} notional {} {} does not match {}% of {} ({})",
                asset,
                notional,
                quote,
                pct,
                available,
                expected.round_dp(2)
            ));
        }
    }
    issues
}
