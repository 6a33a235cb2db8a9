//! Bounds checks that serde alone cannot express
//!
//! Everything here is structural. Trading limits (minimum order value,
//! exposure, order caps) belong to the risk guardrail, not to the schema.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::errors::OracleError;
use super::types::*;

const MAX_SUMMARY_CHARS: usize = 1500;
const MAX_MARKET_SUMMARY_CHARS: usize = 500;
const MIN_OPTIONS: usize = 3;
const MAX_OPTIONS: usize = 5;
/// Upper bound for any price or notional an oracle may emit
const MAX_AMOUNT: Decimal = dec!(1000000000000);

fn violation(msg: impl Into<String>) -> OracleError {
    OracleError::SchemaViolation(msg.into())
}

fn check_range<T>(name: &str, value: T, min: T, max: T) -> Result<(), OracleError>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if value < min || value > max {
        return Err(violation(format!(
            "{} must be in [{},{}], got {}",
            name, min, max, value
        )));
    }
    Ok(())
}

/// Validate any oracle output against its role's bounds
pub fn validate_output(output: &OracleOutput) -> Result<(), OracleError> {
    match output {
        OracleOutput::ResearchPlan(plan) => validate_research_plan(plan),
        OracleOutput::ResearchSummary(summary) => validate_research_summary(summary),
        OracleOutput::ConsultationPlan(_) => Ok(()),
        OracleOutput::Technical(a) => {
            check_range("score", a.score, 1, 10)?;
            check_range("entry_quality", a.entry_quality, 1, 10)?;
            if let Some(pct) = a.fill_probability_pct {
                check_range("fill_probability_pct", pct, 0, 100)?;
            }
            if let Some(price) = a.recommended_limit_price {
                if price <= Decimal::ZERO {
                    return Err(violation("recommended_limit_price must be positive"));
                }
            }
            Ok(())
        }
        OracleOutput::Fundamental(a) => check_range("conviction", a.conviction, 1, 10),
        OracleOutput::Risk(a) => {
            for item in &a.risks {
                check_range("severity", item.severity, 1, 10)?;
                check_range("probability", item.probability, 1, 10)?;
            }
            Ok(())
        }
        OracleOutput::Sentiment(a) => {
            check_range("sentiment_score", a.sentiment_score, -10, 10)?;
            if let Some(index) = a.fear_greed_index {
                check_range("fear_greed_index", index, 0, 100)?;
            }
            Ok(())
        }
        OracleOutput::StrategyOptions(options) => validate_strategy_options(options),
        OracleOutput::Decision(decision) => validate_actions(&decision.actions),
        OracleOutput::Verification(_) => Ok(()),
    }
}

pub fn validate_research_plan(plan: &ResearchPlan) -> Result<(), OracleError> {
    if plan.searches.is_empty() {
        return Err(violation("research plan has no searches"));
    }
    for search in &plan.searches {
        if search.query.trim().is_empty() {
            return Err(violation("research query text is empty"));
        }
        check_range("priority", search.priority, 1, 5)?;
    }
    Ok(())
}

pub fn validate_research_summary(summary: &ResearchSummary) -> Result<(), OracleError> {
    check_range("recency_score", summary.recency_score, 1, 10)?;
    let chars = summary.summary.chars().count();
    if chars > MAX_SUMMARY_CHARS {
        return Err(violation(format!(
            "summary exceeds {} chars: {}",
            MAX_SUMMARY_CHARS, chars
        )));
    }
    Ok(())
}

pub fn validate_strategy_options(options: &StrategyOptions) -> Result<(), OracleError> {
    let count = options.options.len();
    if !(MIN_OPTIONS..=MAX_OPTIONS).contains(&count) {
        return Err(violation(format!(
            "expected {}-{} options, got {}",
            MIN_OPTIONS, MAX_OPTIONS, count
        )));
    }
    if options.recommended_option >= count {
        return Err(violation(format!(
            "recommended_option {} out of range for {} options",
            options.recommended_option, count
        )));
    }
    if options.market_summary.chars().count() > MAX_MARKET_SUMMARY_CHARS {
        return Err(violation(format!(
            "market_summary exceeds {} chars",
            MAX_MARKET_SUMMARY_CHARS
        )));
    }

    for option in &options.options {
        check_range("conviction", option.conviction, 1, 10)?;
        for (asset, pct) in &option.allocations {
            if *pct < Decimal::ZERO || *pct > Decimal::ONE_HUNDRED {
                return Err(violation(format!(
                    "allocation for {} in option '{}' must be in [0,100], got {}",
                    asset, option.strategy, pct
                )));
            }
        }
        validate_actions(&option.actions)?;
    }
    Ok(())
}

/// Per-action structural invariants
pub fn validate_actions(actions: &[Action]) -> Result<(), OracleError> {
    for action in actions {
        let t = action.action_type;
        if t.is_place() {
            if action.asset.as_deref().map_or(true, |a| a.trim().is_empty()) {
                return Err(violation(format!("{} action without asset", t)));
            }
            match action.notional_amount {
                Some(n) if n > Decimal::ZERO && n <= MAX_AMOUNT => {}
                Some(n) if n > MAX_AMOUNT => {
                    return Err(violation(format!("{} notional_amount {} exceeds {}", t, n, MAX_AMOUNT)))
                }
                other => {
                    return Err(violation(format!(
                        "{} action needs a positive notional_amount, got {:?}",
                        t, other
                    )))
                }
            }
        }
        if t.is_limit() {
            match action.price {
                Some(p) if p > Decimal::ZERO && p <= MAX_AMOUNT => {}
                Some(p) if p > MAX_AMOUNT => {
                    return Err(violation(format!("{} price {} exceeds {}", t, p, MAX_AMOUNT)))
                }
                other => {
                    return Err(violation(format!(
                        "{} action needs a positive price, got {:?}",
                        t, other
                    )))
                }
            }
        }
        if t == ActionType::CancelOrder
            && action.order_id.as_deref().map_or(true, |id| id.trim().is_empty())
        {
            return Err(violation("CANCEL_ORDER action without order_id"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn option(name: &str, conviction: u8, actions: Vec<Action>) -> StrategyOption {
        StrategyOption {
            strategy: name.into(),
            allocations: BTreeMap::new(),
            actions,
            conviction,
            rationale: "test".into(),
            risks: vec![],
            expected_outcome: String::new(),
        }
    }

    fn three_options() -> StrategyOptions {
        StrategyOptions {
            options: vec![
                option("Hold", 5, vec![Action::hold("wait")]),
                option("Balanced", 6, vec![Action::limit_buy("BTC", dec!(88000), dec!(100))]),
                option("Aggressive", 8, vec![Action::market_buy("BTC", dec!(300))]),
            ],
            recommended_option: 1,
            market_summary: "range-bound".into(),
        }
    }

    #[test]
    fn test_valid_options_pass() {
        assert!(validate_strategy_options(&three_options()).is_ok());
    }

    #[test]
    fn test_option_count_bounds() {
        let mut options = three_options();
        options.options.pop();
        options.recommended_option = 0;
        let err = validate_strategy_options(&options).unwrap_err();
        assert!(err.to_string().contains("expected 3-5 options, got 2"));
    }

    #[test]
    fn test_recommended_index_out_of_range() {
        let mut options = three_options();
        options.recommended_option = 3;
        assert!(validate_strategy_options(&options).is_err());
    }

    #[test]
    fn test_allocation_pct_bounds() {
        let mut options = three_options();
        options.options[1].allocations.insert("BTC".into(), dec!(120));
        let err = validate_strategy_options(&options).unwrap_err();
        assert!(err.to_string().contains("allocation for BTC"));
    }

    #[test]
    fn test_limit_action_requires_positive_price() {
        let mut action = Action::limit_buy("ADA", dec!(0.5), dec!(20));
        action.price = Some(Decimal::ZERO);
        assert!(validate_actions(&[action]).is_err());
    }

    #[test]
    fn test_absurd_amounts_rejected() {
        let huge = Decimal::from_str_exact("10000000000000000000000000000").unwrap();
        let err = validate_actions(&[Action::market_buy("BTC", huge)]).unwrap_err();
        assert!(err.to_string().contains("exceeds"));

        let mut action = Action::limit_buy("BTC", dec!(88000), dec!(100));
        action.price = Some(huge);
        assert!(validate_actions(&[action]).is_err());
    }

    #[test]
    fn test_cancel_requires_order_id() {
        let mut action = Action::cancel("BTC", "123");
        assert!(validate_actions(std::slice::from_ref(&action)).is_ok());
        action.order_id = None;
        assert!(validate_actions(&[action]).is_err());
    }

    #[test]
    fn test_research_bounds() {
        let summary = ResearchSummary {
            query: "btc etf flows".into(),
            summary: "x".repeat(1501),
            key_metrics: vec![],
            implications: "none".into(),
            recency_score: 7,
        };
        assert!(validate_research_summary(&summary).is_err());

        let plan = ResearchPlan {
            searches: vec![ResearchQuery {
                query: "ada staking ratio".into(),
                reason: "supply".into(),
                priority: 6,
                category: ResearchCategory::OnChain,
            }],
            strategy_hint: String::new(),
        };
        assert!(validate_research_plan(&plan).is_err());
    }

    #[test]
    fn test_sentiment_bounds() {
        let output = OracleOutput::Sentiment(SentimentAssessment {
            sentiment_score: -11,
            contrarian_opportunity: true,
            crowded_trade_risk: false,
            fear_greed_index: Some(12),
            funding_rate_signal: String::new(),
            social_sentiment: String::new(),
            recommendation: "accumulate".into(),
        });
        assert!(validate_output(&output).is_err());
    }
}
