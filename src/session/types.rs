//! Session record of one cycle

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::common::types::Side;
use crate::execution::{ExecutionMode, ExecutionResult, ExecutionSummary};
use crate::market::MarketContext;
use crate::oracle::types::{TradingDecision, VerificationResult};
use crate::risk::GuardrailOutcome;

/// How a cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionType {
    /// Aborted before a decision (no data, no capital, fatal stage error)
    Skip,
    /// Decided, nothing sent to the exchange
    Hold,
    /// Actions were submitted
    Buy,
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionType::Skip => write!(f, "SKIP"),
            SessionType::Hold => write!(f, "HOLD"),
            SessionType::Buy => write!(f, "BUY"),
        }
    }
}

/// Finalized, immutable record of one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub session_type: SessionType,
    pub mode: ExecutionMode,
    pub quote_asset: String,
    /// Free quote balance at cycle start
    pub quote_balance: Decimal,
    pub portfolio_value: Decimal,
    #[serde(default)]
    pub prices: BTreeMap<String, Decimal>,
    #[serde(default)]
    pub rsi: BTreeMap<String, Decimal>,
    #[serde(default)]
    pub fear_greed: Option<u8>,
    #[serde(default)]
    pub decision: Option<TradingDecision>,
    #[serde(default)]
    pub guardrail: Option<GuardrailOutcome>,
    #[serde(default)]
    pub verification: Option<VerificationResult>,
    #[serde(default)]
    pub execution_results: Vec<ExecutionResult>,
    pub total_deployed: Decimal,
    pub total_fees: Decimal,
    pub remaining_balance: Decimal,
    /// Why a cycle skipped without failing, e.g. insufficient capital
    #[serde(default)]
    pub skip_reason: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Session {
    /// Skip and Hold succeed unless an error was recorded; Buy also needs
    /// every execution result to have succeeded
    pub fn was_successful(&self) -> bool {
        if self.error.is_some() {
            return false;
        }
        match self.session_type {
            SessionType::Skip | SessionType::Hold => true,
            SessionType::Buy => self.execution_results.iter().all(|r| r.success),
        }
    }

    pub fn execution_summary(&self) -> ExecutionSummary {
        ExecutionSummary::from_results(&self.execution_results)
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.session_type {
            SessionType::Skip => write!(
                f,
                "SKIP - {}",
                self.error
                    .as_deref()
                    .or(self.skip_reason.as_deref())
                    .unwrap_or("no reason recorded")
            ),
            SessionType::Hold => {
                let reason = match (&self.guardrail, &self.decision) {
                    (Some(g), _) if g.is_tripwire() => {
                        format!("blocked by guardrail ({} violations)", g.violations().len())
                    }
                    (_, Some(d)) => d.reasoning.clone(),
                    _ => String::new(),
                };
                write!(f, "HOLD - {}", reason)
            }
            SessionType::Buy => write!(
                f,
                "BUY - Deployed {} {} ({} orders, {} fees)",
                self.total_deployed.round_dp(2),
                self.quote_asset,
                self.execution_results.len(),
                self.total_fees.round_dp(4)
            ),
        }
    }
}

/// Session under construction, owned by the running cycle
///
/// Consumed by [`SessionDraft::finalize`], so a cycle can only ever produce
/// one [`Session`].
#[derive(Debug, Clone)]
pub struct SessionDraft {
    id: Uuid,
    timestamp: DateTime<Utc>,
    mode: ExecutionMode,
    quote_asset: String,
    quote_balance: Decimal,
    portfolio_value: Decimal,
    prices: BTreeMap<String, Decimal>,
    rsi: BTreeMap<String, Decimal>,
    fear_greed: Option<u8>,
    pub decision: Option<TradingDecision>,
    pub guardrail: Option<GuardrailOutcome>,
    pub verification: Option<VerificationResult>,
    pub execution_results: Vec<ExecutionResult>,
    pub skip_reason: Option<String>,
    pub error: Option<String>,
}

impl SessionDraft {
    pub fn new(mode: ExecutionMode, quote_asset: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            mode,
            quote_asset: quote_asset.to_uppercase(),
            quote_balance: Decimal::ZERO,
            portfolio_value: Decimal::ZERO,
            prices: BTreeMap::new(),
            rsi: BTreeMap::new(),
            fear_greed: None,
            decision: None,
            guardrail: None,
            verification: None,
            execution_results: Vec::new(),
            skip_reason: None,
            error: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Copy the snapshot fields out of the cycle's market context
    pub fn record_context(&mut self, context: &MarketContext) {
        self.quote_balance = context.available_capital();
        self.portfolio_value = context.portfolio_value();
        self.prices = context.prices();
        self.rsi = context
            .markets
            .keys()
            .filter_map(|asset| context.rsi(asset).map(|rsi| (asset.clone(), rsi)))
            .collect();
        self.fear_greed = context.fear_greed.as_ref().map(|r| r.value);
    }

    pub fn quote_balance(&self) -> Decimal {
        self.quote_balance
    }

    /// Compute totals and freeze the record
    pub fn finalize(self, session_type: SessionType) -> Session {
        let mut total_deployed = Decimal::ZERO;
        let mut total_fees = Decimal::ZERO;
        for result in self.execution_results.iter().filter(|r| r.success) {
            if result.action_type.side() == Some(Side::Buy) {
                total_deployed += result.notional_filled.unwrap_or_default();
            }
            total_fees += result.fee.unwrap_or_default();
        }

        Session {
            id: self.id,
            timestamp: self.timestamp,
            session_type,
            mode: self.mode,
            quote_asset: self.quote_asset,
            quote_balance: self.quote_balance,
            portfolio_value: self.portfolio_value,
            prices: self.prices,
            rsi: self.rsi,
            fear_greed: self.fear_greed,
            decision: self.decision,
            guardrail: self.guardrail,
            verification: self.verification,
            execution_results: self.execution_results,
            total_deployed,
            total_fees,
            remaining_balance: self.quote_balance - total_deployed - total_fees,
            skip_reason: self.skip_reason,
            error: self.error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::types::ActionType;
    use rust_decimal_macros::dec;

    fn filled(action_type: ActionType, notional: Decimal, fee: Decimal) -> ExecutionResult {
        ExecutionResult {
            success: true,
            asset: "BTC".into(),
            action_type,
            order_id: Some("DRY_RUN-1".into()),
            executed_price: Some(dec!(90000)),
            executed_quantity: Some(notional / dec!(90000)),
            notional_filled: Some(notional),
            fee: Some(fee),
            error: None,
            timestamp: Utc::now(),
        }
    }

    fn draft_with_balance(balance: Decimal) -> SessionDraft {
        let mut draft = SessionDraft::new(ExecutionMode::DryRun, "usdt");
        draft.quote_balance = balance;
        draft
    }

    #[test]
    fn test_finalize_totals() {
        let mut draft = draft_with_balance(dec!(1000));
        draft.execution_results = vec![
            filled(ActionType::PlaceLimitBuy, dec!(200), dec!(0.2)),
            filled(ActionType::PlaceMarketSell, dec!(50), dec!(0.05)),
            ExecutionResult::failed("ADA", ActionType::PlaceLimitBuy, "rejected"),
        ];
        let session = draft.finalize(SessionType::Buy);

        assert_eq!(session.quote_asset, "USDT");
        assert_eq!(session.total_deployed, dec!(200));
        assert_eq!(session.total_fees, dec!(0.25));
        assert_eq!(session.remaining_balance, dec!(799.75));
        assert!(!session.was_successful());
    }

    #[test]
    fn test_was_successful_rules() {
        let hold = draft_with_balance(dec!(100)).finalize(SessionType::Hold);
        assert!(hold.was_successful());

        let mut errored = draft_with_balance(dec!(100));
        errored.error = Some("Data unavailable: ticker".into());
        let skip = errored.finalize(SessionType::Skip);
        assert!(!skip.was_successful());
        assert_eq!(skip.to_string(), "SKIP - Data unavailable: ticker");

        let mut bought = draft_with_balance(dec!(100));
        bought.execution_results = vec![filled(ActionType::PlaceMarketBuy, dec!(20), dec!(0.02))];
        assert!(bought.finalize(SessionType::Buy).was_successful());

        let mut poor = draft_with_balance(dec!(4));
        poor.skip_reason = Some("free USDT balance 4 below minimum 10".into());
        let skip = poor.finalize(SessionType::Skip);
        assert!(skip.was_successful());
        assert_eq!(skip.to_string(), "SKIP - free USDT balance 4 below minimum 10");
    }

    #[test]
    fn test_session_serializes_as_one_line() {
        let session = draft_with_balance(dec!(42)).finalize(SessionType::Hold);
        let line = serde_json::to_string(&session).unwrap();
        assert!(!line.contains('\n'));
        let back: Session = serde_json::from_str(&line).unwrap();
        assert_eq!(back, session);
    }
}
