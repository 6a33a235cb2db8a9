//! Selector and guardrail, evaluated concurrently and joined
//!
//! The selector (an oracle role) picks one option and emits a decision. In
//! parallel the guardrail evaluates every candidate option's action set
//! against the hard limits. Both read the same immutable options and
//! context; the join happens only after both finish. A tripwire blocks the
//! decision no matter what the selector reasoned.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::common::errors::{DcaError, Result};
use crate::market::MarketContext;
use crate::oracle::{invoke_typed, Oracle, OracleError, Role, StrategyOptions, TradingDecision};
use crate::risk::{Guardrail, GuardrailOutcome};

/// Lifecycle of one decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionState {
    Pending,
    Evaluating,
    Joined,
    Approved,
    Blocked,
}

impl DecisionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DecisionState::Approved | DecisionState::Blocked)
    }

    fn can_advance_to(&self, next: DecisionState) -> bool {
        matches!(
            (self, next),
            (DecisionState::Pending, DecisionState::Evaluating)
                | (DecisionState::Evaluating, DecisionState::Joined)
                | (DecisionState::Joined, DecisionState::Approved)
                | (DecisionState::Joined, DecisionState::Blocked)
        )
    }
}

impl fmt::Display for DecisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DecisionState::Pending => "pending",
            DecisionState::Evaluating => "evaluating",
            DecisionState::Joined => "joined",
            DecisionState::Approved => "approved",
            DecisionState::Blocked => "blocked",
        };
        write!(f, "{}", name)
    }
}

/// Tracks the state of a decision and refuses illegal transitions
#[derive(Debug)]
struct StateTracker {
    state: DecisionState,
}

impl StateTracker {
    fn new() -> Self {
        Self {
            state: DecisionState::Pending,
        }
    }

    fn advance(&mut self, next: DecisionState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(DcaError::Internal(format!(
                "illegal decision transition {} -> {}",
                self.state, next
            )));
        }
        debug!("Decision {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }
}

/// Joined selector and guardrail result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub decision: TradingDecision,
    pub guardrail: GuardrailOutcome,
    /// Always terminal: `Approved` or `Blocked`
    pub state: DecisionState,
    /// True when the decision's actions differed from its option's and the
    /// guardrail was evaluated again on the decision itself
    pub reevaluated: bool,
}

impl DecisionOutcome {
    pub fn is_approved(&self) -> bool {
        self.state == DecisionState::Approved
    }
}

pub struct DecisionStage {
    oracle: Arc<dyn Oracle>,
    guardrail: Guardrail,
    stage_timeout: Duration,
}

impl DecisionStage {
    pub fn new(oracle: Arc<dyn Oracle>, guardrail: Guardrail, stage_timeout: Duration) -> Self {
        Self {
            oracle,
            guardrail,
            stage_timeout,
        }
    }

    pub fn guardrail(&self) -> &Guardrail {
        &self.guardrail
    }

    /// Select a decision and gate it on the hard limits
    ///
    /// A selector failure, timeout, out-of-range index or over-budget
    /// decision is fatal for the cycle. A tripwire is not an error.
    #[instrument(skip(self, context, options))]
    pub async fn decide(&self, context: &MarketContext, options: &StrategyOptions) -> Result<DecisionOutcome> {
        let mut tracker = StateTracker::new();
        tracker.advance(DecisionState::Evaluating)?;

        let (selected, per_option) = tokio::join!(self.select(context, options), async {
            options
                .options
                .iter()
                .map(|option| self.guardrail.evaluate_in(&option.actions, context))
                .collect::<Vec<GuardrailOutcome>>()
        });
        tracker.advance(DecisionState::Joined)?;

        let decision = selected?;
        let option = options.get(decision.selected_option).ok_or_else(|| {
            DcaError::oracle(
                Role::Selector,
                OracleError::SchemaViolation(format!(
                    "selected_option {} out of range (0..{})",
                    decision.selected_option,
                    options.options.len()
                )),
            )
        })?;

        let budget = option.allocation_budget(context.available_capital());
        let placed = decision.placed_notional();
        if placed > budget {
            return Err(DcaError::oracle(
                Role::Selector,
                OracleError::SchemaViolation(format!(
                    "decision places {} but option {} allows {}",
                    placed, decision.selected_option, budget
                )),
            ));
        }

        let reevaluated = decision.actions != option.actions;
        let guardrail = if reevaluated {
            debug!("Decision actions differ from option {}, re-evaluating guardrail", decision.selected_option);
            self.guardrail.evaluate_in(&decision.actions, context)
        } else {
            per_option
                .into_iter()
                .nth(decision.selected_option)
                .unwrap_or_else(|| self.guardrail.evaluate_in(&decision.actions, context))
        };

        let verdict = if guardrail.is_tripwire() {
            DecisionState::Blocked
        } else {
            DecisionState::Approved
        };
        tracker.advance(verdict)?;

        if verdict == DecisionState::Blocked {
            warn!(
                "Decision for option {} blocked by guardrail: {} violations",
                decision.selected_option,
                guardrail.violations().len()
            );
        } else {
            info!(
                "Decision for option {} approved ({} actions, {} placed)",
                decision.selected_option,
                decision.actions.len(),
                placed
            );
        }

        Ok(DecisionOutcome {
            decision,
            guardrail,
            state: tracker.state,
            reevaluated,
        })
    }

    async fn select(&self, context: &MarketContext, options: &StrategyOptions) -> Result<TradingDecision> {
        let input = json!({
            "market_context": context.to_value(),
            "available_capital": context.available_capital(),
            "strategy_options": options,
        });
        match timeout(
            self.stage_timeout,
            invoke_typed::<TradingDecision>(self.oracle.as_ref(), Role::Selector, &input),
        )
        .await
        {
            Ok(result) => result.map_err(|e| DcaError::oracle(Role::Selector, e)),
            Err(_) => Err(DcaError::oracle(Role::Selector, OracleError::Timeout)),
        }
    }
}
