//! Roles and typed output contracts of the reasoning oracle

use rust_decimal::Decimal;
use schemars::schema::RootSchema;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::errors::OracleError;
use crate::common::types::Side;

// ============================================================================
// Roles
// ============================================================================

/// Every contract the pipeline asks the oracle to fulfil
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Turns market context into a research plan
    Planner,
    /// Answers one research query
    Researcher,
    /// Decides which specialists the strategist consults
    Consultation,
    TechnicalAnalyst,
    FundamentalAnalyst,
    RiskAnalyst,
    SentimentAnalyst,
    /// Produces 3-5 strategy options
    Strategist,
    /// Picks one option and turns it into a decision
    Selector,
    /// Audits a decision after the fact
    Verifier,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Role::Planner => "planner",
            Role::Researcher => "researcher",
            Role::Consultation => "consultation",
            Role::TechnicalAnalyst => "technical analyst",
            Role::FundamentalAnalyst => "fundamental analyst",
            Role::RiskAnalyst => "risk analyst",
            Role::SentimentAnalyst => "sentiment analyst",
            Role::Strategist => "strategist",
            Role::Selector => "selector",
            Role::Verifier => "verifier",
        };
        write!(f, "{}", name)
    }
}

impl Role {
    /// Role-specific instructions placed in the system prompt
    pub fn instructions(&self) -> &'static str {
        match self {
            Role::Planner => {
                "You plan research for a dollar-cost-averaging accumulation program. \
                 Given the market context, propose 3 to 8 focused search queries across \
                 on-chain, ecosystem, macro, technical and sentiment categories. \
                 Priority 5 is most important."
            }
            Role::Researcher => {
                "You research one query for an accumulation program. Summarize what is \
                 known in at most 1500 characters, list key metrics, state the implication \
                 for accumulating, and score recency from 1 (stale) to 10 (last 24h)."
            }
            Role::Consultation => {
                "You decide which specialist analysts to consult before writing strategy \
                 options. Request only the analyses that would change the decision. \
                 An empty list is valid."
            }
            Role::TechnicalAnalyst => {
                "You are a technical analyst. Score the entry setup for the asset from 1 to 10 \
                 using the indicators provided. Suggest a limit price only if it sits below \
                 the current price for buys."
            }
            Role::FundamentalAnalyst => {
                "You are a fundamental analyst. Rate long-term conviction in the asset from \
                 1 to 10 and assess whether the current price offers value."
            }
            Role::RiskAnalyst => {
                "You are a risk analyst. Classify the environment as GREEN, YELLOW or RED and \
                 list concrete risks with severity and probability from 1 to 10."
            }
            Role::SentimentAnalyst => {
                "You are a sentiment analyst. Score sentiment from -10 (extreme fear) to 10 \
                 (extreme greed) and flag contrarian opportunities and crowded trades."
            }
            Role::Strategist => {
                "You are the strategist. Produce 3 to 5 mutually exclusive strategy options. \
                 Include at least one conservative or hold-leaning option, and an aggressive \
                 option when evidence supports it. Allocations are percentages of available \
                 capital per asset. Every action's notional_amount must be computed as \
                 (allocation_pct / 100) x available capital; never leave percentages in actions."
            }
            Role::Selector => {
                "You are the decision maker. Select exactly one of the strategy options by \
                 index and copy its actions unchanged into the decision. Explain the plan, \
                 the reasoning and the risk assessment."
            }
            Role::Verifier => {
                "You audit a trading decision for consistency. Check that conviction matches \
                 sizing, that cited conditions match the numbers in the context, and that \
                 notional amounts match the stated allocations. Report PASS or ISSUES."
            }
        }
    }

    /// JSON schema of the output this role must produce
    pub fn output_schema(&self) -> RootSchema {
        match self {
            Role::Planner => schema_for!(ResearchPlan),
            Role::Researcher => schema_for!(ResearchSummary),
            Role::Consultation => schema_for!(ConsultationPlan),
            Role::TechnicalAnalyst => schema_for!(TechnicalAssessment),
            Role::FundamentalAnalyst => schema_for!(FundamentalAssessment),
            Role::RiskAnalyst => schema_for!(RiskAssessment),
            Role::SentimentAnalyst => schema_for!(SentimentAssessment),
            Role::Strategist => schema_for!(StrategyOptions),
            Role::Selector => schema_for!(TradingDecision),
            Role::Verifier => schema_for!(VerificationResult),
        }
    }
}

// ============================================================================
// Research
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ResearchCategory {
    OnChain,
    Ecosystem,
    Macro,
    Technical,
    Sentiment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ResearchQuery {
    pub query: String,
    pub reason: String,
    /// 1 (low) to 5 (high)
    pub priority: u8,
    pub category: ResearchCategory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ResearchPlan {
    pub searches: Vec<ResearchQuery>,
    #[serde(default)]
    pub strategy_hint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ResearchSummary {
    pub query: String,
    /// At most 1500 characters
    pub summary: String,
    #[serde(default)]
    pub key_metrics: Vec<String>,
    pub implications: String,
    /// 1 (stale) to 10 (fresh)
    pub recency_score: u8,
}

// ============================================================================
// Specialists
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SpecialistKind {
    Technical,
    Fundamental,
    Risk,
    Sentiment,
}

impl SpecialistKind {
    pub fn role(&self) -> Role {
        match self {
            SpecialistKind::Technical => Role::TechnicalAnalyst,
            SpecialistKind::Fundamental => Role::FundamentalAnalyst,
            SpecialistKind::Risk => Role::RiskAnalyst,
            SpecialistKind::Sentiment => Role::SentimentAnalyst,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ConsultRequest {
    pub kind: SpecialistKind,
    /// Base asset symbol; portfolio-wide analyses may leave it empty
    #[serde(default)]
    pub asset: Option<String>,
    #[serde(default)]
    pub question: String,
}

/// Which specialists the strategist wants to hear from, in call order
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ConsultationPlan {
    #[serde(default)]
    pub consults: Vec<ConsultRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TechnicalAssessment {
    pub asset: String,
    /// 1 to 10
    pub score: u8,
    pub reasoning: String,
    /// 1 to 10
    pub entry_quality: u8,
    #[serde(default)]
    pub recommended_limit_price: Option<Decimal>,
    /// 0 to 100
    #[serde(default)]
    pub fill_probability_pct: Option<u8>,
    #[serde(default)]
    pub setup_risks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FundamentalAssessment {
    pub asset: String,
    /// 1 to 10
    pub conviction: u8,
    pub value_assessment: String,
    #[serde(default)]
    pub key_metrics: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Green,
    Yellow,
    Red,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RiskItem {
    pub risk: String,
    /// 1 to 10
    pub severity: u8,
    /// 1 to 10
    pub probability: u8,
    #[serde(default)]
    pub mitigation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RiskAssessment {
    pub overall_level: RiskLevel,
    #[serde(default)]
    pub risks: Vec<RiskItem>,
    pub market_structure_assessment: String,
    pub macro_environment: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SentimentAssessment {
    /// -10 (extreme fear) to 10 (extreme greed)
    pub sentiment_score: i8,
    pub contrarian_opportunity: bool,
    pub crowded_trade_risk: bool,
    #[serde(default)]
    pub fear_greed_index: Option<u8>,
    #[serde(default)]
    pub funding_rate_signal: String,
    #[serde(default)]
    pub social_sentiment: String,
    pub recommendation: String,
}

/// Output of any specialist analyst
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpecialistAssessment {
    Technical(TechnicalAssessment),
    Fundamental(FundamentalAssessment),
    Risk(RiskAssessment),
    Sentiment(SentimentAssessment),
}

// ============================================================================
// Actions, options, decisions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    PlaceLimitBuy,
    PlaceLimitSell,
    PlaceMarketBuy,
    PlaceMarketSell,
    CancelOrder,
    Hold,
}

impl ActionType {
    /// Places a new order
    pub fn is_place(&self) -> bool {
        matches!(
            self,
            ActionType::PlaceLimitBuy
                | ActionType::PlaceLimitSell
                | ActionType::PlaceMarketBuy
                | ActionType::PlaceMarketSell
        )
    }

    pub fn is_limit(&self) -> bool {
        matches!(self, ActionType::PlaceLimitBuy | ActionType::PlaceLimitSell)
    }

    pub fn is_market(&self) -> bool {
        matches!(self, ActionType::PlaceMarketBuy | ActionType::PlaceMarketSell)
    }

    pub fn side(&self) -> Option<Side> {
        match self {
            ActionType::PlaceLimitBuy | ActionType::PlaceMarketBuy => Some(Side::Buy),
            ActionType::PlaceLimitSell | ActionType::PlaceMarketSell => Some(Side::Sell),
            ActionType::CancelOrder | ActionType::Hold => None,
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ActionType::PlaceLimitBuy => "PLACE_LIMIT_BUY",
            ActionType::PlaceLimitSell => "PLACE_LIMIT_SELL",
            ActionType::PlaceMarketBuy => "PLACE_MARKET_BUY",
            ActionType::PlaceMarketSell => "PLACE_MARKET_SELL",
            ActionType::CancelOrder => "CANCEL_ORDER",
            ActionType::Hold => "HOLD",
        };
        write!(f, "{}", name)
    }
}

/// One concrete step of a strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// Base asset symbol, e.g. BTC
    #[serde(default)]
    pub asset: Option<String>,
    /// Limit price in quote currency
    #[serde(default)]
    pub price: Option<Decimal>,
    /// Quote-currency amount of the order
    #[serde(default, alias = "quantity")]
    pub notional_amount: Option<Decimal>,
    /// Target of a cancellation
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub reasoning: String,
}

impl Action {
    fn place(action_type: ActionType, asset: &str, price: Option<Decimal>, notional: Decimal) -> Self {
        Self {
            action_type,
            asset: Some(asset.to_string()),
            price,
            notional_amount: Some(notional),
            order_id: None,
            reasoning: String::new(),
        }
    }

    pub fn limit_buy(asset: &str, price: Decimal, notional: Decimal) -> Self {
        Self::place(ActionType::PlaceLimitBuy, asset, Some(price), notional)
    }

    pub fn limit_sell(asset: &str, price: Decimal, notional: Decimal) -> Self {
        Self::place(ActionType::PlaceLimitSell, asset, Some(price), notional)
    }

    pub fn market_buy(asset: &str, notional: Decimal) -> Self {
        Self::place(ActionType::PlaceMarketBuy, asset, None, notional)
    }

    pub fn market_sell(asset: &str, notional: Decimal) -> Self {
        Self::place(ActionType::PlaceMarketSell, asset, None, notional)
    }

    pub fn cancel(asset: &str, order_id: &str) -> Self {
        Self {
            action_type: ActionType::CancelOrder,
            asset: Some(asset.to_string()),
            price: None,
            notional_amount: None,
            order_id: Some(order_id.to_string()),
            reasoning: String::new(),
        }
    }

    pub fn hold(reasoning: &str) -> Self {
        Self {
            action_type: ActionType::Hold,
            asset: None,
            price: None,
            notional_amount: None,
            order_id: None,
            reasoning: reasoning.to_string(),
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    /// Notional of a placement, zero for anything else
    pub fn placed_notional(&self) -> Decimal {
        if self.action_type.is_place() {
            self.notional_amount.unwrap_or_default()
        } else {
            Decimal::ZERO
        }
    }

    /// Base asset key normalized against the quote currency
    ///
    /// `btc`, `BTC` and `BTCUSDT` all map to `BTC` when the quote is `USDT`.
    pub fn asset_key(&self, quote_asset: &str) -> Option<String> {
        self.asset.as_deref().map(|a| asset_key(a, quote_asset))
    }
}

/// Uppercase a symbol and strip a trailing quote currency
pub fn asset_key(raw: &str, quote_asset: &str) -> String {
    let upper = raw.trim().to_uppercase();
    let quote = quote_asset.to_uppercase();
    match upper.strip_suffix(&quote) {
        Some(base) if !base.is_empty() => base.to_string(),
        _ => upper,
    }
}

/// Sum of placement notionals in an action list
pub fn total_placed_notional(actions: &[Action]) -> Decimal {
    actions
        .iter()
        .map(Action::placed_notional)
        .fold(Decimal::ZERO, |acc, n| acc.saturating_add(n))
}

/// One mutually exclusive strategic alternative
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct StrategyOption {
    /// Short name, e.g. "Conservative hold"
    pub strategy: String,
    /// Percent of available capital per base asset, each 0 to 100
    #[serde(default)]
    pub allocations: BTreeMap<String, Decimal>,
    #[serde(default)]
    pub actions: Vec<Action>,
    /// 1 to 10
    pub conviction: u8,
    pub rationale: String,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub expected_outcome: String,
}

impl StrategyOption {
    pub fn total_allocation_pct(&self) -> Decimal {
        self.allocations.values().copied().sum()
    }

    /// Capital this option may deploy given the free quote balance
    pub fn allocation_budget(&self, available_capital: Decimal) -> Decimal {
        self.total_allocation_pct() / Decimal::ONE_HUNDRED * available_capital
    }

    pub fn placed_notional(&self) -> Decimal {
        total_placed_notional(&self.actions)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct StrategyOptions {
    /// 3 to 5 options
    pub options: Vec<StrategyOption>,
    /// Index into `options`
    pub recommended_option: usize,
    /// At most 500 characters
    #[serde(default)]
    pub market_summary: String,
}

impl StrategyOptions {
    pub fn get(&self, index: usize) -> Option<&StrategyOption> {
        self.options.get(index)
    }
}

/// The selected option turned into concrete actions
///
/// Owns its actions. Later changes to the options cannot alter an issued decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TradingDecision {
    pub selected_option: usize,
    #[serde(default)]
    pub actions: Vec<Action>,
    pub plan: String,
    pub reasoning: String,
    #[serde(default)]
    pub risk_assessment: String,
}

impl TradingDecision {
    pub fn placed_notional(&self) -> Decimal {
        total_placed_notional(&self.actions)
    }

    /// True when nothing would be sent to the exchange
    pub fn is_hold(&self) -> bool {
        self.actions.iter().all(|a| a.action_type == ActionType::Hold)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerificationStatus {
    Pass,
    Issues,
}

/// Advisory audit of a decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct VerificationResult {
    #[serde(alias = "consistency_check")]
    pub status: VerificationStatus,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

// ============================================================================
// Tagged output
// ============================================================================

/// Any validated oracle output, tagged by the role that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", content = "output", rename_all = "snake_case")]
pub enum OracleOutput {
    ResearchPlan(ResearchPlan),
    ResearchSummary(ResearchSummary),
    ConsultationPlan(ConsultationPlan),
    Technical(TechnicalAssessment),
    Fundamental(FundamentalAssessment),
    Risk(RiskAssessment),
    Sentiment(SentimentAssessment),
    StrategyOptions(StrategyOptions),
    Decision(TradingDecision),
    Verification(VerificationResult),
}

impl OracleOutput {
    /// The role whose contract this output fulfils
    pub fn role(&self) -> Role {
        match self {
            OracleOutput::ResearchPlan(_) => Role::Planner,
            OracleOutput::ResearchSummary(_) => Role::Researcher,
            OracleOutput::ConsultationPlan(_) => Role::Consultation,
            OracleOutput::Technical(_) => Role::TechnicalAnalyst,
            OracleOutput::Fundamental(_) => Role::FundamentalAnalyst,
            OracleOutput::Risk(_) => Role::RiskAnalyst,
            OracleOutput::Sentiment(_) => Role::SentimentAnalyst,
            OracleOutput::StrategyOptions(_) => Role::Strategist,
            OracleOutput::Decision(_) => Role::Selector,
            OracleOutput::Verification(_) => Role::Verifier,
        }
    }

    /// Deserialize raw JSON according to the contract of `role`
    pub fn parse(role: Role, json: &str) -> Result<Self, OracleError> {
        let output = match role {
            Role::Planner => OracleOutput::ResearchPlan(serde_json::from_str(json)?),
            Role::Researcher => OracleOutput::ResearchSummary(serde_json::from_str(json)?),
            Role::Consultation => OracleOutput::ConsultationPlan(serde_json::from_str(json)?),
            Role::TechnicalAnalyst => OracleOutput::Technical(serde_json::from_str(json)?),
            Role::FundamentalAnalyst => OracleOutput::Fundamental(serde_json::from_str(json)?),
            Role::RiskAnalyst => OracleOutput::Risk(serde_json::from_str(json)?),
            Role::SentimentAnalyst => OracleOutput::Sentiment(serde_json::from_str(json)?),
            Role::Strategist => OracleOutput::StrategyOptions(serde_json::from_str(json)?),
            Role::Selector => OracleOutput::Decision(serde_json::from_str(json)?),
            Role::Verifier => OracleOutput::Verification(serde_json::from_str(json)?),
        };
        Ok(output)
    }

    /// Specialist outputs as a [`SpecialistAssessment`]
    pub fn into_specialist(self) -> Result<SpecialistAssessment, OracleError> {
        match self {
            OracleOutput::Technical(a) => Ok(SpecialistAssessment::Technical(a)),
            OracleOutput::Fundamental(a) => Ok(SpecialistAssessment::Fundamental(a)),
            OracleOutput::Risk(a) => Ok(SpecialistAssessment::Risk(a)),
            OracleOutput::Sentiment(a) => Ok(SpecialistAssessment::Sentiment(a)),
            other => Err(OracleError::RoleMismatch {
                expected: "specialist assessment",
                got: other.role(),
            }),
        }
    }
}

macro_rules! impl_output_conversion {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl TryFrom<OracleOutput> for $ty {
                type Error = OracleError;

                fn try_from(output: OracleOutput) -> Result<Self, Self::Error> {
                    match output {
                        OracleOutput::$variant(inner) => Ok(inner),
                        other => Err(OracleError::RoleMismatch {
                            expected: stringify!($ty),
                            got: other.role(),
                        }),
                    }
                }
            }
        )*
    };
}

impl_output_conversion! {
    ResearchPlan => ResearchPlan,
    ResearchSummary => ResearchSummary,
    ConsultationPlan => ConsultationPlan,
    StrategyOptions => StrategyOptions,
    Decision => TradingDecision,
    Verification => VerificationResult,
}
