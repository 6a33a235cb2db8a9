//! Common test utilities and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use dca_sentinel::common::types::{Kline, MarketOrderSize, PriceLevel, Ticker};
use dca_sentinel::oracle::{
    Action, ConsultRequest, ConsultationPlan, OracleOutput, ResearchCategory, ResearchPlan, ResearchQuery,
    ResearchSummary, SpecialistKind, StrategyOption, StrategyOptions, TechnicalAssessment, TradingDecision,
    VerificationResult, VerificationStatus,
};
use dca_sentinel::{
    AppConfig, Balance, DcaError, Exchange, Notifier, OpenOrder, OrderAck, OrderBook, Oracle, OracleError, Result,
    Role, Session, SessionStore, Side, SymbolFilters,
};

/// BTC/USDT trading rules used across tests
pub static BTC_FILTERS: Lazy<SymbolFilters> = Lazy::new(|| SymbolFilters {
    tick_size: dec!(0.01),
    min_price: dec!(0.01),
    max_price: dec!(1000000),
    step_size: dec!(0.00001),
    min_qty: dec!(0.00001),
    max_qty: dec!(9000),
    min_notional: dec!(5),
});

pub const BTC_PRICE: Decimal = dec!(90000);

/// Single-asset DryRun configuration with fast timeouts
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.pipeline.assets = vec!["BTC".to_string()];
    config.pipeline.quote_asset = "USDT".to_string();
    config.pipeline.research_timeout_seconds = 5;
    config.pipeline.stage_timeout_seconds = 10;
    config.session.save_trace = false;
    config
}

// ============================================================================
// Scripted oracle
// ============================================================================

/// What a scripted role answers
#[derive(Debug, Clone)]
pub enum Reply {
    Output(OracleOutput),
    Fail(String),
    /// Never answers; the caller's timeout decides
    Hang,
}

/// Oracle double answering from a per-role script and recording every call
#[derive(Default)]
pub struct ScriptedOracle {
    replies: HashMap<Role, Reply>,
    research: HashMap<String, Reply>,
    calls: Mutex<Vec<(Role, Value)>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, role: Role, reply: Reply) -> Self {
        self.replies.insert(role, reply);
        self
    }

    /// Override the researcher's reply for one query text
    pub fn on_query(mut self, query: &str, reply: Reply) -> Self {
        self.research.insert(query.to_string(), reply);
        self
    }

    pub fn calls(&self) -> Vec<(Role, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, role: Role) -> usize {
        self.calls.lock().unwrap().iter().filter(|(r, _)| *r == role).count()
    }

    /// A full happy-path script around the given options and decision
    pub fn happy(queries: &[&str], options: StrategyOptions, decision: TradingDecision) -> Self {
        let mut oracle = Self::new()
            .on(Role::Planner, Reply::Output(OracleOutput::ResearchPlan(research_plan(queries))))
            .on(Role::Consultation, Reply::Output(OracleOutput::ConsultationPlan(ConsultationPlan::default())))
            .on(Role::Strategist, Reply::Output(OracleOutput::StrategyOptions(options)))
            .on(Role::Selector, Reply::Output(OracleOutput::Decision(decision)))
            .on(Role::Verifier, Reply::Output(OracleOutput::Verification(clean_verification())));
        for (i, query) in queries.iter().enumerate() {
            let summary = research_summary(query, (i % 10) as u8 + 1);
            oracle = oracle.on_query(query, Reply::Output(OracleOutput::ResearchSummary(summary)));
        }
        oracle
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn invoke(&self, role: Role, context: &Value) -> std::result::Result<OracleOutput, OracleError> {
        self.calls.lock().unwrap().push((role, context.clone()));

        let reply = if role == Role::Researcher {
            context["query"]["query"]
                .as_str()
                .and_then(|q| self.research.get(q))
                .or_else(|| self.replies.get(&role))
                .cloned()
        } else {
            self.replies.get(&role).cloned()
        };

        match reply {
            Some(Reply::Output(output)) => Ok(output),
            Some(Reply::Fail(message)) => Err(OracleError::Api(message)),
            Some(Reply::Hang) => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Err(OracleError::Timeout)
            }
            None => Err(OracleError::Api(format!("no script for {}", role))),
        }
    }
}

pub fn research_plan(queries: &[&str]) -> ResearchPlan {
    ResearchPlan {
        searches: queries
            .iter()
            .map(|q| ResearchQuery {
                query: q.to_string(),
                reason: "context".into(),
                priority: 3,
                category: ResearchCategory::Macro,
            })
            .collect(),
        strategy_hint: "accumulate on weakness".into(),
    }
}

pub fn research_summary(query: &str, recency: u8) -> ResearchSummary {
    ResearchSummary {
        query: query.to_string(),
        summary: format!("findings for {}", query),
        key_metrics: vec![],
        implications: "neutral".into(),
        recency_score: recency,
    }
}

pub fn clean_verification() -> VerificationResult {
    VerificationResult {
        status: VerificationStatus::Pass,
        issues: vec![],
        recommendations: vec![],
        summary: "consistent".into(),
    }
}

pub fn technical_assessment(asset: &str) -> TechnicalAssessment {
    TechnicalAssessment {
        asset: asset.to_string(),
        score: 6,
        reasoning: "holding support".into(),
        entry_quality: 7,
        recommended_limit_price: Some(dec!(89000)),
        fill_probability_pct: Some(60),
        setup_risks: vec![],
    }
}

pub fn consult(kind: SpecialistKind, asset: &str) -> ConsultRequest {
    ConsultRequest {
        kind,
        asset: Some(asset.to_string()),
        question: "entry quality?".into(),
    }
}

pub fn option(name: &str, conviction: u8, btc_pct: Decimal, actions: Vec<Action>) -> StrategyOption {
    let mut allocations = BTreeMap::new();
    if btc_pct > Decimal::ZERO {
        allocations.insert("BTC".to_string(), btc_pct);
    }
    StrategyOption {
        strategy: name.to_string(),
        allocations,
        actions,
        conviction,
        rationale: format!("{} rationale", name),
        risks: vec![],
        expected_outcome: String::new(),
    }
}

/// Hold / 20% limit buy / 50% market buy, against 1000 USDT free
pub fn standard_options() -> StrategyOptions {
    StrategyOptions {
        options: vec![
            option("Hold", 4, Decimal::ZERO, vec![Action::hold("wait for confirmation")]),
            option("Accumulate", 7, dec!(20), vec![Action::limit_buy("BTC", dec!(89000), dec!(200))]),
            option("Aggressive", 5, dec!(50), vec![Action::market_buy("BTC", dec!(500))]),
        ],
        recommended_option: 1,
        market_summary: "range-bound below 92k".into(),
    }
}

pub fn decision(selected: usize, actions: Vec<Action>) -> TradingDecision {
    TradingDecision {
        selected_option: selected,
        actions,
        plan: "ladder bids below spot".into(),
        reasoning: "price is holding the weekly range".into(),
        risk_assessment: "moderate".into(),
    }
}

// ============================================================================
// In-memory exchange
// ============================================================================

/// An order the exchange double accepted
#[derive(Debug, Clone, PartialEq)]
pub enum PlacedOrder {
    Limit { pair: String, side: Side, price: Decimal, quantity: Decimal },
    Market { pair: String, side: Side, size: MarketOrderSize },
}

/// Exchange double with fixed market data that records every order call
pub struct InMemoryExchange {
    pub balances: Vec<Balance>,
    pub prices: BTreeMap<String, Decimal>,
    pub open_orders: Vec<OpenOrder>,
    pub filters: SymbolFilters,
    pub fail_balances: bool,
    pub reject_orders: bool,
    /// Delay applied to every limit placement
    pub place_delay: Option<Duration>,
    placed: Mutex<Vec<PlacedOrder>>,
    cancelled: Mutex<Vec<String>>,
    data_calls: Mutex<usize>,
}

impl InMemoryExchange {
    pub fn new(free_usdt: Decimal) -> Self {
        Self {
            balances: vec![Balance::new("USDT", free_usdt, Decimal::ZERO)],
            prices: BTreeMap::from([("BTC".to_string(), BTC_PRICE)]),
            open_orders: vec![],
            filters: BTC_FILTERS.clone(),
            fail_balances: false,
            reject_orders: false,
            place_delay: None,
            placed: Mutex::new(vec![]),
            cancelled: Mutex::new(vec![]),
            data_calls: Mutex::new(0),
        }
    }

    pub fn with_open_order(mut self, order_id: &str, price: Decimal, quantity: Decimal) -> Self {
        self.open_orders.push(OpenOrder {
            order_id: order_id.to_string(),
            asset: "BTC".to_string(),
            side: Side::Buy,
            price,
            quantity,
            time_placed: Utc::now(),
        });
        self
    }

    pub fn placed(&self) -> Vec<PlacedOrder> {
        self.placed.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }

    fn price_of(&self, pair: &str) -> Result<Decimal> {
        let asset = pair.trim_end_matches("USDT");
        self.prices
            .get(asset)
            .copied()
            .ok_or_else(|| DcaError::Exchange { code: -1121, message: format!("Invalid symbol {}", pair) })
    }

    fn bump(&self) {
        *self.data_calls.lock().unwrap() += 1;
    }
}

/// 96 hourly candles oscillating around `price`
pub fn sample_klines(price: Decimal) -> Vec<Kline> {
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
    (0..96)
        .map(|i| {
            let offset = Decimal::from(i % 7 - 3) * price / dec!(1000);
            let close = price + offset;
            Kline {
                open_time: start + ChronoDuration::hours(i),
                open: close,
                high: close + dec!(10),
                low: close - dec!(10),
                close,
                volume: dec!(12.5),
            }
        })
        .collect()
}

#[async_trait]
impl Exchange for InMemoryExchange {
    async fn get_balances(&self) -> Result<Vec<Balance>> {
        self.bump();
        if self.fail_balances {
            return Err(DcaError::InvalidResponse("Binance API returned status 503: unavailable".into()));
        }
        Ok(self.balances.clone())
    }

    async fn get_ticker(&self, pair: &str) -> Result<Ticker> {
        self.bump();
        let price = self.price_of(pair)?;
        Ok(Ticker {
            pair: pair.to_string(),
            last_price: price,
            price_change_pct: dec!(-1.5),
            high: price + dec!(500),
            low: price - dec!(500),
            volume: dec!(1000),
        })
    }

    async fn get_klines(&self, pair: &str, _interval: &str, _limit: u32) -> Result<Vec<Kline>> {
        self.bump();
        Ok(sample_klines(self.price_of(pair)?))
    }

    async fn get_order_book(&self, pair: &str, _depth: u32) -> Result<OrderBook> {
        self.bump();
        let price = self.price_of(pair)?;
        Ok(OrderBook {
            pair: pair.to_string(),
            bids: vec![PriceLevel::new(price - dec!(1), dec!(0.5))],
            asks: vec![PriceLevel::new(price + dec!(1), dec!(0.5))],
            timestamp: Utc::now(),
        })
    }

    async fn get_open_orders(&self, _pairs: &[String]) -> Result<Vec<OpenOrder>> {
        self.bump();
        Ok(self.open_orders.clone())
    }

    async fn get_symbol_filters(&self, _pair: &str) -> Result<SymbolFilters> {
        Ok(self.filters.clone())
    }

    async fn place_limit_order(&self, pair: &str, side: Side, price: Decimal, quantity: Decimal) -> Result<OrderAck> {
        if let Some(delay) = self.place_delay {
            tokio::time::sleep(delay).await;
        }
        if self.reject_orders {
            return Err(DcaError::Exchange { code: -2010, message: "Account has insufficient balance".into() });
        }
        let mut placed = self.placed.lock().unwrap();
        placed.push(PlacedOrder::Limit { pair: pair.to_string(), side, price, quantity });
        Ok(OrderAck {
            order_id: format!("{}", 1000 + placed.len()),
            pair: pair.to_string(),
            status: "NEW".into(),
            executed_qty: Decimal::ZERO,
            cumulative_quote_qty: Decimal::ZERO,
            fee: Decimal::ZERO,
        })
    }

    async fn place_market_order(&self, pair: &str, side: Side, size: MarketOrderSize) -> Result<OrderAck> {
        if self.reject_orders {
            return Err(DcaError::Exchange { code: -2010, message: "Account has insufficient balance".into() });
        }
        let price = self.price_of(pair)?;
        let (qty, quote) = match size {
            MarketOrderSize::Quote(amount) => ((amount / price).round_dp(5), amount),
            MarketOrderSize::Base(qty) => (qty, qty * price),
        };
        let mut placed = self.placed.lock().unwrap();
        placed.push(PlacedOrder::Market { pair: pair.to_string(), side, size });
        Ok(OrderAck {
            order_id: format!("{}", 1000 + placed.len()),
            pair: pair.to_string(),
            status: "FILLED".into(),
            executed_qty: qty,
            cumulative_quote_qty: quote,
            fee: quote * dec!(0.001),
        })
    }

    async fn cancel_order(&self, _pair: &str, order_id: &str) -> Result<()> {
        self.cancelled.lock().unwrap().push(order_id.to_string());
        Ok(())
    }
}

// ============================================================================
// Recording store and notifier
// ============================================================================

#[derive(Default)]
pub struct RecordingStore {
    sessions: Mutex<Vec<Session>>,
}

impl RecordingStore {
    pub fn sessions(&self) -> Vec<Session> {
        self.sessions.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionStore for RecordingStore {
    async fn append(&self, session: &Session) -> Result<()> {
        self.sessions.lock().unwrap().push(session.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str) -> Result<()> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}
