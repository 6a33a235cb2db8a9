//! Stage-level tests: research fan-out, strategist consultations, and the
//! selector/guardrail join

mod common;

use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use dca_sentinel::market::ContextBuilder;
use dca_sentinel::oracle::{
    Action, ConsultationPlan, OracleOutput, SpecialistAssessment, SpecialistKind,
};
use dca_sentinel::pipeline::{DecisionStage, DecisionState, ResearchStage, SpecialistOutcome, Strategist};
use dca_sentinel::{DcaError, Guardrail, MarketContext, Role, Violation};

const QUERY_TIMEOUT: Duration = Duration::from_secs(5);
const STAGE_TIMEOUT: Duration = Duration::from_secs(10);

async fn context(exchange: InMemoryExchange) -> MarketContext {
    ContextBuilder::new(Arc::new(exchange), test_config().pipeline)
        .build(None, None)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_context_carries_order_book_spread() {
    let ctx = context(InMemoryExchange::new(dec!(1000))).await;

    let btc = &ctx.markets["BTC"];
    assert_eq!(btc.order_book.midpoint(), Some(dec!(90000)));
    assert_eq!(btc.spread_pct, Some(dec!(2) / dec!(90000) * dec!(100)));
}

// ============================================================================
// Research fan-out
// ============================================================================

#[tokio::test]
async fn test_fan_out_returns_k_minus_f_summaries() {
    let queries = ["q1", "q2", "q3", "q4", "q5"];
    let mut oracle = ScriptedOracle::happy(&queries, standard_options(), decision(0, vec![]));
    oracle = oracle
        .on_query("q2", Reply::Fail("rate limited".into()))
        .on_query("q4", Reply::Fail("schema".into()));
    let stage = ResearchStage::new(Arc::new(oracle), QUERY_TIMEOUT, STAGE_TIMEOUT);
    let ctx = context(InMemoryExchange::new(dec!(1000))).await;

    let outcome = stage.run(&ctx).await.unwrap();

    assert_eq!(outcome.summaries.len(), 3);
    assert_eq!(outcome.dropped.len(), 2);
    let mut dropped: Vec<&str> = outcome.dropped.iter().map(|d| d.query.as_str()).collect();
    dropped.sort();
    assert_eq!(dropped, vec!["q2", "q4"]);

    // Freshest first
    let recency: Vec<u8> = outcome.summaries.iter().map(|s| s.recency_score).collect();
    assert_eq!(recency, vec![5, 3, 1]);
}

#[tokio::test(start_paused = true)]
async fn test_fan_out_drops_timed_out_queries() {
    let oracle = ScriptedOracle::happy(&["fast", "slow"], standard_options(), decision(0, vec![]))
        .on_query("slow", Reply::Hang);
    let stage = ResearchStage::new(Arc::new(oracle), QUERY_TIMEOUT, STAGE_TIMEOUT);
    let ctx = context(InMemoryExchange::new(dec!(1000))).await;

    let outcome = stage.run(&ctx).await.unwrap();

    assert_eq!(outcome.summaries.len(), 1);
    assert_eq!(outcome.summaries[0].query, "fast");
    assert_eq!(outcome.dropped[0].reason, "timed out after 5s");
}

#[tokio::test]
async fn test_fan_out_with_no_success_is_data_unavailable() {
    let oracle = ScriptedOracle::new().on(Role::Researcher, Reply::Fail("down".into()));
    let stage = ResearchStage::new(Arc::new(oracle), QUERY_TIMEOUT, STAGE_TIMEOUT);
    let ctx = context(InMemoryExchange::new(dec!(1000))).await;

    let result = stage.fan_out(&ctx, &research_plan(&["a", "b", "c"]).searches).await;

    assert!(matches!(result, Err(DcaError::DataUnavailable(msg)) if msg == "all 3 research queries failed"));
}

// ============================================================================
// Strategist
// ============================================================================

#[tokio::test]
async fn test_strategist_records_specialist_calls() {
    let plan = ConsultationPlan {
        consults: vec![
            consult(SpecialistKind::Technical, "BTC"),
            consult(SpecialistKind::Fundamental, "BTC"),
        ],
    };
    let oracle = Arc::new(
        ScriptedOracle::new()
            .on(Role::Consultation, Reply::Output(OracleOutput::ConsultationPlan(plan)))
            .on(Role::TechnicalAnalyst, Reply::Output(OracleOutput::Technical(technical_assessment("BTC"))))
            .on(Role::FundamentalAnalyst, Reply::Fail("overloaded".into()))
            .on(Role::Strategist, Reply::Output(OracleOutput::StrategyOptions(standard_options()))),
    );
    let strategist = Strategist::new(oracle.clone(), STAGE_TIMEOUT);
    let ctx = context(InMemoryExchange::new(dec!(1000))).await;

    let run = strategist.run(&ctx, &[research_summary("etf flows", 8)]).await.unwrap();

    assert_eq!(run.options, standard_options());
    assert_eq!(run.consultations.len(), 2);
    assert_eq!(
        run.consultations[0].outcome,
        SpecialistOutcome::Completed {
            assessment: SpecialistAssessment::Technical(technical_assessment("BTC"))
        }
    );
    assert!(matches!(
        &run.consultations[1].outcome,
        SpecialistOutcome::Failed { error } if error == "API request failed: overloaded"
    ));

    // Only the completed assessment reaches the strategist
    let calls = oracle.calls();
    let (_, input) = calls.iter().find(|(role, _)| *role == Role::Strategist).unwrap();
    assert_eq!(input["specialist_assessments"].as_array().unwrap().len(), 1);
    assert_eq!(input["research"][0]["query"], "etf flows");
}

#[tokio::test]
async fn test_strategist_survives_consultation_failure() {
    let oracle = ScriptedOracle::new()
        .on(Role::Consultation, Reply::Fail("overloaded".into()))
        .on(Role::Strategist, Reply::Output(OracleOutput::StrategyOptions(standard_options())));
    let strategist = Strategist::new(Arc::new(oracle), STAGE_TIMEOUT);
    let ctx = context(InMemoryExchange::new(dec!(1000))).await;

    let run = strategist.run(&ctx, &[]).await.unwrap();

    assert!(run.consultation.consults.is_empty());
    assert!(run.consultations.is_empty());
}

// ============================================================================
// Selector and guardrail
// ============================================================================

fn decision_stage(oracle: ScriptedOracle) -> DecisionStage {
    DecisionStage::new(Arc::new(oracle), Guardrail::new(test_config().limits), STAGE_TIMEOUT)
}

#[tokio::test]
async fn test_selected_option_approved() {
    let chosen = decision(1, vec![Action::limit_buy("BTC", dec!(89000), dec!(200))]);
    let stage = decision_stage(ScriptedOracle::new().on(Role::Selector, Reply::Output(OracleOutput::Decision(chosen))));
    let ctx = context(InMemoryExchange::new(dec!(1000))).await;

    let outcome = stage.decide(&ctx, &standard_options()).await.unwrap();

    assert!(outcome.is_approved());
    assert_eq!(outcome.state, DecisionState::Approved);
    assert!(!outcome.reevaluated);
}

#[tokio::test]
async fn test_changed_actions_are_reevaluated() {
    // Option 1 is compliant, but the decision moved its bid above market
    let chosen = decision(1, vec![Action::limit_buy("BTC", dec!(91000), dec!(200))]);
    let stage = decision_stage(ScriptedOracle::new().on(Role::Selector, Reply::Output(OracleOutput::Decision(chosen))));
    let ctx = context(InMemoryExchange::new(dec!(1000))).await;

    let outcome = stage.decide(&ctx, &standard_options()).await.unwrap();

    assert!(outcome.reevaluated);
    assert_eq!(outcome.state, DecisionState::Blocked);
    assert_eq!(
        outcome.guardrail.violations(),
        &[Violation::BuyAboveMarket {
            asset: "BTC".into(),
            price: dec!(91000),
            market: dec!(90000),
        }]
    );
}

#[tokio::test]
async fn test_selected_option_out_of_range() {
    let chosen = decision(7, vec![]);
    let stage = decision_stage(ScriptedOracle::new().on(Role::Selector, Reply::Output(OracleOutput::Decision(chosen))));
    let ctx = context(InMemoryExchange::new(dec!(1000))).await;

    let err = stage.decide(&ctx, &standard_options()).await.unwrap_err();

    assert!(err.is_schema_violation());
    assert!(err.to_string().contains("selected_option 7 out of range (0..3)"));
}
