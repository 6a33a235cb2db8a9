//! Research planning and best-effort concurrent fan-out

use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::common::errors::{DcaError, Result};
use crate::market::MarketContext;
use crate::oracle::{invoke_typed, Oracle, OracleError, ResearchPlan, ResearchQuery, ResearchSummary, Role};

/// A query that produced no summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedQuery {
    pub query: String,
    pub reason: String,
}

/// Everything the research stage produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchOutcome {
    pub plan: ResearchPlan,
    /// Sorted by recency, freshest first
    pub summaries: Vec<ResearchSummary>,
    pub dropped: Vec<DroppedQuery>,
}

pub struct ResearchStage {
    oracle: Arc<dyn Oracle>,
    query_timeout: Duration,
    plan_timeout: Duration,
}

impl ResearchStage {
    pub fn new(oracle: Arc<dyn Oracle>, query_timeout: Duration, plan_timeout: Duration) -> Self {
        Self {
            oracle,
            query_timeout,
            plan_timeout,
        }
    }

    /// Plan queries, then answer them concurrently
    #[instrument(skip(self, context))]
    pub async fn run(&self, context: &MarketContext) -> Result<ResearchOutcome> {
        let plan = self.plan(context).await?;
        info!(
            "Research plan: {} queries ({})",
            plan.searches.len(),
            plan.strategy_hint
        );
        let (summaries, dropped) = self.fan_out(context, &plan.searches).await?;
        Ok(ResearchOutcome {
            plan,
            summaries,
            dropped,
        })
    }

    /// Ask the planner role for a research plan
    pub async fn plan(&self, context: &MarketContext) -> Result<ResearchPlan> {
        let input = json!({ "market_context": context.to_value() });
        match timeout(
            self.plan_timeout,
            invoke_typed::<ResearchPlan>(self.oracle.as_ref(), Role::Planner, &input),
        )
        .await
        {
            Ok(result) => result.map_err(|e| DcaError::oracle(Role::Planner, e)),
            Err(_) => Err(DcaError::oracle(Role::Planner, OracleError::Timeout)),
        }
    }

    /// Issue every query as an independent oracle call
    ///
    /// Failed or timed-out queries are dropped without retry. The call fails
    /// only when no query succeeds.
    pub async fn fan_out(
        &self,
        context: &MarketContext,
        queries: &[ResearchQuery],
    ) -> Result<(Vec<ResearchSummary>, Vec<DroppedQuery>)> {
        let market = context.to_value();
        let mut pending: FuturesUnordered<_> = queries
            .iter()
            .map(|query| {
                let oracle = Arc::clone(&self.oracle);
                let input = json!({
                    "query": query,
                    "market_context": market,
                });
                let limit = self.query_timeout;
                async move {
                    let result = timeout(
                        limit,
                        invoke_typed::<ResearchSummary>(oracle.as_ref(), Role::Researcher, &input),
                    )
                    .await;
                    (query, result)
                }
            })
            .collect();

        let mut summaries = Vec::with_capacity(queries.len());
        let mut dropped = Vec::new();
        while let Some((query, result)) = pending.next().await {
            let reason = match result {
                Ok(Ok(summary)) => {
                    debug!("Research done: {}", query.query);
                    summaries.push(summary);
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("timed out after {}s", self.query_timeout.as_secs()),
            };
            warn!("Dropping research query '{}': {}", query.query, reason);
            dropped.push(DroppedQuery {
                query: query.query.clone(),
                reason,
            });
        }

        if summaries.is_empty() {
            return Err(DcaError::DataUnavailable(format!(
                "all {} research queries failed",
                queries.len()
            )));
        }

        sort_by_recency(&mut summaries);
        info!(
            "Research complete: {} of {} queries succeeded",
            summaries.len(),
            queries.len()
        );
        Ok((summaries, dropped))
    }
}

/// Freshest first; ties broken by query text so the order is deterministic
pub fn sort_by_recency(summaries: &mut [ResearchSummary]) {
    summaries.sort_by(|a, b| {
        b.recency_score
            .cmp(&a.recency_score)
            .then_with(|| a.query.cmp(&b.query))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(query: &str, recency: u8) -> ResearchSummary {
        ResearchSummary {
            query: query.into(),
            summary: "text".into(),
            key_metrics: vec![],
            implications: "none".into(),
            recency_score: recency,
        }
    }

    #[test]
    fn test_sort_is_deterministic() {
        let mut a = vec![summary("b", 5), summary("a", 9), summary("a", 5)];
        let mut b = vec![summary("a", 5), summary("b", 5), summary("a", 9)];
        sort_by_recency(&mut a);
        sort_by_recency(&mut b);
        assert_eq!(a, b);
        assert_eq!(a[0].recency_score, 9);
        assert_eq!(a[1].query, "a");
    }
}
