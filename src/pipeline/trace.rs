//! Per-cycle trace of every stage's output

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::research::DroppedQuery;
use super::strategist::SpecialistCall;
use crate::common::errors::Result;
use crate::execution::ExecutionResult;
use crate::market::MarketContext;
use crate::oracle::{ConsultationPlan, ResearchPlan, ResearchSummary, StrategyOptions, TradingDecision, VerificationResult};
use crate::risk::GuardrailOutcome;

/// Everything a cycle saw and produced, for offline review
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleTrace {
    pub cycle_id: Uuid,
    pub started_at: Option<DateTime<Utc>>,
    pub context: Option<MarketContext>,
    pub research_plan: Option<ResearchPlan>,
    #[serde(default)]
    pub research: Vec<ResearchSummary>,
    #[serde(default)]
    pub dropped_queries: Vec<DroppedQuery>,
    pub consultation: Option<ConsultationPlan>,
    #[serde(default)]
    pub specialist_calls: Vec<SpecialistCall>,
    pub options: Option<StrategyOptions>,
    pub decision: Option<TradingDecision>,
    pub guardrail: Option<GuardrailOutcome>,
    pub verification: Option<VerificationResult>,
    #[serde(default)]
    pub execution_results: Vec<ExecutionResult>,
    pub error: Option<String>,
}

impl CycleTrace {
    pub fn new(cycle_id: Uuid) -> Self {
        Self {
            cycle_id,
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn file_name(&self) -> String {
        format!("trace_{}.json", self.cycle_id)
    }

    /// Write the trace as pretty JSON into `dir`
    pub async fn write(&self, dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(self.file_name());
        tokio::fs::write(&path, serde_json::to_string_pretty(self)?).await?;
        Ok(path)
    }
}
