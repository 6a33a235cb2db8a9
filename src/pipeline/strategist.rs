//! Strategy option generation with recorded specialist consultations

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, instrument, warn};

use crate::common::errors::{DcaError, Result};
use crate::market::MarketContext;
use crate::oracle::{
    invoke_checked, invoke_typed, ConsultRequest, ConsultationPlan, Oracle, OracleError, ResearchSummary, Role,
    SpecialistAssessment, SpecialistKind, StrategyOptions,
};

/// Result of one specialist call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SpecialistOutcome {
    Completed { assessment: SpecialistAssessment },
    Failed { error: String },
}

/// Record of a specialist the strategist chose to consult
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialistCall {
    pub kind: SpecialistKind,
    pub asset: Option<String>,
    pub outcome: SpecialistOutcome,
}

impl SpecialistCall {
    pub fn assessment(&self) -> Option<&SpecialistAssessment> {
        match &self.outcome {
            SpecialistOutcome::Completed { assessment } => Some(assessment),
            SpecialistOutcome::Failed { .. } => None,
        }
    }
}

/// Strategist stage output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRun {
    pub consultation: ConsultationPlan,
    pub consultations: Vec<SpecialistCall>,
    pub options: StrategyOptions,
}

pub struct Strategist {
    oracle: Arc<dyn Oracle>,
    stage_timeout: Duration,
}

impl Strategist {
    pub fn new(oracle: Arc<dyn Oracle>, stage_timeout: Duration) -> Self {
        Self { oracle, stage_timeout }
    }

    /// Consult specialists, then produce 3-5 strategy options
    #[instrument(skip(self, context, research))]
    pub async fn run(&self, context: &MarketContext, research: &[ResearchSummary]) -> Result<StrategyRun> {
        let base = json!({
            "market_context": context.to_value(),
            "available_capital": context.available_capital(),
            "research": research,
        });

        let consultation = self.consultation_plan(&base).await;
        let mut consultations = Vec::with_capacity(consultation.consults.len());
        for request in &consultation.consults {
            consultations.push(self.consult(request, &base).await);
        }

        let assessments: Vec<&SpecialistAssessment> =
            consultations.iter().filter_map(SpecialistCall::assessment).collect();
        let input = json!({
            "market_context": base["market_context"],
            "available_capital": base["available_capital"],
            "research": base["research"],
            "specialist_assessments": assessments,
        });

        let options = match timeout(
            self.stage_timeout,
            invoke_typed::<StrategyOptions>(self.oracle.as_ref(), Role::Strategist, &input),
        )
        .await
        {
            Ok(result) => result.map_err(|e| DcaError::oracle(Role::Strategist, e))?,
            Err(_) => return Err(DcaError::oracle(Role::Strategist, OracleError::Timeout)),
        };

        info!(
            "Strategist produced {} options, recommends #{}",
            options.options.len(),
            options.recommended_option
        );
        Ok(StrategyRun {
            consultation,
            consultations,
            options,
        })
    }

    /// Which specialists to hear from; a failure means none
    async fn consultation_plan(&self, base: &Value) -> ConsultationPlan {
        match timeout(
            self.stage_timeout,
            invoke_typed::<ConsultationPlan>(self.oracle.as_ref(), Role::Consultation, base),
        )
        .await
        {
            Ok(Ok(plan)) => plan,
            Ok(Err(e)) => {
                warn!("Consultation planning failed, continuing without specialists: {}", e);
                ConsultationPlan::default()
            }
            Err(_) => {
                warn!("Consultation planning timed out, continuing without specialists");
                ConsultationPlan::default()
            }
        }
    }

    async fn consult(&self, request: &ConsultRequest, base: &Value) -> SpecialistCall {
        let role = request.kind.role();
        let input = json!({
            "market_context": base["market_context"],
            "research": base["research"],
            "asset": request.asset,
            "question": request.question,
        });

        let result = match timeout(self.stage_timeout, invoke_checked(self.oracle.as_ref(), role, &input)).await {
            Ok(result) => result.and_then(|output| output.into_specialist()),
            Err(_) => Err(OracleError::Timeout),
        };

        let outcome = match result {
            Ok(assessment) => SpecialistOutcome::Completed { assessment },
            Err(e) => {
                warn!("{} consultation failed: {}", role, e);
                SpecialistOutcome::Failed { error: e.to_string() }
            }
        };
        SpecialistCall {
            kind: request.kind,
            asset: request.asset.clone(),
            outcome,
        }
    }
}
