//! One full decision cycle, from market snapshot to persisted session

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use super::decision::DecisionStage;
use super::research::ResearchStage;
use super::strategist::Strategist;
use super::trace::CycleTrace;
use super::verifier::Verifier;
use crate::common::errors::Result;
use crate::common::traits::{Exchange, Notifier, SessionStore};
use crate::config::types::{AppConfig, PipelineSettings, SessionConfig};
use crate::execution::Executor;
use crate::market::{ContextBuilder, FearGreedReading};
use crate::notify::format_session_message;
use crate::oracle::Oracle;
use crate::risk::Guardrail;
use crate::session::{Session, SessionDraft, SessionType};

/// The decision pipeline with its collaborators wired in
///
/// Cycles are serialized: a second `run_cycle` waits for the first to
/// finish, so two cycles never act on the same portfolio state.
pub struct DcaPipeline {
    context_builder: ContextBuilder,
    research: ResearchStage,
    strategist: Strategist,
    decision: DecisionStage,
    verifier: Verifier,
    executor: Executor,
    store: Arc<dyn SessionStore>,
    notifier: Arc<dyn Notifier>,
    settings: PipelineSettings,
    session_config: SessionConfig,
    running: Mutex<()>,
}

impl DcaPipeline {
    pub fn new(
        config: &AppConfig,
        exchange: Arc<dyn Exchange>,
        oracle: Arc<dyn Oracle>,
        store: Arc<dyn SessionStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let settings = config.pipeline.clone();
        let query_timeout = Duration::from_secs(settings.research_timeout_seconds);
        let stage_timeout = Duration::from_secs(settings.stage_timeout_seconds);

        Self {
            context_builder: ContextBuilder::new(Arc::clone(&exchange), settings.clone()),
            research: ResearchStage::new(Arc::clone(&oracle), query_timeout, stage_timeout),
            strategist: Strategist::new(Arc::clone(&oracle), stage_timeout),
            decision: DecisionStage::new(Arc::clone(&oracle), Guardrail::new(config.limits.clone()), stage_timeout),
            verifier: Verifier::new(oracle, stage_timeout),
            executor: Executor::new(exchange, config.execution.clone(), &settings.quote_asset),
            store,
            notifier,
            settings,
            session_config: config.session.clone(),
            running: Mutex::new(()),
        }
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Run one cycle and return its persisted session
    ///
    /// Stage failures end the cycle early but still produce a session. The
    /// only error returned is a failure to persist that session.
    ///
    /// # Arguments
    /// * `fear_greed` - Sentiment reading resolved by the caller's cache
    /// * `previous_plan` - Plan text of the last decided session
    #[instrument(skip_all)]
    pub async fn run_cycle(
        &self,
        fear_greed: Option<FearGreedReading>,
        previous_plan: Option<String>,
    ) -> Result<Session> {
        let _guard = self.running.lock().await;

        let mut draft = SessionDraft::new(self.executor.mode(), &self.settings.quote_asset);
        let mut trace = CycleTrace::new(draft.id());
        info!("Cycle {} started in {} mode", draft.id(), self.executor.mode());

        let session_type = match self.drive(&mut draft, &mut trace, fear_greed, previous_plan).await {
            Ok(session_type) => session_type,
            Err(e) => {
                error!("Cycle {} aborted: {}", draft.id(), e);
                draft.error = Some(e.to_string());
                trace.error = Some(e.to_string());
                if draft.execution_results.is_empty() {
                    SessionType::Skip
                } else {
                    SessionType::Buy
                }
            }
        };
        trace.execution_results = draft.execution_results.clone();

        let session = draft.finalize(session_type);
        info!("Cycle {} finished: {}", session.id, session);

        let persisted = self.store.append(&session).await;
        if let Err(e) = &persisted {
            error!("Failed to persist session {}: {}", session.id, e);
        }

        if self.session_config.save_trace {
            match trace.write(&PathBuf::from(&self.session_config.traces_dir)).await {
                Ok(path) => info!("Trace written to {}", path.display()),
                Err(e) => warn!("Failed to write trace: {}", e),
            }
        }

        if let Err(e) = self.notifier.notify(&format_session_message(&session)).await {
            warn!("Notification failed: {}", e);
        }

        persisted.map(|_| session)
    }

    async fn drive(
        &self,
        draft: &mut SessionDraft,
        trace: &mut CycleTrace,
        fear_greed: Option<FearGreedReading>,
        previous_plan: Option<String>,
    ) -> Result<SessionType> {
        let context = self.context_builder.build(fear_greed, previous_plan).await?;
        draft.record_context(&context);
        trace.context = Some(context.clone());

        let available = context.available_capital();
        if available < self.settings.min_quote_balance {
            let reason = format!(
                "free {} balance {} below minimum {}",
                context.quote_asset(),
                available,
                self.settings.min_quote_balance
            );
            info!("Skipping cycle: {}", reason);
            draft.skip_reason = Some(reason);
            return Ok(SessionType::Skip);
        }

        let research = self.research.run(&context).await?;
        trace.research_plan = Some(research.plan);
        trace.research = research.summaries.clone();
        trace.dropped_queries = research.dropped;

        let strategy = self.strategist.run(&context, &research.summaries).await?;
        trace.consultation = Some(strategy.consultation);
        trace.specialist_calls = strategy.consultations;
        trace.options = Some(strategy.options.clone());

        let outcome = self.decision.decide(&context, &strategy.options).await?;
        draft.decision = Some(outcome.decision.clone());
        draft.guardrail = Some(outcome.guardrail.clone());
        trace.decision = Some(outcome.decision.clone());
        trace.guardrail = Some(outcome.guardrail.clone());

        if !outcome.is_approved() {
            warn!("{}", outcome.guardrail.report());
            return Ok(SessionType::Hold);
        }

        let verification = self
            .verifier
            .verify(&context, &strategy.options, &outcome.decision)
            .await;
        draft.verification = Some(verification.clone());
        trace.verification = Some(verification);

        if outcome.decision.is_hold() {
            info!("Decision is to hold: {}", outcome.decision.reasoning);
            return Ok(SessionType::Hold);
        }

        self.executor
            .execute_into(&outcome.decision.actions, &context.prices(), &mut draft.execution_results)
            .await?;
        Ok(SessionType::Buy)
    }
}
