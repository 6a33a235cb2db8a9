//! The decision pipeline
//!
//! research fan-out → strategist (+ specialists) → selector ∥ guardrail →
//! verifier → normalizer/executor → session

pub mod cycle;
pub mod decision;
pub mod research;
pub mod strategist;
pub mod trace;
pub mod verifier;

pub use cycle::DcaPipeline;
pub use decision::{DecisionOutcome, DecisionStage, DecisionState};
pub use research::{sort_by_recency, DroppedQuery, ResearchOutcome, ResearchStage};
pub use strategist::{SpecialistCall, SpecialistOutcome, StrategyRun, Strategist};
pub use trace::CycleTrace;
pub use verifier::{audit, Verifier};
