//! Deterministic risk guardrail

pub mod guardrail;

pub use guardrail::{Guardrail, GuardrailOutcome, GuardrailStatus, HardLimit, Violation};
