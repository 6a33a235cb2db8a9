use async_trait::async_trait;
use serde_json::Value;

use super::errors::OracleError;
use super::types::{OracleOutput, Role};
use super::validate::validate_output;

/// Typed reasoning capability
///
/// Implementations may be a language model, a rule engine or a scripted
/// test double. The pipeline only sees role-tagged, typed outputs.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Fulfil the contract of `role` for the given structured context
    ///
    /// # Arguments
    /// * `role` - Which contract to fulfil
    /// * `context` - Structured input for the role
    async fn invoke(&self, role: Role, context: &Value) -> Result<OracleOutput, OracleError>;
}

/// Invoke the oracle and check that the output matches the role and its bounds
pub async fn invoke_typed<T>(oracle: &dyn Oracle, role: Role, context: &Value) -> Result<T, OracleError>
where
    T: TryFrom<OracleOutput, Error = OracleError>,
{
    let output = invoke_checked(oracle, role, context).await?;
    T::try_from(output)
}

/// Invoke the oracle, rejecting outputs of the wrong role or out of bounds
pub async fn invoke_checked(oracle: &dyn Oracle, role: Role, context: &Value) -> Result<OracleOutput, OracleError> {
    let output = oracle.invoke(role, context).await?;
    if output.role() != role {
        return Err(OracleError::RoleMismatch {
            expected: role_label(role),
            got: output.role(),
        });
    }
    validate_output(&output)?;
    Ok(output)
}

fn role_label(role: Role) -> &'static str {
    match role {
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
    }
}
