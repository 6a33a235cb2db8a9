//! Reasoning oracle: roles, typed outputs and the capability trait
//!
//! Every reasoning step of a cycle (planning, research, specialist analysis,
//! strategy, selection, verification) is an [`Oracle`] call for a [`Role`].
//! Outputs are deserialized into the role's schema and bounds-checked before
//! the pipeline sees them; a violation is a hard error for that call.

pub mod client;
mod errors;
mod traits;
pub mod types;
pub mod validate;

pub use client::LlmOracle;
pub use errors::OracleError;
pub use traits::{invoke_checked, invoke_typed, Oracle};
pub use types::*;
