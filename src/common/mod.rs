//! Shared errors, market types and collaborator traits

pub mod errors;
pub mod traits;
pub mod types;

pub use errors::{DcaError, Result};
pub use traits::{Exchange, Notifier, SessionStore};
