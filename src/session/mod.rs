//! Session bookkeeping: one immutable record per cycle

pub mod store;
pub mod types;

pub use store::JsonlSessionStore;
pub use types::{Session, SessionDraft, SessionType};
