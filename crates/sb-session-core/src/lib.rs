//! Orchestration core: the session state machine and the funding and
//! transfer workflows it drives.

mod config;
mod error;
pub mod funding;
mod session;
pub mod transfer;

pub use config::SessionConfig;
pub use error::SessionError;
pub use funding::FundingReport;
pub use sb_api_types::{ErrorKind, SessionSnapshot, SessionState};
pub use session::Session;
