//! Per-entity change handlers.
//!
//! A handler turns one envelope into the records it derives. It does not
//! emit them: the pipeline emits only after the handler succeeded, so a
//! failed envelope never leaves half of its records in the log.

mod analytics;
mod generic;
mod todo;
mod token;
mod user;

pub use analytics::{TodoAction, TodoAnalytics};
pub use generic::GenericHandler;
pub use todo::TodoHandler;
pub use token::TokenHandler;
pub use user::UserHandler;

use async_trait::async_trait;
use change_event::EventEnvelope;

use crate::error::HandlerError;
use crate::records::DerivedRecord;

pub type HandlerResult = Result<Vec<DerivedRecord>, HandlerError>;

#[async_trait]
pub trait ChangeHandler: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Process one envelope, keyed on its operation
    async fn handle(&self, envelope: &EventEnvelope) -> HandlerResult;
}
