use change_event::{EntityTag, EventEnvelope};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::handlers::{
    ChangeHandler, GenericHandler, HandlerResult, TodoAnalytics, TodoHandler, TokenHandler,
    UserHandler,
};

/// Maps entity tags to handlers. Tables without a registered handler go to
/// the fallback, so no envelope is dropped silently.
#[derive(Clone)]
pub struct Router {
    handlers: HashMap<EntityTag, Arc<dyn ChangeHandler>>,
    fallback: Arc<dyn ChangeHandler>,
}

impl Router {
    pub fn new(fallback: Arc<dyn ChangeHandler>) -> Self {
        Self {
            handlers: HashMap::new(),
            fallback,
        }
    }

    /// Register (or replace) the handler for an entity
    pub fn register(mut self, tag: EntityTag, handler: Arc<dyn ChangeHandler>) -> Self {
        self.handlers.insert(tag, handler);
        self
    }

    /// Todo, user and token handlers with the generic fallback
    pub fn standard(processor_id: &str, analytics: TodoAnalytics) -> Self {
        Self::new(Arc::new(GenericHandler::new(processor_id)))
            .register(
                EntityTag::Todos,
                Arc::new(TodoHandler::new(processor_id, analytics)),
            )
            .register(EntityTag::Users, Arc::new(UserHandler::new(processor_id)))
            .register(EntityTag::UserTokens, Arc::new(TokenHandler::new(processor_id)))
    }

    /// Select the handler by exact match on the table name
    pub fn route(&self, envelope: &EventEnvelope) -> &Arc<dyn ChangeHandler> {
        envelope
            .entity()
            .and_then(|tag| self.handlers.get(&tag))
            .unwrap_or(&self.fallback)
    }

    pub async fn dispatch(&self, envelope: &EventEnvelope) -> HandlerResult {
        let handler = self.route(envelope);
        debug!(
            table = %envelope.table,
            operation = %envelope.operation,
            handler = handler.name(),
            "Dispatching change"
        );
        handler.handle(envelope).await
    }
}
