use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use qw_messages::ArgValue;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum HandlerError {
    #[error("no handler registered for id: {0}")]
    NotFound(String),
    #[error("{message}")]
    Failed { type_tag: String, message: String },
}

impl HandlerError {
    pub fn failed(type_tag: impl Into<String>, message: impl Into<String>) -> Self {
        HandlerError::Failed {
            type_tag: type_tag.into(),
            message: message.into(),
        }
    }
}

/// A callable resolved by `handler_id` (spec.md REDESIGN FLAGS: "Dynamic
/// callable transport" — a registry of named callable handlers replaces
/// the source's opaque pickled callables).
#[async_trait]
pub trait CallableHandler: Send + Sync {
    fn id(&self) -> &str;

    async fn call(
        &self,
        args: Vec<ArgValue>,
        kwargs: BTreeMap<String, ArgValue>,
    ) -> Result<ArgValue, HandlerError>;
}

#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn CallableHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn CallableHandler>) {
        self.handlers.insert(handler.id().to_string(), handler);
    }

    pub fn resolve(&self, handler_id: &str) -> Option<Arc<dyn CallableHandler>> {
        self.handlers.get(handler_id).cloned()
    }

    pub async fn call(
        &self,
        handler_id: &str,
        args: Vec<ArgValue>,
        kwargs: BTreeMap<String, ArgValue>,
    ) -> Result<ArgValue, HandlerError> {
        let handler = self
            .resolve(handler_id)
            .ok_or_else(|| HandlerError::NotFound(handler_id.to_string()))?;
        handler.call(args, kwargs).await
    }
}
