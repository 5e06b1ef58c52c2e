//! A handful of concrete handlers used by the integration tests (spec.md
//! §8 S1/S2/S5) and available to any deployment as a sane starting
//! registry. The business semantics of real callables are an external
//! collaborator (spec.md §1); these exist so the rewrite is runnable and
//! testable end to end.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use qw_messages::ArgValue;

use crate::registry::CallableHandler;
use crate::registry::HandlerError;
use crate::registry::HandlerRegistry;

/// Returns its first argument unchanged.
pub struct EchoHandler;

#[async_trait]
impl CallableHandler for EchoHandler {
    fn id(&self) -> &str {
        "echo"
    }

    async fn call(
        &self,
        args: Vec<ArgValue>,
        _kwargs: BTreeMap<String, ArgValue>,
    ) -> Result<ArgValue, HandlerError> {
        Ok(args.into_iter().next().unwrap_or(ArgValue::Null))
    }
}

/// `fn=lambda x: x + 1` from spec.md §8 S1.
pub struct IncrementHandler;

#[async_trait]
impl CallableHandler for IncrementHandler {
    fn id(&self) -> &str {
        "increment"
    }

    async fn call(
        &self,
        args: Vec<ArgValue>,
        _kwargs: BTreeMap<String, ArgValue>,
    ) -> Result<ArgValue, HandlerError> {
        let n = args
            .first()
            .and_then(ArgValue::as_i64)
            .ok_or_else(|| HandlerError::failed("TypeError", "increment expects an integer arg"))?;
        Ok(ArgValue::Int(n + 1))
    }
}

/// `sleep_and_return(seconds, value)` from spec.md §8 S2.
pub struct SleepAndReturnHandler;

#[async_trait]
impl CallableHandler for SleepAndReturnHandler {
    fn id(&self) -> &str {
        "sleep_and_return"
    }

    async fn call(
        &self,
        args: Vec<ArgValue>,
        _kwargs: BTreeMap<String, ArgValue>,
    ) -> Result<ArgValue, HandlerError> {
        let seconds = args
            .first()
            .and_then(ArgValue::as_i64)
            .ok_or_else(|| HandlerError::failed("TypeError", "expected seconds as first arg"))?;
        let value = args.get(1).cloned().unwrap_or(ArgValue::Null);
        tokio::time::sleep(Duration::from_secs(seconds.max(0) as u64)).await;
        Ok(value)
    }
}

/// Always raises; exercises the exception-as-value reply path.
pub struct AlwaysFailHandler;

#[async_trait]
impl CallableHandler for AlwaysFailHandler {
    fn id(&self) -> &str {
        "always_fail"
    }

    async fn call(
        &self,
        _args: Vec<ArgValue>,
        _kwargs: BTreeMap<String, ArgValue>,
    ) -> Result<ArgValue, HandlerError> {
        Err(HandlerError::failed("RuntimeError", "always_fail always fails"))
    }
}

/// A registry pre-populated with the handlers above.
pub fn default_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(std::sync::Arc::new(EchoHandler));
    registry.register(std::sync::Arc::new(IncrementHandler));
    registry.register(std::sync::Arc::new(SleepAndReturnHandler));
    registry.register(std::sync::Arc::new(AlwaysFailHandler));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn increment_adds_one() {
        let registry = default_registry();
        let result = registry
            .call("increment", vec![ArgValue::Int(41)], BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(result, ArgValue::Int(42));
    }

    #[tokio::test]
    async fn unknown_handler_is_not_found() {
        let registry = default_registry();
        let err = registry
            .call("nonexistent", vec![], BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::NotFound(_)));
    }

    #[tokio::test]
    async fn always_fail_surfaces_as_failure() {
        let registry = default_registry();
        let err = registry
            .call("always_fail", vec![], BTreeMap::new())
            .await
            .unwrap_err();
        match err {
            HandlerError::Failed { type_tag, .. } => assert_eq!(type_tag, "RuntimeError"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
