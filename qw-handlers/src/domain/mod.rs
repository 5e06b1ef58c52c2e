//! The three-phase domain-task protocol (spec.md §4.B / §9 "Three-phase
//! domain-task protocol (create/run/close)").
//!
//! A [`DomainTaskCall`] is resolved at execution time by a
//! [`DomainTaskResolver`] — the external collaborator spec.md names —
//! into a [`DomainTaskRunner`] exposing `create`/`run`/`close`. `close`
//! is always invoked on every exit path and its errors are logged only,
//! never surfaced (spec.md §4.B, §7).

pub mod shell;

use async_trait::async_trait;
use qw_messages::envelope::DomainTaskCall;
use qw_messages::ArgValue;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug, Clone)]
pub enum DomainTaskError {
    #[error("domain task not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Error(String),
    #[error("{0}")]
    QwError(String),
}

#[async_trait]
pub trait DomainTaskRunner: Send {
    async fn create(&mut self) -> Result<(), DomainTaskError>;
    async fn run(&mut self) -> Result<ArgValue, DomainTaskError>;
    /// Best-effort teardown; the caller never surfaces its errors.
    async fn close(&mut self);
}

/// Resolves a [`DomainTaskCall`] descriptor into a concrete runner. This
/// is the "external collaborator" spec.md §4.B defers to; the only
/// implementation this crate ships is [`shell::ShellDomainTaskResolver`],
/// an illustrative default.
pub trait DomainTaskResolver: Send + Sync {
    fn resolve(
        &self,
        descriptor: &DomainTaskCall,
    ) -> Result<Box<dyn DomainTaskRunner>, DomainTaskError>;
}

/// Runs the full `create -> run -> close` protocol, always invoking
/// `close` regardless of whether `create`/`run` succeeded.
pub async fn run_domain_task(
    resolver: &dyn DomainTaskResolver,
    descriptor: &DomainTaskCall,
) -> Result<ArgValue, DomainTaskError> {
    let mut runner = resolver.resolve(descriptor)?;
    let result = match runner.create().await {
        Ok(()) => runner.run().await,
        Err(err) => Err(err),
    };
    runner.close().await;
    if let Err(err) = &result {
        warn!(program = %descriptor.program, task = %descriptor.task, error = %err, "domain task failed");
    }
    result
}
