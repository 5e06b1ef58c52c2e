//! An illustrative [`DomainTaskResolver`] that shells out to a local
//! program. Real deployments resolve `{program, task}` against whatever
//! business-specific task catalogue they own (spec.md §1: "the particular
//! business semantics of the wrapped task objects ... are treated as
//! external collaborators"); this one exists so the three-phase protocol
//! is exercised end to end by the test suite.

use async_trait::async_trait;
use qw_messages::envelope::DomainTaskCall;
use qw_messages::ArgValue;
use tokio::process::Child;
use tokio::process::Command;

use super::DomainTaskError;
use super::DomainTaskResolver;
use super::DomainTaskRunner;

pub struct ShellDomainTaskResolver {
    /// Programs allowed to be spawned; anything else is `NotFound`.
    allowed_programs: Vec<String>,
}

impl ShellDomainTaskResolver {
    pub fn new(allowed_programs: Vec<String>) -> Self {
        Self { allowed_programs }
    }
}

impl DomainTaskResolver for ShellDomainTaskResolver {
    fn resolve(
        &self,
        descriptor: &DomainTaskCall,
    ) -> Result<Box<dyn DomainTaskRunner>, DomainTaskError> {
        if !self.allowed_programs.contains(&descriptor.program) {
            return Err(DomainTaskError::NotFound(format!(
                "program not allowed: {}",
                descriptor.program
            )));
        }
        if descriptor.task != "run" {
            return Err(DomainTaskError::Error(format!(
                "unsupported task: {}",
                descriptor.task
            )));
        }
        let args: Vec<String> = descriptor
            .extra_args
            .iter()
            .filter_map(|arg| arg.as_str().map(str::to_string))
            .collect();
        Ok(Box::new(ShellDomainTaskRunner {
            program: descriptor.program.clone(),
            args,
            child: None,
        }))
    }
}

struct ShellDomainTaskRunner {
    program: String,
    args: Vec<String>,
    child: Option<Child>,
}

#[async_trait]
impl DomainTaskRunner for ShellDomainTaskRunner {
    async fn create(&mut self) -> Result<(), DomainTaskError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdout(std::process::Stdio::piped())
            .spawn()
            .map_err(|err| DomainTaskError::QwError(err.to_string()))?;
        self.child = Some(child);
        Ok(())
    }

    async fn run(&mut self) -> Result<ArgValue, DomainTaskError> {
        let child = self
            .child
            .take()
            .ok_or_else(|| DomainTaskError::Error("run called before create".to_string()))?;
        let output = child
            .wait_with_output()
            .await
            .map_err(|err| DomainTaskError::Error(err.to_string()))?;
        if !output.status.success() {
            return Err(DomainTaskError::Error(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }
        Ok(ArgValue::Str(String::from_utf8_lossy(&output.stdout).into_owned()))
    }

    async fn close(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::domain::run_domain_task;

    fn descriptor(program: &str, task: &str, extra_args: Vec<ArgValue>) -> DomainTaskCall {
        DomainTaskCall {
            program: program.to_string(),
            task: task.to_string(),
            extra_args,
            kwargs: BTreeMap::new(),
            host: "localhost".to_string(),
            debug: false,
            correlation_id: None,
        }
    }

    #[tokio::test]
    async fn disallowed_program_is_not_found() {
        let resolver = ShellDomainTaskResolver::new(vec!["echo".to_string()]);
        let descriptor = descriptor("rm", "run", vec![]);
        let err = run_domain_task(&resolver, &descriptor).await.unwrap_err();
        assert!(matches!(err, DomainTaskError::NotFound(_)));
    }

    #[tokio::test]
    async fn echo_runs_to_completion() {
        let resolver = ShellDomainTaskResolver::new(vec!["echo".to_string()]);
        let descriptor = descriptor("echo", "run", vec![ArgValue::str("hi")]);
        let result = run_domain_task(&resolver, &descriptor).await.unwrap();
        assert_eq!(result, ArgValue::Str("hi\n".to_string()));
    }
}
