use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use shellward_confirm::{
    ConfirmError, ConfirmationCoordinator, ConfirmationHandler, SessionState,
};
use shellward_policy::{CommandGate, CommandRequest, PolicyConfig};

use crate::executor::{ExecError, ProcessExecutor};
use crate::output::OutputEvent;
use crate::result::ExecutionResult;

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error(transparent)]
    Confirm(#[from] ConfirmError),
    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// One session's shell-execution pipeline: gate, confirmation, execution.
/// Sessions share nothing with each other; the whitelist and the cached
/// elevation secret live inside this session's state only.
pub struct ShellSession {
    coordinator: ConfirmationCoordinator,
    executor: ProcessExecutor,
    session: Arc<SessionState>,
}

impl ShellSession {
    pub fn new(policy: PolicyConfig, project_root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = project_root.into();
        let session = Arc::new(SessionState::new());
        let gate = CommandGate::new(policy, root.clone());
        Self {
            coordinator: ConfirmationCoordinator::new(gate, Arc::clone(&session)),
            executor: ProcessExecutor::new(Arc::clone(&session), root),
            session,
        }
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    /// Validates, authorizes and runs one command invocation. Policy
    /// rejections and human denials surface before any process starts;
    /// cancellation during either phase resolves promptly.
    pub async fn execute<F>(
        &self,
        request: &CommandRequest,
        cancel: &CancellationToken,
        handler: &dyn ConfirmationHandler,
        on_output: F,
    ) -> Result<ExecutionResult, InvocationError>
    where
        F: FnMut(OutputEvent) + Send,
    {
        self.coordinator.authorize(request, cancel, handler).await?;
        let result = self.executor.run(request, cancel, on_output).await?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shellward_confirm::{ConfirmationRequest, ExecDecision};
    use shellward_policy::GateError;

    struct AllowOnce;

    #[async_trait]
    impl ConfirmationHandler for AllowOnce {
        async fn deliver(&self, request: ConfirmationRequest) {
            match request {
                ConfirmationRequest::Exec { resolve, .. } => {
                    let _ = resolve.send(ExecDecision::AllowOnce);
                }
                ConfirmationRequest::Password { resolve, .. } => {
                    let _ = resolve.send(None);
                }
                _ => {}
            }
        }
    }

    struct DenyAll;

    #[async_trait]
    impl ConfirmationHandler for DenyAll {
        async fn deliver(&self, request: ConfirmationRequest) {
            if let ConfirmationRequest::Exec { resolve, .. } = request {
                let _ = resolve.send(ExecDecision::Cancel);
            }
        }
    }

    fn permissive_policy() -> PolicyConfig {
        PolicyConfig {
            core_tools: vec!["shell".into()],
            exclude_tools: vec![],
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_full_pipeline_runs_an_approved_command() {
        let session = ShellSession::new(permissive_policy(), std::env::temp_dir());
        let cancel = CancellationToken::new();

        let result = session
            .execute(&CommandRequest::new("echo hi"), &cancel, &AllowOnce, |_| {})
            .await
            .unwrap();

        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout, "hi\n");
    }

    #[tokio::test]
    async fn test_policy_rejection_reaches_the_caller_before_any_process() {
        let policy = PolicyConfig {
            core_tools: vec!["shell(git status)".into()],
            exclude_tools: vec![],
        };
        let session = ShellSession::new(policy, std::env::temp_dir());
        let cancel = CancellationToken::new();

        let result = session
            .execute(&CommandRequest::new("git push"), &cancel, &AllowOnce, |_| {})
            .await;

        assert!(matches!(
            result,
            Err(InvocationError::Confirm(ConfirmError::Policy(
                GateError::NotAllowed(_)
            )))
        ));
    }

    #[tokio::test]
    async fn test_denied_command_never_spawns() {
        let session = ShellSession::new(permissive_policy(), std::env::temp_dir());
        let cancel = CancellationToken::new();

        let result = session
            .execute(&CommandRequest::new("echo hi"), &cancel, &DenyAll, |_| {})
            .await;

        assert!(matches!(
            result,
            Err(InvocationError::Confirm(ConfirmError::Denied))
        ));
    }
}
