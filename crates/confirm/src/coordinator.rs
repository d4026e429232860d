use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use shellward_policy::{root_command, CommandGate, CommandRequest, GateError};

use crate::session::SessionState;

/// True when the command invokes the privileged-execution mechanism. Only
/// meaningful on platforms that have one.
pub fn is_elevation_request(command: &str) -> bool {
    let trimmed = command.trim_start();
    cfg!(unix) && (trimmed == "sudo" || trimmed.starts_with("sudo "))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecDecision {
    AllowOnce,
    AllowAlways,
    Cancel,
}

/// A decision prompt for the UI collaborator. Each variant carries exactly
/// the data needed to render it plus a single-shot resolution channel; the
/// channel is consumed at most once.
pub enum ConfirmationRequest {
    Exec {
        root_command: String,
        command: String,
        resolve: oneshot::Sender<ExecDecision>,
    },
    Password {
        title: String,
        resolve: oneshot::Sender<Option<String>>,
    },
    Info {
        title: String,
        resolve: oneshot::Sender<bool>,
    },
    Edit {
        title: String,
        resolve: oneshot::Sender<bool>,
    },
    ExternalTool {
        title: String,
        resolve: oneshot::Sender<bool>,
    },
}

/// Receiving half of an outstanding confirmation, awaited by the coordinator.
pub enum PendingDecision {
    Exec(oneshot::Receiver<ExecDecision>),
    Password(oneshot::Receiver<Option<String>>),
}

pub enum Decision {
    /// No human input needed; the invocation may proceed.
    Proceed,
    /// The invocation is suspended until the prompt resolves.
    Prompt {
        request: ConfirmationRequest,
        pending: PendingDecision,
    },
}

#[derive(Debug, Error)]
pub enum ConfirmError {
    #[error(transparent)]
    Policy(#[from] GateError),
    #[error("command rejected by user")]
    Denied,
    #[error("confirmation cancelled")]
    Cancelled,
}

/// Renders confirmation prompts to the human operator. The implementation
/// resolves each request's channel once; dropping the request unresolved
/// counts as a denial.
#[async_trait]
pub trait ConfirmationHandler: Send + Sync {
    async fn deliver(&self, request: ConfirmationRequest);
}

/// Decides whether a human must explicitly authorize an invocation before it
/// proceeds, and remembers prior "always allow" decisions for the session.
pub struct ConfirmationCoordinator {
    gate: CommandGate,
    session: Arc<SessionState>,
}

impl ConfirmationCoordinator {
    pub fn new(gate: CommandGate, session: Arc<SessionState>) -> Self {
        Self { gate, session }
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    /// Validates the request and decides whether a prompt is required.
    /// Invalid input is rejected here; no confirmation is ever shown for it.
    pub fn should_confirm(&self, request: &CommandRequest) -> Result<Decision, GateError> {
        self.gate.validate(request)?;
        let command = request.command.trim();

        if is_elevation_request(command) {
            if self.session.credentials.get().is_some() {
                return Ok(Decision::Proceed);
            }
            let (resolve, rx) = oneshot::channel();
            return Ok(Decision::Prompt {
                request: ConfirmationRequest::Password {
                    title: "sudo password".to_string(),
                    resolve,
                },
                pending: PendingDecision::Password(rx),
            });
        }

        let root = root_command(command).ok_or_else(|| GateError::NoRootCommand(command.to_string()))?;
        if self.session.is_whitelisted(&root) {
            return Ok(Decision::Proceed);
        }

        let (resolve, rx) = oneshot::channel();
        Ok(Decision::Prompt {
            request: ConfirmationRequest::Exec {
                root_command: root,
                command: command.to_string(),
                resolve,
            },
            pending: PendingDecision::Exec(rx),
        })
    }

    /// Drives the full confirmation round-trip: delivers the prompt to the UI
    /// collaborator, then races its resolution against cancellation. A
    /// resolution arriving after cancellation is a no-op.
    pub async fn authorize(
        &self,
        request: &CommandRequest,
        cancel: &CancellationToken,
        handler: &dyn ConfirmationHandler,
    ) -> Result<(), ConfirmError> {
        let decision = self.should_confirm(request)?;
        let Decision::Prompt { request: prompt, pending } = decision else {
            return Ok(());
        };

        let remembered_root = match &prompt {
            ConfirmationRequest::Exec { root_command, .. } => Some(root_command.clone()),
            _ => None,
        };
        handler.deliver(prompt).await;

        match pending {
            PendingDecision::Exec(rx) => tokio::select! {
                _ = cancel.cancelled() => Err(ConfirmError::Cancelled),
                outcome = rx => match outcome {
                    Ok(ExecDecision::AllowOnce) => Ok(()),
                    Ok(ExecDecision::AllowAlways) => {
                        if let Some(root) = remembered_root {
                            self.session.add_to_whitelist(&root);
                        }
                        Ok(())
                    }
                    Ok(ExecDecision::Cancel) | Err(_) => Err(ConfirmError::Denied),
                },
            },
            PendingDecision::Password(rx) => tokio::select! {
                _ = cancel.cancelled() => Err(ConfirmError::Cancelled),
                outcome = rx => match outcome {
                    Ok(Some(secret)) => {
                        self.session.credentials.set(secret);
                        Ok(())
                    }
                    Ok(None) | Err(_) => Err(ConfirmError::Denied),
                },
            },
        }
    }
}
