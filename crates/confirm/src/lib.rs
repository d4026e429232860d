pub mod coordinator;
pub mod credentials;
pub mod session;

pub use coordinator::{
    is_elevation_request, ConfirmError, ConfirmationCoordinator, ConfirmationHandler,
    ConfirmationRequest, Decision, ExecDecision, PendingDecision,
};
pub use credentials::CredentialCache;
pub use session::SessionState;
