use std::collections::HashSet;

use parking_lot::RwLock;

use crate::credentials::CredentialCache;

/// Session-scoped shared state crossing invocation boundaries: the root
/// commands the human has already approved with "always allow", and the
/// cached elevation secret. Created empty per session and never persisted,
/// so independent sessions cannot cross-contaminate.
#[derive(Default)]
pub struct SessionState {
    whitelist: RwLock<HashSet<String>>,
    pub credentials: CredentialCache,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_whitelisted(&self, root_command: &str) -> bool {
        self.whitelist.read().contains(root_command)
    }

    pub fn add_to_whitelist(&self, root_command: &str) {
        tracing::debug!(command = %root_command, "whitelisting root command for this session");
        self.whitelist.write().insert(root_command.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitelist_grows_and_is_checked() {
        let session = SessionState::new();
        assert!(!session.is_whitelisted("git"));
        session.add_to_whitelist("git");
        assert!(session.is_whitelisted("git"));
    }

    #[test]
    fn test_sessions_are_independent() {
        let a = SessionState::new();
        let b = SessionState::new();
        a.add_to_whitelist("git");
        assert!(!b.is_whitelisted("git"));
    }
}
