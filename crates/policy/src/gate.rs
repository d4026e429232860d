use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::PolicyConfig;

/// Tool identity that allow/deny entries are scoped to.
pub const SHELL_TOOL: &str = "shell";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub directory: Option<String>,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            description: None,
            directory: None,
        }
    }

    pub fn in_directory(mut self, directory: impl Into<String>) -> Self {
        self.directory = Some(directory.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error("command substitution is not allowed: {0}")]
    CommandSubstitution(String),
    #[error("command blocked by policy: {0}")]
    Blocked(String),
    #[error("command not in the allowed list: {0}")]
    NotAllowed(String),
    #[error("empty command")]
    EmptyCommand,
    #[error("could not determine the command to run: {0}")]
    NoRootCommand(String),
    #[error("directory must be relative to the project root: {0}")]
    AbsoluteDirectory(String),
    #[error("directory does not exist under the project root: {0}")]
    MissingDirectory(String),
}

/// Static, synchronous policy check deciding whether a command string is
/// structurally safe and administratively permitted to run at all.
pub struct CommandGate {
    policy: PolicyConfig,
    project_root: PathBuf,
}

impl CommandGate {
    pub fn new(policy: PolicyConfig, project_root: impl Into<PathBuf>) -> Self {
        Self {
            policy,
            project_root: project_root.into(),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn validate(&self, request: &CommandRequest) -> Result<(), GateError> {
        let command = request.command.trim();

        // Substitution can smuggle arbitrary commands past prefix matching,
        // so it is rejected before any allow/deny evaluation.
        if command.contains("$(") || command.contains('`') {
            return Err(GateError::CommandSubstitution(request.command.clone()));
        }

        let sub_commands = split_sub_commands(command);

        if self.policy.is_tool_denied(SHELL_TOOL) {
            return Err(GateError::Blocked(command.to_string()));
        }

        let deny = self.policy.deny_prefixes(SHELL_TOOL);
        let allow = self.policy.allow_prefixes(SHELL_TOOL);
        let wildcard = self.policy.has_wildcard_allow(SHELL_TOOL);

        for sub in &sub_commands {
            if deny.iter().any(|prefix| prefix_matches(sub, prefix)) {
                tracing::debug!(command = %sub, "sub-command matches a deny entry");
                return Err(GateError::Blocked(sub.clone()));
            }
            if !allow.is_empty() && !wildcard && !allow.iter().any(|prefix| prefix_matches(sub, prefix))
            {
                return Err(GateError::NotAllowed(sub.clone()));
            }
        }

        if command.is_empty() {
            return Err(GateError::EmptyCommand);
        }
        if root_command(command).is_none() {
            return Err(GateError::NoRootCommand(command.to_string()));
        }

        if let Some(directory) = request.directory.as_deref() {
            if Path::new(directory).is_absolute() {
                return Err(GateError::AbsoluteDirectory(directory.to_string()));
            }
            if !self.project_root.join(directory).is_dir() {
                return Err(GateError::MissingDirectory(directory.to_string()));
            }
        }

        Ok(())
    }
}

/// Prefix match at a boundary: `git status` matches `git status` and
/// `git status --short` but not `git statusx`.
fn prefix_matches(command: &str, prefix: &str) -> bool {
    match command.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with(' '),
        None => false,
    }
}

/// Splits a command line on the top-level separators `&&`, `||`, `|` and `;`,
/// trimming each piece and collapsing internal whitespace. A single `&` is
/// the background operator, not a separator. The split is token-level and not
/// quote-aware; separators inside string literals split too.
pub fn split_sub_commands(command: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = command.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            ';' => push_part(&mut parts, &mut current),
            '|' => {
                if chars.peek() == Some(&'|') {
                    chars.next();
                }
                push_part(&mut parts, &mut current);
            }
            '&' if chars.peek() == Some(&'&') => {
                chars.next();
                push_part(&mut parts, &mut current);
            }
            _ => current.push(c),
        }
    }
    push_part(&mut parts, &mut current);
    parts
}

fn push_part(parts: &mut Vec<String>, current: &mut String) {
    let normalized = current.split_whitespace().collect::<Vec<_>>().join(" ");
    if !normalized.is_empty() {
        parts.push(normalized);
    }
    current.clear();
}

/// The basename of the first token of a command line. This is the identity
/// used for allow/deny matching and session whitelist lookups, so the gate
/// and the confirmation coordinator must both go through here.
pub fn root_command(command: &str) -> Option<String> {
    let cleaned = command.trim_start_matches(|c: char| {
        c.is_whitespace() || matches!(c, '(' | ')' | '{' | '}' | '"' | '\'')
    });
    let token = cleaned
        .split(|c: char| c.is_whitespace() || matches!(c, '&' | '|' | ';'))
        .find(|t| !t.is_empty())?;
    let token = token.trim_matches(|c| matches!(c, '(' | ')' | '{' | '}' | '"' | '\''));
    let base = token.split('/').next_back().unwrap_or_default();
    if base.is_empty() {
        None
    } else {
        Some(base.to_string())
    }
}
