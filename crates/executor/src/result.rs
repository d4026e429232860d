use serde::{Deserialize, Serialize};

/// Immutable record of one shell invocation, produced exactly once and
/// consumed by both the human-facing display and the agent transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub command: String,
    pub directory: Option<String>,
    pub stdout: String,
    pub stderr: String,
    /// Every byte the process produced, kept regardless of the text/binary
    /// classification of the live stream.
    #[serde(skip)]
    pub raw_output: Vec<u8>,
    pub error: Option<String>,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub background_pids: Vec<i32>,
    pub process_group_id: Option<i32>,
    pub aborted: bool,
}

impl ExecutionResult {
    /// Shell of a result for failures that never produced a process, so the
    /// transcript can still record what was attempted.
    pub fn failure(
        command: impl Into<String>,
        directory: Option<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            directory,
            stdout: String::new(),
            stderr: String::new(),
            raw_output: Vec::new(),
            error: Some(error.into()),
            exit_code: None,
            signal: None,
            background_pids: Vec::new(),
            process_group_id: None,
            aborted: false,
        }
    }

    /// Verbose machine-readable rendering appended to the agent transcript.
    pub fn transcript(&self) -> String {
        fn or_none(value: Option<String>) -> String {
            value.unwrap_or_else(|| "(none)".to_string())
        }

        let background = if self.background_pids.is_empty() {
            "(none)".to_string()
        } else {
            self.background_pids
                .iter()
                .map(|pid| pid.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };

        [
            format!("Command: {}", self.command),
            format!(
                "Directory: {}",
                self.directory.as_deref().unwrap_or("(root)")
            ),
            format!(
                "Stdout: {}",
                if self.stdout.is_empty() {
                    "(empty)"
                } else {
                    self.stdout.as_str()
                }
            ),
            format!(
                "Stderr: {}",
                if self.stderr.is_empty() {
                    "(empty)"
                } else {
                    self.stderr.as_str()
                }
            ),
            format!("Error: {}", or_none(self.error.clone())),
            format!("Exit Code: {}", or_none(self.exit_code.map(|c| c.to_string()))),
            format!("Signal: {}", or_none(self.signal.map(|s| s.to_string()))),
            format!("Background PIDs: {background}"),
            format!(
                "Process Group PGID: {}",
                or_none(self.process_group_id.map(|p| p.to_string()))
            ),
        ]
        .join("\n")
    }

    /// Terse human-facing line for when the run is over.
    pub fn status_line(&self) -> String {
        if self.aborted {
            return "Command cancelled by user.".to_string();
        }
        if let Some(signal) = self.signal {
            return format!("Command terminated by signal {signal}.");
        }
        match self.exit_code {
            Some(0) => {
                let trimmed = self.stdout.trim();
                if trimmed.is_empty() {
                    "Command exited with code 0.".to_string()
                } else {
                    trimmed.to_string()
                }
            }
            Some(code) => format!("Command exited with code {code}."),
            None => match &self.error {
                Some(error) => error.clone(),
                None => "Command produced no exit information.".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ExecutionResult {
        ExecutionResult {
            command: "echo hello".into(),
            directory: None,
            stdout: "hello\n".into(),
            stderr: String::new(),
            raw_output: b"hello\n".to_vec(),
            error: None,
            exit_code: Some(0),
            signal: None,
            background_pids: Vec::new(),
            process_group_id: Some(4242),
            aborted: false,
        }
    }

    #[test]
    fn test_transcript_fills_in_none_placeholders() {
        let transcript = sample().transcript();
        assert!(transcript.contains("Command: echo hello"));
        assert!(transcript.contains("Directory: (root)"));
        assert!(transcript.contains("Stderr: (empty)"));
        assert!(transcript.contains("Error: (none)"));
        assert!(transcript.contains("Exit Code: 0"));
        assert!(transcript.contains("Signal: (none)"));
        assert!(transcript.contains("Background PIDs: (none)"));
        assert!(transcript.contains("Process Group PGID: 4242"));
    }

    #[test]
    fn test_status_line_shows_output_on_success() {
        assert_eq!(sample().status_line(), "hello");
    }

    #[test]
    fn test_status_line_failure_and_abort() {
        let mut result = sample();
        result.exit_code = Some(2);
        result.stdout.clear();
        assert_eq!(result.status_line(), "Command exited with code 2.");

        result.aborted = true;
        result.exit_code = None;
        assert_eq!(result.status_line(), "Command cancelled by user.");

        result.aborted = false;
        result.signal = Some(15);
        assert_eq!(result.status_line(), "Command terminated by signal 15.");
    }

    #[test]
    fn test_failure_shell_carries_error() {
        let result = ExecutionResult::failure("boom", None, "spawn failed");
        assert_eq!(result.error.as_deref(), Some("spawn failed"));
        assert!(result.transcript().contains("Error: spawn failed"));
        assert_eq!(result.status_line(), "spawn failed");
    }
}
