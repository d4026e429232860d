use std::path::Path;
use std::sync::Arc;

use tokio::process::Command;

/// Platform seam for starting and stopping a spawned command as a unit.
/// Selected once at startup; the executor never branches on the platform
/// inline.
pub trait ProcessControl: Send + Sync {
    /// Builds the interpreter invocation for a command line. Where process
    /// groups exist, the returned command also carries the trailer that
    /// records surviving group members into `background_scan` after the
    /// user's command finishes.
    fn build(&self, command_line: &str, background_scan: Option<&Path>) -> Command;

    /// Graceful stop of the whole unit.
    fn terminate(&self, id: i32);

    /// Forceful stop of the whole unit.
    fn kill(&self, id: i32);

    fn supports_process_groups(&self) -> bool;
}

pub fn platform_process_control() -> Arc<dyn ProcessControl> {
    #[cfg(unix)]
    {
        Arc::new(UnixProcessControl)
    }
    #[cfg(windows)]
    {
        Arc::new(WindowsProcessControl)
    }
}

#[cfg(unix)]
pub struct UnixProcessControl;

#[cfg(unix)]
impl ProcessControl for UnixProcessControl {
    fn build(&self, command_line: &str, background_scan: Option<&Path>) -> Command {
        let wrapped = match background_scan {
            Some(path) => {
                // Brace-group the user's command so the trailer can record
                // still-running group members and re-raise the original
                // status. A trailing & must not gain a `;` after it.
                let mut body = command_line.trim().to_string();
                if !body.ends_with('&') {
                    body.push(';');
                }
                format!(
                    "{{ {body} }}; __shellward_status=$?; pgrep -g 0 > '{}' 2>/dev/null; exit $__shellward_status;",
                    path.display()
                )
            }
            None => command_line.to_string(),
        };
        let mut command = Command::new("bash");
        command.arg("-c").arg(wrapped);
        // Detached group so the whole subtree can be signalled at once.
        command.process_group(0);
        command
    }

    fn terminate(&self, id: i32) {
        unsafe {
            libc::killpg(id, libc::SIGTERM);
        }
    }

    fn kill(&self, id: i32) {
        unsafe {
            libc::killpg(id, libc::SIGKILL);
        }
    }

    fn supports_process_groups(&self) -> bool {
        true
    }
}

#[cfg(windows)]
pub struct WindowsProcessControl;

#[cfg(windows)]
impl ProcessControl for WindowsProcessControl {
    fn build(&self, command_line: &str, _background_scan: Option<&Path>) -> Command {
        let mut command = Command::new("cmd.exe");
        command.arg("/C").arg(command_line);
        command
    }

    // No group-signal semantics here; taskkill walks the tree instead, so
    // graceful and forceful stops are the same operation.
    fn terminate(&self, id: i32) {
        self.kill(id);
    }

    fn kill(&self, id: i32) {
        let _ = std::process::Command::new("taskkill")
            .args(["/PID", &id.to_string(), "/T", "/F"])
            .spawn();
    }

    fn supports_process_groups(&self) -> bool {
        false
    }
}
