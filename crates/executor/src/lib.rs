pub mod executor;
pub mod invocation;
pub mod output;
pub mod process_control;
pub mod result;

pub use executor::{ExecError, ProcessExecutor, KILL_GRACE, OUTPUT_UPDATE_INTERVAL};
pub use invocation::{InvocationError, ShellSession};
pub use output::{OutputAggregator, OutputEvent};
pub use process_control::{platform_process_control, ProcessControl};
pub use result::ExecutionResult;
