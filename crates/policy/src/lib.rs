pub mod config;
pub mod gate;

pub use config::PolicyConfig;
pub use gate::{
    root_command, split_sub_commands, CommandGate, CommandRequest, GateError, SHELL_TOOL,
};
