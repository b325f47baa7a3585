mod audit;
mod command;
mod config;
mod error;
mod process;
mod similarity;

pub use audit::{format_audit_line, AuditLog};
pub use command::{is_control_operator, is_redirection, takes_redirect_target, CommandLine};
pub use config::{
    CodeHostConfig, EngineConfig, PathsConfig, ResolutionMode, RetryPolicy, DEFAULT_SETUP_COMMANDS,
};
pub use error::{EngineError, ExecFailure};
pub use process::{CommandOutput, CommandRunner, SystemCommandRunner};
pub use similarity::{close_matches, ratio};
