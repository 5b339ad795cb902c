//! Shell selection and non-interactive invocation for agent-issued commands.
//!
//! Given a command string, this crate decides which shell executable should
//! run it ([`preferred`] / [`acceptable`]) and what argument vector invokes
//! that shell non-interactively ([`shell_args`]), including the optional
//! login/profile sourcing mode. It owns no processes; `agent-exec` consumes
//! both halves when spawning.

mod args;
mod kind;
mod resolver;

pub use args::shell_args;
pub use kind::ShellKind;
pub use resolver::GIT_BASH_PATH_ENV_VAR;
pub use resolver::acceptable;
pub use resolver::preferred;
