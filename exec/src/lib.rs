//! Shell command execution for agent tool calls.
//!
//! One operation: [`spawn`] runs a command under the resolved shell, in its
//! own process group on POSIX, streams combined stdout/stderr to an
//! optional observer while aggregating it, and races natural exit against
//! caller cancellation and the wall-clock timeout. Forced termination is
//! escalating (SIGTERM, grace window, SIGKILL) on POSIX and a one-shot
//! `taskkill /t` on Windows, and never leaves the tree behind on purpose.

mod error;
mod kill;
mod spawn;

pub use error::Result;
pub use error::SpawnError;
pub use spawn::OnOutput;
pub use spawn::SpawnOptions;
pub use spawn::SpawnResult;
pub use spawn::spawn;
