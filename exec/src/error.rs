use thiserror::Error;

/// The only failure `spawn` surfaces: the OS could not create the process
/// at all. Timeouts, cancellation, kill errors, and observer failures are
/// represented in (or absorbed by) the result instead.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("failed to launch process: {0}")]
    Launch(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SpawnError>;
