// src/error.rs - error taxonomy for the MMU coordination core.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SerialError {
    #[error("failed to open serial port: {0}")]
    Open(String),
    #[error("serial connection closed")]
    Closed,
    #[error("serial operation timed out")]
    Timeout,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the `Coordinator`'s public operations. Distinct from
/// the catalogued `ErrCode` (mmu::catalogue) which models *MMU/printer*
/// error conditions reported to the user -- this enum models failures of
/// the coordination layer itself (bad config, protocol plumbing failures).
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("coordinator is not ready (state = {0:?})")]
    NotReady(crate::mmu::coordinator::CoordinatorState),
    #[error(transparent)]
    Serial(#[from] SerialError),
    #[error("invalid configuration: {0}")]
    Config(String),
}
