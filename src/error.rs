use thiserror::Error;

use crate::env::Phase;

/// Unrecoverable failure reported by the emulator collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("emulator fault: {0}")]
pub struct EmulatorFault(pub String);

impl EmulatorFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors surfaced by the environment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    /// Action index outside the configured action table.
    #[error("invalid action {index}: action table has {len} entries")]
    InvalidAction { index: usize, len: usize },

    /// `step` called before `reset` or after the episode ended.
    #[error("invalid state: cannot step while {phase:?}, call reset first")]
    InvalidState { phase: Phase },

    #[error(transparent)]
    EmulatorFault(#[from] EmulatorFault),

    /// Rejected at construction, before any episode starts.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl EnvError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        EnvError::Configuration(message.into())
    }
}
