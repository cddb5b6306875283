use thiserror::Error;

use crate::validation::DenialReason;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("input: {message}")]
    Input { message: String },

    #[error("generation: upstream generation failed: {message}")]
    Generation { message: String },

    #[error("validation: unsafe sql: {reason}")]
    Validation { reason: DenialReason },

    #[error("connection: {message}")]
    Connection { message: String },

    #[error("execution: query execution failed: {message}")]
    Execution { message: String },

    #[error("timeout: query timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("config: {message}")]
    Config { message: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("format: {message}")]
    Format { message: String },
}

/// Terminal error states of the gateway pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    /// Refused before touching the database.
    Rejected,
    Failed,
}

impl GatewayError {
    pub fn terminal_state(&self) -> TerminalState {
        match self {
            GatewayError::Input { .. } | GatewayError::Validation { .. } => TerminalState::Rejected,
            _ => TerminalState::Failed,
        }
    }
}
