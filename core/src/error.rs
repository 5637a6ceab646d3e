use crate::controller::RunPhase;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Cannot {operation} while run is in phase {phase}")]
    InvalidTransition {
        operation: &'static str,
        phase: RunPhase,
    },

    #[error("Store returned unexpected data: {0}")]
    UnexpectedShape(String),

    #[error("Delete verification failed: {remaining} synthetic requests remain")]
    ResidualSynthetic { remaining: usize },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse error taxonomy reported at the controller boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    State,
    Store,
    Verification,
}

impl SimError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::InvalidTransition { .. } => ErrorKind::State,
            Self::ResidualSynthetic { .. } => ErrorKind::Verification,
            Self::Database(_)
            | Self::Serialization(_)
            | Self::UnexpectedShape(_)
            | Self::Other(_) => ErrorKind::Store,
        }
    }
}

pub type SimResult<T> = Result<T, SimError>;
