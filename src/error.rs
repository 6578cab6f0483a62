//! Error types for Synheart Proctor

use crate::types::{Phase, ViolationKind};
use thiserror::Error;

/// Errors that can occur while running a proctoring session
#[derive(Debug, Error)]
pub enum ProctorError {
    #[error("Operation `{operation}` is not valid in phase {phase:?}")]
    InvalidPhase {
        operation: &'static str,
        phase: Phase,
    },

    #[error("Quiz has already been submitted")]
    AlreadySubmitted,

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Invalid question: {0}")]
    InvalidQuestion(String),

    #[error("Overlapping {0:?} event: one is already open")]
    OverlappingEvent(ViolationKind),

    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProctorError {
    /// Whether the error comes from an external collaborator and should be
    /// recovered locally rather than surfaced to the candidate.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProctorError::ProviderUnavailable(_))
    }
}
