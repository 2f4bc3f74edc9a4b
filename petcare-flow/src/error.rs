use thiserror::Error;

use crate::state::PipelineStep;

/// Errors surfaced by the triage pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Stage {stage} failed: {message}")]
    StageExecutionFailed { stage: PipelineStep, message: String },

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("No stage registered for step: {0}")]
    StageNotRegistered(PipelineStep),

    #[error("Stage for step {expected} returned output for {actual}")]
    UnexpectedOutput {
        expected: PipelineStep,
        actual: PipelineStep,
    },

    #[error("Result slot already filled: {0}")]
    SlotAlreadyFilled(PipelineStep),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl PipelineError {
    /// Shorthand for wrapping a collaborator failure into a fatal stage error.
    pub fn stage_failed(stage: PipelineStep, message: impl std::fmt::Display) -> Self {
        Self::StageExecutionFailed {
            stage,
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
