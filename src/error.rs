//! Typed failures for every pipeline stage.
//!
//! Each variant maps to one of the failure kinds the driver distinguishes:
//! configuration, transport, remote terminal failure, poll exhaustion, and
//! policy non-compliance. `main` turns any of them into a single message.
use crate::state::ValidationState;
use crate::transport::TransportError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Config(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Upload request with id {upload_id} failed due to : {detail}")]
    UploadFailed { upload_id: String, detail: String },

    #[error("Upload request with id {upload_id} is taking longer time causing it to expire.")]
    UploadExpired { upload_id: String },

    #[error("Maximum polling attempts reached. Upload request with id {upload_id} is not processed yet.")]
    UploadNotProcessed { upload_id: String },

    #[error("The snapshot generation failed for changeset : {changeset}.")]
    SnapshotGenerationFailed { changeset: String },

    #[error("Maximum polling attempts reached. Snapshot process request of changeset : {changeset} is not yet completed.")]
    SnapshotGenerationPending { changeset: String },

    #[error("{0}")]
    SnapshotNotFound(String),

    #[error("Maximum polling attempts reached. Snapshot record with sys id {sys_id} is not validated yet.")]
    ValidationPending { sys_id: String },

    #[error("Validation failed for the snapshot '{snapshot}'. The validation status of the snapshot is {state}.")]
    PolicyValidationFailed {
        snapshot: String,
        state: ValidationState,
    },

    #[error("write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialize {what}: {source}")]
    Serialization {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl PipelineError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Config(_) => 2,
            PipelineError::Transport(_) => 3,
            PipelineError::UploadFailed { .. }
            | PipelineError::UploadExpired { .. }
            | PipelineError::SnapshotGenerationFailed { .. }
            | PipelineError::SnapshotNotFound(_) => 4,
            PipelineError::UploadNotProcessed { .. }
            | PipelineError::SnapshotGenerationPending { .. }
            | PipelineError::ValidationPending { .. } => 5,
            PipelineError::PolicyValidationFailed { .. } => 6,
            PipelineError::Write { .. } | PipelineError::Serialization { .. } => 1,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
