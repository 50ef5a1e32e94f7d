//! End-to-end change workflow.
//!
//! Stages run strictly in order: upload, resolve snapshot, validate, publish,
//! report. Any stage error aborts the remaining stages; nothing already
//! committed remotely is rolled back.
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::outputs::OutputSink;
use crate::poll::Sleeper;
use crate::state::ValidationState;
use crate::transport::{Request, Transport, TransportError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

mod publish;
mod results;
mod snapshot;
mod upload;
mod validation;

#[cfg(test)]
mod testing;

pub use snapshot::SnapshotRecord;
pub use upload::UploadRequest;

pub(crate) mod api {
    pub const IMPACTED_DEPLOYABLES: &str = "/api/sn_cdm/changesets/impacted-deployables";
    pub const UPLOADS: &str = "/api/sn_cdm/applications/uploads";
    pub const UPLOAD_STATUS: &str = "/api/sn_cdm/applications/upload-status";
    pub const CHANGESET_TABLE: &str = "/api/now/table/sn_cdm_changeset";
    pub const SNAPSHOT_TABLE: &str = "/api/now/table/sn_cdm_snapshot";
    pub const POLICY_VALIDATION_RESULT_TABLE: &str =
        "/api/now/table/sn_cdm_policy_validation_result";

    pub fn snapshot_validate(sys_id: &str) -> String {
        format!("/api/sn_cdm/snapshots/{sys_id}/validate")
    }

    pub fn snapshot_publish(sys_id: &str) -> String {
        format!("/api/sn_cdm/snapshots/{sys_id}/publish")
    }
}

/// Identifier of a committed (or committable) changeset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangesetNumber(String);

impl ChangesetNumber {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChangesetNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `{"result": ...}` wrapper used by every endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub(crate) result: T,
}

/// Collaborators shared by every stage of one run.
pub struct Session<'a> {
    transport: &'a dyn Transport,
    sleeper: &'a dyn Sleeper,
    outputs: &'a dyn OutputSink,
    polling: crate::config::PollingConfig,
}

impl<'a> Session<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        sleeper: &'a dyn Sleeper,
        outputs: &'a dyn OutputSink,
        polling: crate::config::PollingConfig,
    ) -> Self {
        Self {
            transport,
            sleeper,
            outputs,
            polling,
        }
    }

    /// Send a request and decode the `result` member of the response.
    pub(crate) fn fetch<T: DeserializeOwned>(&self, request: &Request) -> Result<T, TransportError> {
        let value = self.transport.send(request)?;
        tracing::debug!(path = %request.path, response = %value, "API response");
        let envelope: Envelope<T> = crate::transport::decode(&request.path, value)?;
        Ok(envelope.result)
    }

    /// Send a request whose response body is not needed.
    pub(crate) fn send(&self, request: &Request) -> Result<(), TransportError> {
        let value = self.transport.send(request)?;
        tracing::debug!(path = %request.path, response = %value, "API response");
        Ok(())
    }

    pub(crate) fn set_output(&self, name: &str, value: &str) -> PipelineResult<()> {
        self.outputs.set(name, value)
    }
}

/// Where a run stopped and what it produced.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Upload finished but a gate input stopped the pipeline.
    Uploaded {
        changeset: ChangesetNumber,
        reason: StopReason,
    },
    /// Every stage ran and the report was written.
    Reported {
        changeset: ChangesetNumber,
        snapshot_name: String,
        validation: ValidationState,
        published: bool,
        report_files: Vec<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    AutoCommitDisabled,
    AutoValidateDisabled,
}

/// Drive one changeset through every stage.
pub fn run_pipeline(config: &PipelineConfig, session: &Session<'_>) -> PipelineResult<RunOutcome> {
    let upload = UploadRequest {
        pattern: &config.config_file_path,
        target: config.target,
        app_name: &config.app_name,
        deployable_name: Some(config.deployable_name.as_str()),
        collection_name: config.collection_name.as_deref(),
        data_format: &config.data_format,
        auto_commit: config.auto_commit,
        name_path: config.name_path.as_deref(),
        changeset: config.changeset.clone(),
        data_format_attributes: config.data_format_attributes.as_deref(),
    };
    let changeset = session.upload_config(&upload)?;

    if !config.auto_commit {
        tracing::info!(
            "The auto-commit input argument is set to false. Further evaluation of the action was stopped."
        );
        return Ok(RunOutcome::Uploaded {
            changeset,
            reason: StopReason::AutoCommitDisabled,
        });
    }
    if !config.auto_validate {
        tracing::info!(
            "The auto-validate input argument is set to false. Further evaluation of the action was stopped."
        );
        return Ok(RunOutcome::Uploaded {
            changeset,
            reason: StopReason::AutoValidateDisabled,
        });
    }

    let snapshot = session.fetch_snapshot(&config.app_name, &config.deployable_name, &changeset)?;
    let validation = session.validate_snapshot(&snapshot, config.validation_timeout_minutes)?;

    let published = if config.auto_publish {
        session.publish_snapshot(validation, &snapshot)?
    } else {
        tracing::info!(
            "The auto-publish input argument is set to false. No snapshot will be published in this action."
        );
        false
    };

    let aggregated = session.fetch_validation_results(
        &config.app_name,
        &config.deployable_name,
        validation,
        published,
        &snapshot,
        &config.output_dir,
    )?;

    if config.terminate_on_policy_failure && !validation.is_pass() {
        return Err(PipelineError::PolicyValidationFailed {
            snapshot: snapshot.name,
            state: validation,
        });
    }

    Ok(RunOutcome::Reported {
        changeset,
        snapshot_name: snapshot.name,
        validation,
        published: aggregated.report.published,
        report_files: aggregated.files,
    })
}
