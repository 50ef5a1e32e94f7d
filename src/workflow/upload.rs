//! Artifact upload and upload-job tracking.
//!
//! Every artifact matching the configured pattern is posted in order; each
//! upload is polled to a terminal state before the next one starts so the
//! changeset number can be carried forward.
use super::{api, ChangesetNumber, Session};
use crate::config::TargetKind;
use crate::error::{PipelineError, PipelineResult};
use crate::name_path;
use crate::outputs;
use crate::poll::poll;
use crate::state::UploadState;
use crate::transport::{Request, TransportError};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Component, Path, PathBuf};

const IGNORED_DIR: &str = "node_modules";

/// Inputs for one batch of uploads.
#[derive(Debug, Clone)]
pub struct UploadRequest<'a> {
    pub pattern: &'a str,
    pub target: TargetKind,
    pub app_name: &'a str,
    pub deployable_name: Option<&'a str>,
    pub collection_name: Option<&'a str>,
    pub data_format: &'a str,
    pub auto_commit: bool,
    pub name_path: Option<&'a str>,
    pub changeset: Option<ChangesetNumber>,
    pub data_format_attributes: Option<&'a str>,
}

/// One artifact ready to post.
#[derive(Debug)]
struct UploadJob {
    artifact: PathBuf,
    content: String,
    name_path: String,
    is_last: bool,
}

#[derive(Debug, Deserialize)]
struct UploadAccepted {
    upload_id: String,
}

#[derive(Debug, Deserialize)]
struct UploadStatus {
    state: UploadState,
    #[serde(default)]
    output: Value,
}

impl Session<'_> {
    /// Upload every artifact and return the changeset the last one landed in.
    pub fn upload_config(&self, request: &UploadRequest<'_>) -> PipelineResult<ChangesetNumber> {
        tracing::info!("UploadConfig begins....");
        let jobs = prepare_jobs(request)?;
        let endpoint = format!("{}/{}", api::UPLOADS, request.target.upload_segment());

        let mut changeset = request.changeset.clone();
        for job in &jobs {
            let upload_id = self.start_upload(&endpoint, request, job, changeset.as_ref())?;
            changeset = Some(self.wait_for_upload(&upload_id)?);
        }

        let changeset = changeset.ok_or_else(|| {
            PipelineError::Config(format!("No files found for configFilePath: {}", request.pattern))
        })?;
        self.set_output(outputs::CHANGESET_NUMBER, changeset.as_str())?;
        Ok(changeset)
    }

    fn start_upload(
        &self,
        endpoint: &str,
        request: &UploadRequest<'_>,
        job: &UploadJob,
        changeset: Option<&ChangesetNumber>,
    ) -> PipelineResult<String> {
        tracing::info!(artifact = %job.artifact.display(), name_path = %job.name_path, "Effective namePath");
        let auto_commit = request.auto_commit && job.is_last;
        let post = Request::post(endpoint)
            .query("appName", request.app_name)
            .query("dataFormat", request.data_format)
            .query("autoValidate", "false")
            .query("publishOption", "publish_none")
            .query_opt("collectionName", request.collection_name)
            .query_opt("deployableName", request.deployable_name)
            .query_opt("dataFormatAttributes", request.data_format_attributes)
            .query("autoDelete", "true")
            .query("deleteRedundantOverrides", "false")
            .query("ignoreAttributes", "false")
            .query("autoCommit", auto_commit.to_string())
            .query_opt("changesetNumber", changeset.map(ChangesetNumber::as_str))
            .query("namePath", job.name_path.as_str())
            .body(job.content.as_str());
        let accepted: UploadAccepted = self.fetch(&post)?;
        tracing::info!(upload_id = %accepted.upload_id, "upload accepted");
        Ok(accepted.upload_id)
    }

    fn wait_for_upload(&self, upload_id: &str) -> PipelineResult<ChangesetNumber> {
        let status_request = Request::get(format!("{}/{upload_id}", api::UPLOAD_STATUS));
        let status = poll(
            &self.polling.upload,
            self.sleeper,
            || self.fetch::<UploadStatus>(&status_request),
            |status| status.state.is_terminal(),
        )
        .ok_or_else(|| PipelineError::UploadNotProcessed {
            upload_id: upload_id.to_string(),
        })?;
        tracing::info!(upload_id, state = ?status.state, "upload status");

        match status.state {
            UploadState::Completed => status
                .output
                .get("number")
                .and_then(Value::as_str)
                .map(ChangesetNumber::new)
                .ok_or_else(|| {
                    TransportError::decode(&status_request.path, "completed upload has no output.number")
                        .into()
                }),
            UploadState::Expired => Err(PipelineError::UploadExpired {
                upload_id: upload_id.to_string(),
            }),
            _ => Err(PipelineError::UploadFailed {
                upload_id: upload_id.to_string(),
                detail: describe_output(&status.output),
            }),
        }
    }
}

/// Files matching `pattern`, skipping directories and `node_modules`.
pub fn resolve_artifacts(pattern: &str) -> PipelineResult<Vec<PathBuf>> {
    let entries = glob::glob(pattern).map_err(|err| {
        PipelineError::Config(format!(
            "Error while trying to fetch the files matching the pattern {pattern} : {err}"
        ))
    })?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|err| {
            PipelineError::Config(format!(
                "Error while trying to fetch the files matching the pattern {pattern} : {err}"
            ))
        })?;
        if path.is_file() && !is_ignored(&path) {
            files.push(path);
        }
    }
    files.sort();
    files.dedup();
    if files.is_empty() {
        return Err(PipelineError::Config(format!(
            "No files found for configFilePath: {pattern}"
        )));
    }
    Ok(files)
}

fn is_ignored(path: &Path) -> bool {
    path.components()
        .any(|component| matches!(component, Component::Normal(name) if name == IGNORED_DIR))
}

/// Resolve and read every artifact before the first remote call.
fn prepare_jobs(request: &UploadRequest<'_>) -> PipelineResult<Vec<UploadJob>> {
    let files = resolve_artifacts(request.pattern)?;
    let last = files.len() - 1;
    files
        .into_iter()
        .enumerate()
        .map(|(index, artifact)| {
            let content = fs::read_to_string(&artifact).map_err(|err| {
                PipelineError::Config(format!(
                    "Error while reading the content from the file {} : {err}",
                    artifact.display()
                ))
            })?;
            let file_name = artifact
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(UploadJob {
                name_path: name_path::for_artifact(request.name_path, &file_name),
                content,
                artifact,
                is_last: index == last,
            })
        })
        .collect()
}

fn describe_output(output: &Value) -> String {
    match output {
        Value::String(text) => text.clone(),
        Value::Null => "unknown error".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "upload_tests.rs"]
mod tests;
