//! Validated run configuration.
//!
//! Everything here is checked before the first remote call so a bad input
//! never leaves a half-uploaded changeset behind.
use crate::cli::RunArgs;
use crate::error::{PipelineError, PipelineResult};
use crate::poll::{BackoffMode, PollPolicy};
use crate::transport::Credentials;
use crate::workflow::ChangesetNumber;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const UPLOAD_POLL_ATTEMPTS: u32 = 70;
pub const UPLOAD_POLL_INTERVAL_MS: u64 = 7_000;
pub const GENERATION_POLL_ATTEMPTS: u32 = 25;
pub const GENERATION_POLL_INTERVAL_MS: u64 = 5_000;
pub const VALIDATION_POLL_INTERVAL_MS: u64 = 60_000;
pub const BACKOFF_MAX_INTERVAL_MS: u64 = 60_000;

/// Upload endpoint family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Component,
    Collection,
    Deployable,
}

impl TargetKind {
    /// Path segment under `/api/sn_cdm/applications/uploads/`.
    pub fn upload_segment(self) -> &'static str {
        match self {
            TargetKind::Component => "components",
            TargetKind::Collection => "collections",
            TargetKind::Deployable => "deployables",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TargetKind::Component => "component",
            TargetKind::Collection => "collection",
            TargetKind::Deployable => "deployable",
        })
    }
}

impl FromStr for TargetKind {
    type Err = PipelineError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "component" => Ok(TargetKind::Component),
            "collection" => Ok(TargetKind::Collection),
            "deployable" => Ok(TargetKind::Deployable),
            other => Err(PipelineError::Config(format!(
                "The input parameter target should be one of: component, collection, or deployable. The target provided is {other}."
            ))),
        }
    }
}

/// Poll policies for each waiting stage.
#[derive(Debug, Clone, Copy)]
pub struct PollingConfig {
    pub upload: PollPolicy,
    pub generation: PollPolicy,
    pub validation_interval: Duration,
}

impl PollingConfig {
    pub fn with_mode(mode: BackoffMode) -> Self {
        let cap = Duration::from_millis(BACKOFF_MAX_INTERVAL_MS);
        Self {
            upload: PollPolicy::fixed(
                UPLOAD_POLL_ATTEMPTS,
                Duration::from_millis(UPLOAD_POLL_INTERVAL_MS),
            )
            .with_mode(mode)
            .capped_at(cap),
            generation: PollPolicy::fixed(
                GENERATION_POLL_ATTEMPTS,
                Duration::from_millis(GENERATION_POLL_INTERVAL_MS),
            )
            .with_mode(mode)
            .capped_at(cap),
            validation_interval: Duration::from_millis(VALIDATION_POLL_INTERVAL_MS),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self::with_mode(BackoffMode::Fixed)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub instance_url: String,
    pub credentials: Credentials,
    pub target: TargetKind,
    pub app_name: String,
    pub deployable_name: String,
    pub collection_name: Option<String>,
    pub data_format: String,
    pub data_format_attributes: Option<String>,
    pub config_file_path: String,
    pub name_path: Option<String>,
    pub changeset: Option<ChangesetNumber>,
    pub auto_commit: bool,
    pub auto_validate: bool,
    pub auto_publish: bool,
    pub validation_timeout_minutes: f64,
    pub terminate_on_policy_failure: bool,
    pub output_dir: PathBuf,
    pub polling: PollingConfig,
    pub http_timeout: Duration,
}

impl PipelineConfig {
    pub fn from_args(args: RunArgs) -> PipelineResult<Self> {
        let validation_timeout_minutes = parse_timeout(&args.snapshot_validation_timeout)?;
        let target = args.target.parse::<TargetKind>()?;
        let instance_url = normalize_instance_url(&args.instance_url)?;
        Ok(Self {
            instance_url,
            credentials: Credentials::new(args.username, args.password),
            target,
            app_name: required("application-name", args.application_name)?,
            deployable_name: required("deployable-name", args.deployable_name)?,
            collection_name: non_blank(args.collection_name),
            data_format: required("data-format", args.data_format)?,
            data_format_attributes: non_blank(args.data_format_attributes),
            config_file_path: required("config-file-path", args.config_file_path)?,
            name_path: non_blank(args.name_path),
            changeset: non_blank(args.changeset).map(ChangesetNumber::new),
            auto_commit: args.auto_commit,
            auto_validate: args.auto_validate,
            auto_publish: args.auto_publish,
            validation_timeout_minutes,
            terminate_on_policy_failure: args.terminate_on_policy_validation_failures,
            output_dir: args.output_dir,
            polling: PollingConfig::with_mode(args.backoff),
            http_timeout: Duration::from_secs(args.http_timeout.max(1)),
        })
    }
}

/// Timeout in minutes; must be a number greater than zero that fits a `Duration`.
pub fn parse_timeout(raw: &str) -> PipelineResult<f64> {
    let invalid = || {
        PipelineError::Config(format!(
            "The value of snapshot-validation-timeout flag should be a number greater than 0. Value is {raw}. Further evaluation of the action is stopped."
        ))
    };
    let minutes = raw.trim().parse::<f64>().map_err(|_| invalid())?;
    if !(minutes.is_finite() && minutes > 0.0) {
        return Err(invalid());
    }
    timeout_budget(minutes).map_err(|_| invalid())?;
    Ok(minutes)
}

/// Wall-clock budget for a timeout given in minutes.
pub fn timeout_budget(minutes: f64) -> PipelineResult<Duration> {
    Duration::try_from_secs_f64(minutes * 60.0).map_err(|err| {
        PipelineError::Config(format!(
            "The snapshot validation timeout of {minutes} minutes is out of range: {err}"
        ))
    })
}

fn normalize_instance_url(raw: &str) -> PipelineResult<String> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Err(PipelineError::Config(
            "The input parameter instance-url is required.".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

fn required(name: &str, value: String) -> PipelineResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::Config(format!(
            "The input parameter {name} is required."
        )));
    }
    Ok(trimmed.to_string())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
