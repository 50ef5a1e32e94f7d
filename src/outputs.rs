//! Pipeline outputs and report files.
//!
//! Named outputs (`changeset-number`, `snapshot-name`, ...) go to the CI
//! output file when one is configured, otherwise to stdout.
use crate::error::{PipelineError, PipelineResult};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const CHANGESET_NUMBER: &str = "changeset-number";
pub const SNAPSHOT_NAME: &str = "snapshot-name";
pub const VALIDATION_STATUS: &str = "validation-status";
pub const VALIDATION_RESULTS: &str = "validation-results";

pub const VALIDATION_RESULTS_JSON_FILE: &str = "validation-results.json";
pub const VALIDATION_RESULTS_SARIF_FILE: &str = "validation-results.sarif";

const GITHUB_OUTPUT_ENV: &str = "GITHUB_OUTPUT";
const MULTILINE_DELIMITER: &str = "CDM_GATE_EOF";

pub trait OutputSink {
    fn set(&self, name: &str, value: &str) -> PipelineResult<()>;
}

/// Appends `name=value` records to the file named by `$GITHUB_OUTPUT`.
pub struct GithubOutputs {
    path: PathBuf,
}

impl GithubOutputs {
    pub fn from_env() -> Option<Self> {
        std::env::var_os(GITHUB_OUTPUT_ENV)
            .filter(|value| !value.is_empty())
            .map(|value| Self {
                path: PathBuf::from(value),
            })
    }
}

impl OutputSink for GithubOutputs {
    fn set(&self, name: &str, value: &str) -> PipelineResult<()> {
        let record = format_record(name, value);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| write_error(&self.path, source))?;
        file.write_all(record.as_bytes())
            .map_err(|source| write_error(&self.path, source))?;
        tracing::debug!(name, "output recorded");
        Ok(())
    }
}

pub struct StdoutOutputs;

impl OutputSink for StdoutOutputs {
    fn set(&self, name: &str, value: &str) -> PipelineResult<()> {
        println!("{name}={value}");
        Ok(())
    }
}

/// Multi-line values use the heredoc form so they survive the line format.
fn format_record(name: &str, value: &str) -> String {
    if value.contains('\n') {
        format!("{name}<<{MULTILINE_DELIMITER}\n{value}\n{MULTILINE_DELIMITER}\n")
    } else {
        format!("{name}={value}\n")
    }
}

/// Write `value` as pretty JSON to `dir/file_name`, creating `dir` if needed.
pub fn write_json_file(
    dir: &Path,
    file_name: &str,
    value: &serde_json::Value,
) -> PipelineResult<PathBuf> {
    fs::create_dir_all(dir).map_err(|source| write_error(dir, source))?;
    let path = dir.join(file_name);
    let text = serde_json::to_string_pretty(value).map_err(|source| {
        PipelineError::Serialization {
            what: "report file",
            source,
        }
    })?;
    fs::write(&path, text.as_bytes()).map_err(|source| write_error(&path, source))?;
    Ok(path)
}

fn write_error(path: &Path, source: std::io::Error) -> PipelineError {
    PipelineError::Write {
        path: path.to_path_buf(),
        source,
    }
}
