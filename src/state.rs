//! Remote state machines as closed enumerations.
//!
//! Each machine carries its own terminal set so polling loops never compare
//! raw status strings.
use serde::de::value::StrDeserializer;
use serde::de::IntoDeserializer;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Upload job state reported by `upload-status/{id}`.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    Pending,
    InProgress,
    Completed,
    Error,
    Expired,
    #[serde(other)]
    Other,
}

impl UploadState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UploadState::Completed | UploadState::Error | UploadState::Expired
        )
    }
}

/// `snapshot_status` of a changeset record.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotGenerationState {
    Created,
    Error,
    None,
    #[serde(other)]
    Pending,
}

impl SnapshotGenerationState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SnapshotGenerationState::Pending)
    }
}

/// `validation` field of a snapshot record.
#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValidationState {
    Requested,
    #[default]
    NotValidated,
    InProgress,
    Passed,
    PassedWithException,
    Failed,
    ExecutionError,
}

impl ValidationState {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationState::Requested => "requested",
            ValidationState::NotValidated => "not_validated",
            ValidationState::InProgress => "in_progress",
            ValidationState::Passed => "passed",
            ValidationState::PassedWithException => "passed_with_exception",
            ValidationState::Failed => "failed",
            ValidationState::ExecutionError => "execution_error",
        }
    }

    /// No further transition is expected once this returns true.
    pub fn is_terminal(self) -> bool {
        !matches!(
            self,
            ValidationState::Requested | ValidationState::InProgress
        )
    }

    /// States that make a snapshot eligible for publishing.
    pub fn is_pass(self) -> bool {
        matches!(
            self,
            ValidationState::Passed | ValidationState::PassedWithException
        )
    }
}

impl fmt::Display for ValidationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision recorded in a policy execution payload.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PolicyDecision {
    Compliant,
    CompliantWithException,
    NonCompliant,
    #[serde(other)]
    Other,
}

/// Severity bucket a policy row is reported under.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Failure,
    Warning,
    Info,
}

impl Severity {
    /// Payload `type` values; anything unrecognized is informational.
    pub fn from_type(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "failure" | "error" => Severity::Failure,
            "warning" => Severity::Warning,
            _ => Severity::Info,
        }
    }

    /// SARIF `level` for findings in this bucket.
    pub fn sarif_level(self) -> &'static str {
        match self {
            Severity::Failure => "error",
            Severity::Warning => "warning",
            Severity::Info => "note",
        }
    }
}

/// Table API booleans arrive as `"true"`/`"false"` strings; accept both forms.
pub fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(value)) => value,
        Some(Flag::Text(text)) => text.trim().eq_ignore_ascii_case("true"),
        None => false,
    })
}

/// Table API strings may come back as `null`; treat that as empty.
pub fn deserialize_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A snapshot that was never validated may carry an empty or null `validation`.
pub fn deserialize_recorded_validation<'de, D>(deserializer: D) -> Result<ValidationState, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(text) if !text.trim().is_empty() => {
            let value: StrDeserializer<'_, D::Error> = text.trim().into_deserializer();
            ValidationState::deserialize(value)
        }
        _ => Ok(ValidationState::NotValidated),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_terminal_and_pass_sets() {
        let terminal: Vec<_> = [
            ValidationState::Requested,
            ValidationState::NotValidated,
            ValidationState::InProgress,
            ValidationState::Passed,
            ValidationState::PassedWithException,
            ValidationState::Failed,
            ValidationState::ExecutionError,
        ]
        .into_iter()
        .filter(|state| state.is_terminal())
        .collect();
        assert_eq!(
            terminal,
            vec![
                ValidationState::NotValidated,
                ValidationState::Passed,
                ValidationState::PassedWithException,
                ValidationState::Failed,
                ValidationState::ExecutionError,
            ]
        );
        assert!(ValidationState::PassedWithException.is_pass());
        assert!(!ValidationState::NotValidated.is_pass());
    }

    #[test]
    fn unknown_generation_status_is_not_terminal() {
        let state: SnapshotGenerationState =
            serde_json::from_str("\"in_progress\"").expect("parse status");
        assert_eq!(state, SnapshotGenerationState::Pending);
        assert!(!state.is_terminal());
        let state: SnapshotGenerationState = serde_json::from_str("\"none\"").expect("parse none");
        assert!(state.is_terminal());
    }

    #[test]
    fn unknown_validation_state_is_rejected() {
        assert!(serde_json::from_str::<ValidationState>("\"bogus\"").is_err());
    }

    #[test]
    fn flag_accepts_strings_and_bools() {
        #[derive(Deserialize)]
        struct Row {
            #[serde(deserialize_with = "deserialize_flag")]
            published: bool,
        }
        let row: Row = serde_json::from_str(r#"{"published":"true"}"#).expect("string flag");
        assert!(row.published);
        let row: Row = serde_json::from_str(r#"{"published":false}"#).expect("bool flag");
        assert!(!row.published);
        let row: Row = serde_json::from_str(r#"{"published":null}"#).expect("null flag");
        assert!(!row.published);
    }

    #[test]
    fn blank_recorded_validation_means_not_validated() {
        #[derive(Deserialize)]
        struct Row {
            #[serde(default, deserialize_with = "deserialize_recorded_validation")]
            validation: ValidationState,
        }
        for raw in [r#"{"validation":""}"#, r#"{"validation":null}"#, "{}"] {
            let row: Row = serde_json::from_str(raw).expect("blank validation");
            assert_eq!(row.validation, ValidationState::NotValidated, "{raw}");
        }
        let row: Row =
            serde_json::from_str(r#"{"validation":" passed "}"#).expect("known validation");
        assert_eq!(row.validation, ValidationState::Passed);
        assert!(serde_json::from_str::<Row>(r#"{"validation":"bogus"}"#).is_err());
    }

    #[test]
    fn null_text_decodes_as_empty() {
        #[derive(Deserialize)]
        struct Row {
            #[serde(default, deserialize_with = "deserialize_text")]
            output: String,
        }
        let row: Row = serde_json::from_str(r#"{"output":null}"#).expect("null text");
        assert_eq!(row.output, "");
        let row: Row = serde_json::from_str(r#"{"output":"{}"}"#).expect("text");
        assert_eq!(row.output, "{}");
    }
}
