//! Policy validation results: fetch, classify, group, then write the reports.
use super::{api, Session, SnapshotRecord};
use crate::error::{PipelineError, PipelineResult};
use crate::outputs;
use crate::query::EncodedQuery;
use crate::report::{self, PolicyResult, ReportEntry, ValidationReport};
use crate::state::{PolicyDecision, Severity, ValidationState};
use crate::transport::Request;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const RESULT_FIELDS: &str = "snapshot.application_id.name,policy.name,snapshot.name,impacted_node.name,node_path,policy_execution.output";

/// The parts of `policy_execution.output` that drive classification.
#[derive(Debug, Deserialize)]
struct ExecutionPayload {
    #[serde(default)]
    decision: Option<PolicyDecision>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    failures: Vec<Value>,
}

impl ExecutionPayload {
    /// `None` when the policy produced no usable output: blank, `null`, or not an object.
    /// An empty object is a real, if uninformative, execution.
    fn parse(output: &str) -> Option<Self> {
        match serde_json::from_str::<Value>(output).ok()? {
            Value::Null => None,
            Value::String(text) if text.trim().is_empty() => None,
            value => serde_json::from_value(value).ok(),
        }
    }

    fn severity(&self) -> Severity {
        match (&self.kind, self.decision) {
            (Some(kind), _) => Severity::from_type(kind),
            (None, Some(PolicyDecision::NonCompliant)) => Severity::Failure,
            _ => Severity::Info,
        }
    }
}

#[derive(Debug)]
pub struct AggregatedResults {
    pub report: ValidationReport,
    pub files: Vec<PathBuf>,
}

/// Classify every row and order them failed, then warning, then the rest.
///
/// Within a bucket, policies keep the order of their first row; every row is
/// kept.
pub fn group_results(rows: Vec<PolicyResult>) -> Vec<ReportEntry> {
    let mut failed = PolicyGroups::default();
    let mut warning = PolicyGroups::default();
    let mut rest = PolicyGroups::default();

    for row in rows {
        let payload = ExecutionPayload::parse(&row.output);
        let entry = ReportEntry {
            decision: payload.as_ref().and_then(|payload| payload.decision),
            severity: payload
                .as_ref()
                .map_or(Severity::Info, ExecutionPayload::severity),
            row,
        };
        match entry.severity {
            Severity::Failure => failed.push(entry),
            Severity::Warning => warning.push(entry),
            Severity::Info => rest.push(entry),
        }
    }

    failed
        .into_entries()
        .chain(warning.into_entries())
        .chain(rest.into_entries())
        .collect()
}

/// Insertion-ordered groups keyed by policy name.
#[derive(Default)]
struct PolicyGroups {
    groups: Vec<(String, Vec<ReportEntry>)>,
}

impl PolicyGroups {
    fn push(&mut self, entry: ReportEntry) {
        match self
            .groups
            .iter_mut()
            .find(|(policy, _)| *policy == entry.row.policy_name)
        {
            Some((_, entries)) => entries.push(entry),
            None => self
                .groups
                .push((entry.row.policy_name.clone(), vec![entry])),
        }
    }

    fn into_entries(self) -> impl Iterator<Item = ReportEntry> {
        self.groups.into_iter().flat_map(|(_, entries)| entries)
    }
}

impl Session<'_> {
    pub fn fetch_validation_results(
        &self,
        app_name: &str,
        deployable_name: &str,
        validation: ValidationState,
        published: bool,
        snapshot: &SnapshotRecord,
        output_dir: &Path,
    ) -> PipelineResult<AggregatedResults> {
        tracing::info!("FetchValidationResults begins....");
        let query = EncodedQuery::new()
            .eq("snapshot.sys_id", &snapshot.sys_id)
            .eq("is_latest", "true")
            .order_by("policy.name")
            .build();
        let request = Request::get(api::POLICY_VALIDATION_RESULT_TABLE)
            .query("sysparm_query", query)
            .query("sysparm_fields", RESULT_FIELDS);
        let rows: Vec<PolicyResult> = self.fetch(&request)?;
        if rows.is_empty() {
            tracing::warn!(
                "Validation results are empty. No policy validation results found for deployable '{deployable_name}'."
            );
        }

        let result = group_results(rows);
        annotate(&result);

        let report = ValidationReport {
            sys_id: snapshot.sys_id.clone(),
            name: snapshot.name.clone(),
            app_name: app_name.to_string(),
            deployable_name: deployable_name.to_string(),
            published: snapshot.published || published,
            validation,
            result,
        };
        let json_report = report::json_report(&report);
        let sarif = report::sarif_document(&report);

        let files = vec![
            outputs::write_json_file(output_dir, outputs::VALIDATION_RESULTS_JSON_FILE, &json_report)?,
            outputs::write_json_file(output_dir, outputs::VALIDATION_RESULTS_SARIF_FILE, &sarif)?,
        ];
        let compact = serde_json::to_string(&json_report).map_err(|source| {
            PipelineError::Serialization {
                what: "validation results",
                source,
            }
        })?;
        self.set_output(outputs::VALIDATION_RESULTS, &compact)?;
        tracing::info!(
            rows = report.result.len(),
            json = %files[0].display(),
            sarif = %files[1].display(),
            "validation results written"
        );
        Ok(AggregatedResults { report, files })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnnotationLevel {
    Error,
    Warning,
    Notice,
}

/// A workflow log line raised for one policy.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Annotation {
    level: AnnotationLevel,
    message: String,
}

impl Annotation {
    fn new(level: AnnotationLevel, message: String) -> Self {
        Self { level, message }
    }
}

/// One annotation per policy and kind, in report order.
fn annotations(entries: &[ReportEntry]) -> Vec<Annotation> {
    let mut seen: HashSet<(&str, &'static str)> = HashSet::new();
    let mut raised = Vec::new();
    for entry in entries {
        let policy = entry.row.policy_name.as_str();
        let payload = ExecutionPayload::parse(&entry.row.output);
        let Some(payload) = payload else {
            if seen.insert((policy, "missing")) {
                raised.push(Annotation::new(
                    AnnotationLevel::Error,
                    format!("Policy '{policy}' is not executed properly. No execution output found."),
                ));
            }
            continue;
        };
        match entry.severity {
            Severity::Failure if seen.insert((policy, "failure")) => {
                let count = if payload.failures.is_empty() {
                    String::new()
                } else {
                    format!(" Total number of failures messages : {}.", payload.failures.len())
                };
                raised.push(Annotation::new(
                    AnnotationLevel::Error,
                    format!("Policy '{policy}' is found non_compliant.{count} Check the validation results for details."),
                ));
            }
            Severity::Warning if seen.insert((policy, "warning")) => {
                raised.push(Annotation::new(
                    AnnotationLevel::Warning,
                    format!("Policy '{policy}' reported warnings. Check the validation results for details."),
                ));
            }
            _ => {}
        }
        if payload.decision == Some(PolicyDecision::CompliantWithException)
            && seen.insert((policy, "exception"))
        {
            raised.push(Annotation::new(
                AnnotationLevel::Notice,
                format!("Policy '{policy}' is compliant with exception."),
            ));
        }
    }
    raised
}

fn annotate(entries: &[ReportEntry]) {
    for annotation in annotations(entries) {
        match annotation.level {
            AnnotationLevel::Error => tracing::error!("{}", annotation.message),
            AnnotationLevel::Warning => tracing::warn!("{}", annotation.message),
            AnnotationLevel::Notice => tracing::info!("{}", annotation.message),
        }
    }
}
