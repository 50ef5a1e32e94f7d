//! Report documents built from aggregated policy results.
//!
//! Both shapers are pure: the aggregation layer decides ordering and
//! severity, this module only lays the values out.
use crate::state::{deserialize_text, PolicyDecision, Severity, ValidationState};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const SARIF_SCHEMA: &str =
    "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/master/Schemata/sarif-schema-2.1.0.json";
pub const SARIF_VERSION: &str = "2.1.0";
pub const TOOL_NAME: &str = "Devops config policy content pack";
pub const TOOL_VERSION: &str = "1.2.0";

/// One row of `sn_cdm_policy_validation_result`, keyed as the table API returns it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PolicyResult {
    #[serde(
        rename = "snapshot.application_id.name",
        default,
        deserialize_with = "deserialize_text"
    )]
    pub application_name: String,
    #[serde(rename = "policy.name")]
    pub policy_name: String,
    #[serde(rename = "snapshot.name", default, deserialize_with = "deserialize_text")]
    pub snapshot_name: String,
    #[serde(rename = "impacted_node.name", default, deserialize_with = "deserialize_text")]
    pub impacted_node: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub node_path: String,
    #[serde(rename = "policy_execution.output", default, deserialize_with = "deserialize_text")]
    pub output: String,
}

/// A fetched row with the classification derived from its execution payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    #[serde(flatten)]
    pub row: PolicyResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<PolicyDecision>,
    pub severity: Severity,
}

impl ReportEntry {
    fn is_finding(&self) -> bool {
        matches!(self.severity, Severity::Failure | Severity::Warning)
    }
}

/// Everything the two documents need about one validated snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub sys_id: String,
    pub name: String,
    pub app_name: String,
    pub deployable_name: String,
    pub published: bool,
    pub validation: ValidationState,
    /// Failed groups, then warning groups, then the rest.
    pub result: Vec<ReportEntry>,
}

impl ValidationReport {
    fn rule_id(&self, entry: &ReportEntry) -> String {
        format!("{}:{}", self.name, entry.row.policy_name)
    }
}

pub fn json_report(report: &ValidationReport) -> Value {
    json!({
        "sys_id": report.sys_id,
        "name": report.name,
        "deployableName": report.deployable_name,
        "published": report.published,
        "validation": report.validation,
        "result": report.result,
    })
}

/// SARIF 2.1.0 log with one rule per offending policy and one result per offending row.
pub fn sarif_document(report: &ValidationReport) -> Value {
    let mut rules: Vec<Value> = Vec::new();
    let mut rule_ids: Vec<String> = Vec::new();
    let mut results = Vec::new();

    for entry in report.result.iter().filter(|entry| entry.is_finding()) {
        let rule_id = report.rule_id(entry);
        let level = entry.severity.sarif_level();
        if !rule_ids.contains(&rule_id) {
            rules.push(json!({
                "id": rule_id,
                "name": entry.row.policy_name,
                "shortDescription": { "text": rule_id },
                "fullDescription": {
                    "text": format!(
                        "application.name: {}, snapshot.name: {}",
                        report.app_name, report.name
                    )
                },
                "defaultConfiguration": { "level": level },
            }));
            rule_ids.push(rule_id.clone());
        }
        results.push(json!({
            "ruleId": rule_id,
            "kind": "fail",
            "level": level,
            "message": { "text": entry.row.output },
            "locations": [{
                "physicalLocation": {
                    "artifactLocation": { "uri": report.name }
                }
            }],
        }));
    }

    json!({
        "$schema": SARIF_SCHEMA,
        "version": SARIF_VERSION,
        "runs": [{
            "tool": {
                "driver": {
                    "name": TOOL_NAME,
                    "fullName": TOOL_NAME,
                    "version": TOOL_VERSION,
                    "rules": rules,
                }
            },
            "results": results,
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(policy: &str, severity: Severity, output: &str) -> ReportEntry {
        ReportEntry {
            row: PolicyResult {
                application_name: "shop".to_string(),
                policy_name: policy.to_string(),
                snapshot_name: "Production-v3.dpl".to_string(),
                impacted_node: "node".to_string(),
                node_path: "/a/b".to_string(),
                output: output.to_string(),
            },
            decision: None,
            severity,
        }
    }

    fn report(result: Vec<ReportEntry>) -> ValidationReport {
        ValidationReport {
            sys_id: "snap-1".to_string(),
            name: "Production-v3.dpl".to_string(),
            app_name: "shop".to_string(),
            deployable_name: "Production".to_string(),
            published: false,
            validation: ValidationState::Failed,
            result,
        }
    }

    #[test]
    fn json_report_keeps_identity_and_row_keys() {
        let value = json_report(&report(vec![entry("A", Severity::Failure, "{}")]));
        assert_eq!(value["sys_id"], "snap-1");
        assert_eq!(value["deployableName"], "Production");
        assert_eq!(value["validation"], "failed");
        assert_eq!(value["published"], false);
        assert_eq!(value["result"][0]["policy.name"], "A");
        assert_eq!(value["result"][0]["severity"], "failure");
        assert!(value["result"][0].get("decision").is_none());
    }

    #[test]
    fn sarif_rules_are_distinct_and_results_per_row() {
        let value = sarif_document(&report(vec![
            entry("A", Severity::Failure, "first"),
            entry("A", Severity::Failure, "second"),
            entry("B", Severity::Warning, "third"),
            entry("C", Severity::Info, "fourth"),
        ]));
        let run = &value["runs"][0];
        let rules = run["tool"]["driver"]["rules"].as_array().expect("rules");
        let results = run["results"].as_array().expect("results");

        assert_eq!(value["version"], "2.1.0");
        assert_eq!(run["tool"]["driver"]["name"], TOOL_NAME);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0]["id"], "Production-v3.dpl:A");
        assert_eq!(rules[0]["defaultConfiguration"]["level"], "error");
        assert_eq!(rules[1]["defaultConfiguration"]["level"], "warning");
        assert_eq!(results.len(), 3);
        assert_eq!(results[1]["message"]["text"], "second");
        assert_eq!(results[2]["level"], "warning");
        assert_eq!(
            results[0]["locations"][0]["physicalLocation"]["artifactLocation"]["uri"],
            "Production-v3.dpl"
        );
    }

    #[test]
    fn clean_report_has_no_findings() {
        let value = sarif_document(&report(vec![entry("C", Severity::Info, "ok")]));
        assert_eq!(value["runs"][0]["results"], json!([]));
        assert_eq!(value["runs"][0]["tool"]["driver"]["rules"], json!([]));
    }
}
