//! Resolve the snapshot a changeset produced for the target deployable.
//!
//! Order matters: impact check first, then the generation wait, then the
//! lookup by changeset. Anything else falls back to the deployable's latest
//! snapshot.
use super::{api, ChangesetNumber, Session};
use crate::error::{PipelineError, PipelineResult};
use crate::outputs;
use crate::poll::poll;
use crate::query::EncodedQuery;
use crate::state::{
    deserialize_flag, deserialize_recorded_validation, SnapshotGenerationState, ValidationState,
};
use crate::transport::Request;
use serde::{Deserialize, Serialize};

const SNAPSHOT_FIELDS: &str = "sys_id,name,validation,published,sys_created_on";

/// Snapshot row as fetched; re-fetched rather than mutated.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SnapshotRecord {
    pub sys_id: String,
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub published: bool,
    #[serde(default, deserialize_with = "deserialize_recorded_validation")]
    pub validation: ValidationState,
    #[serde(default, rename = "sys_created_on")]
    pub created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImpactedDeployable {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChangesetRow {
    snapshot_status: SnapshotGenerationState,
}

/// Impact of a changeset relative to the target deployable.
#[derive(Debug, PartialEq, Eq)]
struct Impact {
    target: bool,
    others: Vec<String>,
}

impl Session<'_> {
    pub fn fetch_snapshot(
        &self,
        app_name: &str,
        deployable_name: &str,
        changeset: &ChangesetNumber,
    ) -> PipelineResult<SnapshotRecord> {
        tracing::info!("FetchSnapshot begins....");
        let impact = self.impacted_deployables(changeset, deployable_name)?;
        if impact.target {
            let generation = self.wait_for_snapshot_generation(changeset)?;
            if generation == SnapshotGenerationState::Created {
                tracing::info!(%changeset, "Snapshot created successfully");
                return self.snapshot_by_changeset(app_name, deployable_name, changeset);
            }
            tracing::info!(%changeset, "No new snapshot created for changeset");
        }
        self.latest_snapshot(app_name, deployable_name)
    }

    fn impacted_deployables(
        &self,
        changeset: &ChangesetNumber,
        deployable_name: &str,
    ) -> PipelineResult<Impact> {
        let request = Request::get(api::IMPACTED_DEPLOYABLES)
            .query("changesetNumber", changeset.as_str())
            .query("returnFields", "sys_id,name,state");
        let rows: Vec<ImpactedDeployable> = self.fetch(&request)?;
        let impact = classify_impact(&rows, deployable_name);

        if !impact.others.is_empty() {
            let others = impact.others.join(", ");
            if impact.target {
                tracing::warn!(
                    "The config data was uploaded and will be validated against the deployable '{deployable_name}'. However the impacted deployables are '{deployable_name}, {others}'."
                );
            } else {
                tracing::warn!(
                    "Deployable '{deployable_name}' was not impacted with the changeset {changeset}. However the impacted deployables are '{others}' and no validation will be performed on them."
                );
            }
        }
        if impact.target {
            tracing::info!(deployable = deployable_name, "Deployable is impacted");
        } else {
            tracing::info!(%changeset, deployable = deployable_name, "Deployable is not impacted by the changeset");
        }
        Ok(impact)
    }

    fn wait_for_snapshot_generation(
        &self,
        changeset: &ChangesetNumber,
    ) -> PipelineResult<SnapshotGenerationState> {
        let request = Request::get(api::CHANGESET_TABLE)
            .query(
                "sysparm_query",
                EncodedQuery::new().eq("number", changeset.as_str()).build(),
            )
            .query("sysparm_fields", "number,sys_id,snapshot_status");
        let rows = poll(
            &self.polling.generation,
            self.sleeper,
            || self.fetch::<Vec<ChangesetRow>>(&request),
            |rows| {
                rows.first()
                    .is_some_and(|row| row.snapshot_status.is_terminal())
            },
        );
        let state = rows
            .and_then(|rows| rows.first().map(|row| row.snapshot_status))
            .ok_or_else(|| PipelineError::SnapshotGenerationPending {
                changeset: changeset.to_string(),
            })?;
        if state == SnapshotGenerationState::Error {
            return Err(PipelineError::SnapshotGenerationFailed {
                changeset: changeset.to_string(),
            });
        }
        Ok(state)
    }

    fn snapshot_by_changeset(
        &self,
        app_name: &str,
        deployable_name: &str,
        changeset: &ChangesetNumber,
    ) -> PipelineResult<SnapshotRecord> {
        tracing::info!("Fetching the snapshot with changesetNumber..");
        let query = EncodedQuery::new()
            .eq("changeset_id.number", changeset.as_str())
            .eq("cdm_deployable_id.name", deployable_name)
            .build();
        let request = Request::get(api::SNAPSHOT_TABLE)
            .query("sysparm_query", query)
            .query("sysparm_fields", SNAPSHOT_FIELDS);
        let rows: Vec<SnapshotRecord> = self.fetch(&request)?;
        let record = rows.into_iter().next().ok_or_else(|| {
            PipelineError::SnapshotNotFound(format!(
                "The snapshot with changeset number : {changeset} of deployable : {deployable_name} in the application {app_name} is not found."
            ))
        })?;
        self.resolved(record)
    }

    fn latest_snapshot(&self, app_name: &str, deployable_name: &str) -> PipelineResult<SnapshotRecord> {
        tracing::info!("Fetching the latest snapshot..");
        let query = EncodedQuery::new()
            .eq("cdm_application_id.name", app_name)
            .eq("cdm_deployable_id.name", deployable_name)
            .order_by_desc("sys_created_on")
            .build();
        let request = Request::get(api::SNAPSHOT_TABLE)
            .query("sysparm_query", query)
            .query("sysparm_fields", SNAPSHOT_FIELDS)
            .query("sysparm_limit", "1");
        let rows: Vec<SnapshotRecord> = self.fetch(&request)?;
        let record = rows.into_iter().next().ok_or_else(|| {
            PipelineError::SnapshotNotFound(format!(
                "The latest snapshot of deployable {deployable_name} in the application {app_name} is not found."
            ))
        })?;
        self.resolved(record)
    }

    fn resolved(&self, record: SnapshotRecord) -> PipelineResult<SnapshotRecord> {
        tracing::info!(
            sys_id = %record.sys_id,
            name = %record.name,
            validation = %record.validation,
            published = record.published,
            "Snapshot found"
        );
        self.set_output(outputs::SNAPSHOT_NAME, &record.name)?;
        Ok(record)
    }
}

fn classify_impact(rows: &[ImpactedDeployable], deployable_name: &str) -> Impact {
    let mut impact = Impact {
        target: false,
        others: Vec::new(),
    };
    let names = rows
        .iter()
        .filter_map(|row| row.name.as_deref())
        .map(str::trim)
        .filter(|name| !name.is_empty());
    for name in names {
        if name.eq_ignore_ascii_case(deployable_name) {
            impact.target = true;
        } else {
            impact.others.push(name.to_string());
        }
    }
    impact
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
