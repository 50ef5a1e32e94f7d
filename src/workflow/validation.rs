//! Snapshot validation: trigger, then wait inside the configured time budget.
use super::{api, Session, SnapshotRecord};
use crate::config::timeout_budget;
use crate::error::{PipelineError, PipelineResult};
use crate::outputs;
use crate::poll::{poll, PollPolicy};
use crate::state::ValidationState;
use crate::transport::{Request, CONTENT_TYPE_JSON};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ValidationRow {
    validation: ValidationState,
}

impl Session<'_> {
    /// Validate `snapshot` unless it is already published.
    ///
    /// The poll gets `ceil(timeout / interval)` attempts so the whole wait
    /// stays within `timeout_minutes`.
    pub fn validate_snapshot(
        &self,
        snapshot: &SnapshotRecord,
        timeout_minutes: f64,
    ) -> PipelineResult<ValidationState> {
        tracing::info!("ValidateSnapshot begins....");
        if snapshot.published {
            tracing::info!(
                "Snapshot {} is already published. No new validation will be performed.",
                snapshot.name
            );
            self.set_output(outputs::VALIDATION_STATUS, snapshot.validation.as_str())?;
            return Ok(snapshot.validation);
        }

        let budget = timeout_budget(timeout_minutes)?;
        let trigger = Request::post(api::snapshot_validate(&snapshot.sys_id))
            .content_type(CONTENT_TYPE_JSON);
        self.send(&trigger)?;
        tracing::info!("Validation triggered successfully for snapshot {}", snapshot.name);

        let state = self.wait_for_validation(snapshot, budget)?;
        tracing::info!("Validation status for snapshot {} is {state}", snapshot.name);
        self.set_output(outputs::VALIDATION_STATUS, state.as_str())?;
        Ok(state)
    }

    fn wait_for_validation(
        &self,
        snapshot: &SnapshotRecord,
        budget: Duration,
    ) -> PipelineResult<ValidationState> {
        let policy = PollPolicy::bounded_by(budget, self.polling.validation_interval);
        tracing::debug!(max_attempts = policy.max_attempts, "validation poll budget");

        let request = Request::get(format!("{}/{}", api::SNAPSHOT_TABLE, snapshot.sys_id))
            .query("sysparm_fields", "validation");
        poll(
            &policy,
            self.sleeper,
            || self.fetch::<ValidationRow>(&request),
            |row| row.validation.is_terminal(),
        )
        .map(|row| row.validation)
        .ok_or_else(|| PipelineError::ValidationPending {
            sys_id: snapshot.sys_id.clone(),
        })
    }
}
