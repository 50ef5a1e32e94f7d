use super::{api, Session, SnapshotRecord};
use crate::error::PipelineResult;
use crate::state::ValidationState;
use crate::transport::{Request, CONTENT_TYPE_JSON};

impl Session<'_> {
    /// Publish `snapshot` when its validation passed.
    ///
    /// Returns whether the snapshot ends up published; a non-passing state is
    /// a warning, not an error.
    pub fn publish_snapshot(
        &self,
        validation: ValidationState,
        snapshot: &SnapshotRecord,
    ) -> PipelineResult<bool> {
        tracing::info!("PublishSnapshot begins....");
        if snapshot.published {
            tracing::info!(
                "No action required as snapshot '{}' is already published.",
                snapshot.name
            );
            return Ok(true);
        }
        if !validation.is_pass() {
            tracing::warn!(
                "Snapshot '{}' cannot be published as the validation status is not 'passed' or 'passed_with_exception'. The validation status is {validation}.",
                snapshot.name
            );
            return Ok(false);
        }

        let request = Request::post(api::snapshot_publish(&snapshot.sys_id))
            .content_type(CONTENT_TYPE_JSON);
        self.send(&request)?;
        tracing::info!("Snapshot '{}' published successfully.", snapshot.name);
        Ok(true)
    }
}
