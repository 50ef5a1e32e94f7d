use super::{resolve_artifacts, UploadRequest};
use crate::config::TargetKind;
use crate::error::PipelineError;
use crate::name_path::SEPARATOR;
use crate::outputs;
use crate::transport::Method;
use crate::workflow::testing::Harness;
use crate::workflow::ChangesetNumber;
use serde_json::json;
use std::path::Path;

const UPLOAD_PATH: &str = "/api/sn_cdm/applications/uploads/deployables";

fn write_artifacts(dir: &Path, names: &[&str]) {
    for name in names {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent directory");
        }
        std::fs::write(&path, format!("{{\"file\":\"{name}\"}}")).expect("write artifact");
    }
}

fn request(pattern: &str) -> UploadRequest<'_> {
    UploadRequest {
        pattern,
        target: TargetKind::Deployable,
        app_name: "shop",
        deployable_name: Some("Production"),
        collection_name: None,
        data_format: "json",
        auto_commit: true,
        name_path: Some("settings/"),
        changeset: None,
        data_format_attributes: None,
    }
}

fn script_uploads(harness: &Harness, count: usize) {
    for index in 1..=count {
        harness.transport.ok(
            Method::Post,
            UPLOAD_PATH,
            json!({"result": {"upload_id": format!("up-{index}")}}),
        );
        harness.transport.ok(
            Method::Get,
            &format!("/api/sn_cdm/applications/upload-status/up-{index}"),
            json!({"result": {"state": "completed", "output": {"number": format!("Chset-{index}")}}}),
        );
    }
}

#[test]
fn uploads_each_artifact_and_commits_only_the_last() {
    let dir = tempfile::tempdir().expect("create temp dir");
    write_artifacts(dir.path(), &["a.json", "b.json", "c.json"]);
    let pattern = dir.path().join("*.json").display().to_string();
    let harness = Harness::new();
    script_uploads(&harness, 3);

    let changeset = harness
        .session()
        .upload_config(&request(&pattern))
        .expect("upload succeeds");

    assert_eq!(changeset, ChangesetNumber::new("Chset-3"));
    let posts = harness.transport.requests_to(Method::Post, UPLOAD_PATH);
    assert_eq!(posts.len(), 3);
    let commits: Vec<_> = posts
        .iter()
        .map(|post| post.query_value("autoCommit").unwrap_or_default())
        .collect();
    assert_eq!(commits, vec!["false", "false", "true"]);
    assert_eq!(
        harness.outputs.get(outputs::CHANGESET_NUMBER).as_deref(),
        Some("Chset-3")
    );
}

#[test]
fn changeset_is_carried_forward_between_uploads() {
    let dir = tempfile::tempdir().expect("create temp dir");
    write_artifacts(dir.path(), &["a.json", "b.json"]);
    let pattern = dir.path().join("*.json").display().to_string();
    let harness = Harness::new();
    script_uploads(&harness, 2);

    let mut upload = request(&pattern);
    upload.changeset = Some(ChangesetNumber::new("Chset-0"));
    harness.session().upload_config(&upload).expect("upload succeeds");

    let posts = harness.transport.requests_to(Method::Post, UPLOAD_PATH);
    assert_eq!(posts[0].query_value("changesetNumber"), Some("Chset-0"));
    assert_eq!(posts[1].query_value("changesetNumber"), Some("Chset-1"));
    assert_eq!(
        posts[0].query_value("namePath"),
        Some(format!("settings{SEPARATOR}a.json").as_str())
    );
    assert_eq!(posts[0].body.as_deref(), Some("{\"file\":\"a.json\"}"));
}

#[test]
fn auto_commit_stays_off_when_not_requested() {
    let dir = tempfile::tempdir().expect("create temp dir");
    write_artifacts(dir.path(), &["a.json", "b.json"]);
    let pattern = dir.path().join("*.json").display().to_string();
    let harness = Harness::new();
    script_uploads(&harness, 2);

    let mut upload = request(&pattern);
    upload.auto_commit = false;
    harness.session().upload_config(&upload).expect("upload succeeds");

    let posts = harness.transport.requests_to(Method::Post, UPLOAD_PATH);
    assert!(posts
        .iter()
        .all(|post| post.query_value("autoCommit") == Some("false")));
}

#[test]
fn error_state_aborts_the_batch() {
    let dir = tempfile::tempdir().expect("create temp dir");
    write_artifacts(dir.path(), &["a.json", "b.json"]);
    let pattern = dir.path().join("*.json").display().to_string();
    let harness = Harness::new();
    harness
        .transport
        .ok(Method::Post, UPLOAD_PATH, json!({"result": {"upload_id": "up-1"}}))
        .ok(
            Method::Get,
            "/api/sn_cdm/applications/upload-status/up-1",
            json!({"result": {"state": "error", "output": "invalid json"}}),
        );

    let err = harness
        .session()
        .upload_config(&request(&pattern))
        .expect_err("upload fails");

    assert!(matches!(err, PipelineError::UploadFailed { ref detail, .. } if detail == "invalid json"));
    assert_eq!(harness.transport.count(Method::Post, UPLOAD_PATH), 1);
    assert!(harness.outputs.get(outputs::CHANGESET_NUMBER).is_none());
}

#[test]
fn expired_upload_is_fatal() {
    let dir = tempfile::tempdir().expect("create temp dir");
    write_artifacts(dir.path(), &["a.json"]);
    let pattern = dir.path().join("*.json").display().to_string();
    let harness = Harness::new();
    harness
        .transport
        .ok(Method::Post, UPLOAD_PATH, json!({"result": {"upload_id": "up-1"}}))
        .ok(
            Method::Get,
            "/api/sn_cdm/applications/upload-status/up-1",
            json!({"result": {"state": "expired"}}),
        );

    let err = harness
        .session()
        .upload_config(&request(&pattern))
        .expect_err("upload expires");
    assert!(matches!(err, PipelineError::UploadExpired { .. }));
}

#[test]
fn pending_upload_exhausts_the_poll() {
    let dir = tempfile::tempdir().expect("create temp dir");
    write_artifacts(dir.path(), &["a.json"]);
    let pattern = dir.path().join("*.json").display().to_string();
    let harness = Harness::new();
    harness
        .transport
        .ok(Method::Post, UPLOAD_PATH, json!({"result": {"upload_id": "up-1"}}))
        .ok(
            Method::Get,
            "/api/sn_cdm/applications/upload-status/up-1",
            json!({"result": {"state": "pending"}}),
        );

    let err = harness
        .session()
        .upload_config(&request(&pattern))
        .expect_err("upload never finishes");

    assert!(matches!(err, PipelineError::UploadNotProcessed { .. }));
    assert_eq!(
        harness
            .transport
            .count(Method::Get, "/api/sn_cdm/applications/upload-status/up-1"),
        3
    );
    assert!(err.to_string().contains("up-1 is not processed yet"));
}

#[test]
fn empty_resolution_fails_before_any_request() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let pattern = dir.path().join("*.yaml").display().to_string();
    let harness = Harness::new();

    let err = harness
        .session()
        .upload_config(&request(&pattern))
        .expect_err("no files");

    assert!(matches!(err, PipelineError::Config(_)));
    assert!(harness.transport.sent.borrow().is_empty());
}

#[test]
fn resolution_skips_directories_and_node_modules() {
    let dir = tempfile::tempdir().expect("create temp dir");
    write_artifacts(
        dir.path(),
        &["b.json", "a.json", "node_modules/dep.json", "nested/c.json"],
    );
    let pattern = dir.path().join("**/*.json").display().to_string();

    let files = resolve_artifacts(&pattern).expect("resolve artifacts");
    let names: Vec<_> = files
        .iter()
        .map(|path| {
            path.strip_prefix(dir.path())
                .expect("under temp dir")
                .display()
                .to_string()
        })
        .collect();
    assert_eq!(names, vec!["a.json", "b.json", "nested/c.json"]);
}
