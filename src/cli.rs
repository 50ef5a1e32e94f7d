//! CLI argument parsing for the change workflow.
//!
//! Every input can also come from the environment so the tool runs unchanged
//! inside a CI step.
use crate::poll::BackoffMode;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "cdm-gate",
    version,
    about = "Upload configuration data, then validate and publish the resulting snapshot",
    after_help = "Examples:\n  cdm-gate run --instance-url https://acme.service-now.com --username ci --password *** \\\n    --target deployable --application-name shop --deployable-name Production \\\n    --data-format json --config-file-path 'config/**/*.json'",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Run(RunArgs),
}

/// Inputs for one end-to-end run against a single changeset.
#[derive(Parser, Debug)]
#[command(about = "Upload, validate, publish, and report on one changeset")]
pub struct RunArgs {
    /// Base URL of the service instance
    #[arg(long, env = "CDM_INSTANCE_URL", value_name = "URL")]
    pub instance_url: String,

    /// Integration user name
    #[arg(long, env = "CDM_USERNAME")]
    pub username: String,

    /// Integration user password
    #[arg(long, env = "CDM_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Upload target: component, collection, or deployable
    #[arg(long, env = "CDM_TARGET")]
    pub target: String,

    /// Application that owns the configuration
    #[arg(long, env = "CDM_APPLICATION_NAME")]
    pub application_name: String,

    /// Deployable whose snapshot is validated and published
    #[arg(long, env = "CDM_DEPLOYABLE_NAME")]
    pub deployable_name: String,

    /// Collection to upload into (collection target)
    #[arg(long, env = "CDM_COLLECTION_NAME")]
    pub collection_name: Option<String>,

    /// Format of the uploaded data (json, yaml, ini, ...)
    #[arg(long, env = "CDM_DATA_FORMAT")]
    pub data_format: String,

    /// Extra attributes for the data format parser
    #[arg(long, env = "CDM_DATA_FORMAT_ATTRIBUTES")]
    pub data_format_attributes: Option<String>,

    /// Glob pattern selecting the files to upload
    #[arg(long, env = "CDM_CONFIG_FILE_PATH", value_name = "PATTERN")]
    pub config_file_path: String,

    /// Name path prefix for uploaded nodes
    #[arg(long, env = "CDM_NAME_PATH")]
    pub name_path: Option<String>,

    /// Existing changeset to upload into
    #[arg(long, env = "CDM_CHANGESET")]
    pub changeset: Option<String>,

    /// Commit the changeset with the last upload
    #[arg(long, env = "CDM_AUTO_COMMIT", default_value_t = true, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub auto_commit: bool,

    /// Validate the resulting snapshot
    #[arg(long, env = "CDM_AUTO_VALIDATE", default_value_t = true, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub auto_validate: bool,

    /// Publish the snapshot when validation passes
    #[arg(long, env = "CDM_AUTO_PUBLISH", default_value_t = true, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub auto_publish: bool,

    /// Minutes to wait for snapshot validation
    #[arg(long, env = "CDM_SNAPSHOT_VALIDATION_TIMEOUT", default_value = "5", value_name = "MINUTES")]
    pub snapshot_validation_timeout: String,

    /// Fail the run when the snapshot does not pass validation
    #[arg(long, env = "CDM_TERMINATE_ON_POLICY_VALIDATION_FAILURES", default_value_t = false, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub terminate_on_policy_validation_failures: bool,

    /// Directory for validation-results.json and validation-results.sarif
    #[arg(long, env = "CDM_OUTPUT_DIR", value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Backoff used while waiting for uploads and snapshot generation
    #[arg(long, env = "CDM_BACKOFF", value_enum, default_value_t = BackoffMode::Fixed)]
    pub backoff: BackoffMode,

    /// HTTP request timeout in seconds
    #[arg(long, env = "CDM_HTTP_TIMEOUT", default_value_t = 60, value_name = "SECONDS")]
    pub http_timeout: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: &[&str] = &[
        "cdm-gate",
        "run",
        "--instance-url",
        "https://acme.example.com/",
        "--username",
        "ci",
        "--password",
        "pw",
        "--target",
        "deployable",
        "--application-name",
        "shop",
        "--deployable-name",
        "Production",
        "--data-format",
        "json",
        "--config-file-path",
        "config/*.json",
    ];

    fn parse(extra: &[&str]) -> RunArgs {
        let argv: Vec<&str> = REQUIRED.iter().chain(extra.iter()).copied().collect();
        let Command::Run(args) = RootArgs::try_parse_from(argv).expect("parse args").command;
        args
    }

    #[test]
    fn defaults_cover_the_common_flow() {
        let args = parse(&[]);
        assert!(args.auto_commit);
        assert!(args.auto_validate);
        assert!(args.auto_publish);
        assert!(!args.terminate_on_policy_validation_failures);
        assert_eq!(args.backoff, BackoffMode::Fixed);
        assert_eq!(args.snapshot_validation_timeout, "5");
    }

    #[test]
    fn boolish_flags_take_explicit_values() {
        let args = parse(&[
            "--auto-publish",
            "FALSE",
            "--terminate-on-policy-validation-failures",
            "true",
            "--backoff",
            "exponential",
        ]);
        assert!(!args.auto_publish);
        assert!(args.terminate_on_policy_validation_failures);
        assert_eq!(args.backoff, BackoffMode::Exponential);
    }
}
