use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod config;
mod error;
mod name_path;
mod outputs;
mod poll;
mod query;
mod report;
mod state;
mod transport;
mod workflow;

use cli::{Command, RootArgs, RunArgs};
use config::PipelineConfig;
use error::PipelineError;
use outputs::{GithubOutputs, OutputSink, StdoutOutputs};
use poll::ThreadSleeper;
use transport::HttpTransport;
use workflow::{RunOutcome, Session};

fn main() -> ExitCode {
    init_tracing();
    let args = RootArgs::parse();

    let result = match args.command {
        Command::Run(args) => cmd_run(args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            let code = err
                .downcast_ref::<PipelineError>()
                .map_or(1, PipelineError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

/// Logs go to stderr so stdout stays free for `name=value` outputs.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

fn cmd_run(args: RunArgs) -> Result<()> {
    let config = PipelineConfig::from_args(args)?;
    tracing::debug!(
        instance = %config.instance_url,
        target = %config.target,
        app = %config.app_name,
        deployable = %config.deployable_name,
        upload_wait_secs = config.polling.upload.worst_case_wait().as_secs(),
        "configuration loaded"
    );

    let transport = HttpTransport::new(
        &config.instance_url,
        config.credentials.clone(),
        config.http_timeout,
    );
    let sink: Box<dyn OutputSink> = match GithubOutputs::from_env() {
        Some(outputs) => Box::new(outputs),
        None => Box::new(StdoutOutputs),
    };
    let session = Session::new(&transport, &ThreadSleeper, sink.as_ref(), config.polling);

    let outcome = workflow::run_pipeline(&config, &session)?;
    match outcome {
        RunOutcome::Uploaded { changeset, reason } => {
            tracing::info!(%changeset, ?reason, "run stopped after upload");
        }
        RunOutcome::Reported {
            changeset,
            snapshot_name,
            validation,
            published,
            report_files,
        } => {
            let files = report_files
                .iter()
                .map(|path| path.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::info!(
                %changeset,
                snapshot = %snapshot_name,
                %validation,
                published,
                files = %files,
                "run complete"
            );
        }
    }
    Ok(())
}
