mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use ci_artifacts_api::{
    CiError,
    JenkinsApi,
};
use ci_artifacts_core::application::{
    change_reservations,
    list_resources,
};
use ci_artifacts_core::domain::report::EXIT_FAILURE;
use ci_artifacts_core::infrastructure::config::jjb_config_path;
use ci_artifacts_core::{
    error_report,
    logging,
    resolve_credentials,
    BuildWorkflow,
    CiArtifactsConfig,
    CommandOutput,
    ConfigLoader,
    CtrlCPrompt,
    PollSettings,
    ReservationAction,
    Report,
};
use ci_artifacts_jenkins::JenkinsClient;
use clap::Parser;

use crate::cli::{
    credential_map,
    Cli,
    Command,
    ResourceCommand,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_with_default(&logging::filter_for_level(&cli.log_level));

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("rustls crypto provider already installed");
    }

    let (json, code) = match run(cli).await {
        Ok(output) => (output.to_json(), output.exit_code),
        Err(err) => {
            tracing::error!("{err:#}");
            let (report, code) = match err.downcast_ref::<CiError>() {
                Some(ci_err) => error_report(ci_err),
                None => (
                    serde_json::json!({ "error": format!("{err:#}") }),
                    EXIT_FAILURE,
                ),
            };
            (report.to_string(), code)
        }
    };
    println!("{json}");
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn load_config(cli: &Cli) -> anyhow::Result<CiArtifactsConfig> {
    let config = match &cli.config {
        Some(path) => ConfigLoader::load(path),
        None => ConfigLoader::load_default(),
    };
    config.context("Failed to load config")
}

async fn connect(cli: &Cli, config: &CiArtifactsConfig) -> anyhow::Result<Arc<dyn JenkinsApi>> {
    let cli_credentials = credential_map(cli.credentials.as_deref())?;
    let jjb_path = jjb_config_path();
    let credentials = resolve_credentials(cli_credentials.as_ref(), config, jjb_path.as_deref())?;
    tracing::debug!(
        "Using credentials for {} from {}",
        credentials.url,
        credentials.source
    );

    let client = JenkinsClient::connect(credentials.into_settings(config)).await?;
    Ok(Arc::new(client))
}

async fn run(cli: Cli) -> anyhow::Result<CommandOutput> {
    let config = load_config(&cli)?;
    let api = connect(&cli, &config).await?;
    let defaults = &config.defaults;

    let output = match &cli.command {
        Command::Request { job } => {
            workflow(&api, job.poll_settings(defaults))
                .request(&job.to_request(defaults)?)
                .await?
        }
        Command::AwaitResult { job } => {
            workflow(&api, job.poll_settings(defaults))
                .await_result(&job.to_request(defaults)?)
                .await?
        }
        Command::Validate { job } => {
            workflow(&api, job.poll_settings(defaults))
                .validate(&job.to_request(defaults)?)
                .await?
        }
        Command::Download { job, download } => {
            let target = job.download_target(download, defaults);
            workflow(&api, job.poll_settings(defaults))
                .download(&job.to_request(defaults)?, &target)
                .await?
        }
        Command::Fetch { job, download } => {
            let target = job.download_target(download, defaults);
            workflow(&api, job.poll_settings(defaults))
                .fetch(&job.to_request(defaults)?, &target)
                .await?
        }
        Command::Info { job } => workflow(&api, PollSettings::default()).info(job).await?,
        Command::LockableResources { action } => match action {
            ResourceCommand::List => {
                CommandOutput::ok(Report::Resources(list_resources(api.as_ref()).await?))
            }
            ResourceCommand::Reserve { reservation } => {
                let report = change_reservations(
                    api.as_ref(),
                    ReservationAction::Reserve,
                    &reservation.names,
                    reservation.options(),
                )
                .await?;
                CommandOutput::ok(Report::Reservation(report))
            }
            ResourceCommand::Unreserve { reservation } => {
                let report = change_reservations(
                    api.as_ref(),
                    ReservationAction::Unreserve,
                    &reservation.names,
                    reservation.options(),
                )
                .await?;
                CommandOutput::ok(Report::Reservation(report))
            }
        },
    };
    Ok(output)
}

fn workflow(api: &Arc<dyn JenkinsApi>, poll: PollSettings) -> BuildWorkflow {
    BuildWorkflow::new(Arc::clone(api), Arc::new(CtrlCPrompt), poll)
}
