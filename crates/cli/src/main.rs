mod cli;
mod errors;
mod mcp;
mod tracing;

use std::process::ExitCode;
use std::sync::Arc;

use ::tracing::{debug, info, instrument};
use lumen_catalog::{ListOptions, Lister, OciRegistryBackend, Settings};
use tokio_util::sync::CancellationToken;

use crate::cli::{Cli, Commands};
use crate::errors::{CliError, CliResult};
use crate::mcp::McpServer;
use crate::tracing::TracingConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = cli::parse();

    let tracing_config = TracingConfig {
        format: cli.log_format,
        level: cli.level.into(),
    };
    if let Err(error) = crate::tracing::init_tracing(tracing_config) {
        report(&error);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let code = error.exit_code();
            report(&miette::Report::new(error));
            ExitCode::from(code)
        }
    }
}

#[allow(clippy::print_stderr)]
fn report(error: &miette::Report) {
    eprintln!("{error:?}");
}

#[instrument(name = "lumen", skip_all)]
async fn run(cli: Cli) -> CliResult<()> {
    let settings = load_settings(&cli)?;
    debug!(
        working_dir = %settings.working_dir.display(),
        candidates = settings.candidates.len(),
        "Loaded settings"
    );

    let backend = Arc::new(OciRegistryBackend::new(&settings.insecure_registries));
    let lister = Lister::from_settings(&settings, backend);
    let cancel = cancel_on_ctrl_c();

    match cli.command {
        Commands::List { target } => {
            let opts = ListOptions::from(target);
            let results = lister.list(&opts, &cancel).await?;
            print_json(&serde_json::to_string_pretty(&results)?);
        }
        Commands::Mcp => {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            McpServer::new(lister)
                .serve(stdin, tokio::io::stdout(), &cancel)
                .await?;
        }
    }
    Ok(())
}

/// Settings from `--config` if given, with `--working-dir` applied on top.
fn load_settings(cli: &Cli) -> CliResult<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path).map_err(|e| CliError::config(path, e))?,
        None => Settings::default(),
    };
    if let Some(dir) = &cli.working_dir {
        settings.working_dir.clone_from(dir);
    }
    Ok(settings)
}

/// Token cancelled on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, cancelling");
            token.cancel();
        }
    });
    cancel
}

#[allow(clippy::print_stdout)]
fn print_json(rendered: &str) {
    println!("{rendered}");
}
