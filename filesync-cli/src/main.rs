use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use filesync::{FileSyncController, GlobalSession, OwnerId, SyncConfig, SESSION};

mod cli;
mod commands;
mod error;

use cli::{Cli, Command};
use commands::ConsoleNotifier;
use error::AppError;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let args = Cli::parse();
    let result = run(args).await;
    SESSION.teardown();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        // already reported through the notifier
        Err(AppError::SyncError(err)) => {
            log::debug!("command failed: {:?}", err);
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> Result<(), AppError> {
    let config_path = match args.config {
        Some(path) => path,
        None => SyncConfig::default_path().map_err(AppError::Setup)?,
    };
    let config = SyncConfig::load(&config_path).map_err(AppError::Setup)?;

    let owner = args
        .owner
        .map(OwnerId::new)
        .or_else(|| config.owner.clone())
        .ok_or(AppError::OwnerMissing)?;
    log::debug!("acting as {} with data in {}", owner, config.data_dir.display());

    SESSION.init();
    SESSION.sign_in(owner);

    let controller = FileSyncController::open_local(
        &config,
        Arc::new(GlobalSession),
        Arc::new(ConsoleNotifier),
    )
    .map_err(AppError::Setup)?;

    match args.command {
        Command::List => commands::list(&controller).await,
        Command::Upload { paths } => commands::upload(&controller, &paths).await,
        Command::Download { file, to } => {
            let dir = to.unwrap_or_else(|| config.downloads_dir.clone());
            commands::download(&controller, &file, dir).await
        }
        Command::Cat { file } => commands::cat(&controller, &file).await,
        Command::Edit { file, from } => commands::edit(&controller, &file, from).await,
        Command::Delete { file } => commands::delete(&controller, &file).await,
        Command::Reconcile { purge } => commands::reconcile(&controller, purge).await,
    }
}
