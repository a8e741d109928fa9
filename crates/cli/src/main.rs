use crate::{
    conn::{ConnectionPinger, PostgresConnectionPinger},
    error::CliError,
    shutdown::{ExitCode, ShutdownCoordinator},
};
use clap::Parser;
use commands::Commands;
use engine_config::settings::Settings;
use engine_runtime::{error::BenchmarkError, parse_selectors, runner::Runner};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod commands;
mod conn;
mod error;
mod shutdown;

#[derive(Parser)]
#[command(
    name = "syncbench",
    version = "0.1.0",
    about = "Benchmark fetch and insert strategies for bulk ingestion into PostgreSQL"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let code = match execute(cli.command).await {
        Ok(()) => ExitCode::Success,
        Err(err) => {
            error!("{err}");
            exit_code(&err)
        }
    };
    std::process::exit(code.as_i32());
}

async fn execute(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Sync {
            insert,
            fetch,
            env_file,
        } => {
            // Selectors and settings are checked before anything is contacted.
            let (insert, fetch) = parse_selectors(&insert, &fetch)?;
            let settings = match env_file {
                Some(path) => Settings::from_env_file(path)?,
                None => Settings::from_env()?,
            };
            settings.log_summary();

            let coordinator =
                ShutdownCoordinator::new(CancellationToken::new(), format!("{fetch} -> {insert}"));
            coordinator.register_handlers();

            let mut runner = Runner::connect(&settings).await?;
            match runner.run(fetch, insert, &coordinator.cancel_token()).await {
                Ok(report) => {
                    info!(
                        "{} -> {}: {} rows in {:.3}s ({:.0} rows/s)",
                        report.fetch,
                        report.insert,
                        report.rows_written,
                        report.elapsed.as_secs_f64(),
                        report.rows_per_sec()
                    );
                    Ok(())
                }
                Err(BenchmarkError::Cancelled) if coordinator.is_shutdown_requested() => {
                    Err(CliError::ShutdownRequested)
                }
                Err(err) => Err(err.into()),
            }
        }
        Commands::TestConn { conn_str } => PostgresConnectionPinger { conn_str }.ping().await,
    }
}

fn exit_code(err: &CliError) -> ExitCode {
    match err {
        CliError::ShutdownRequested => ExitCode::ShutdownRequested,
        CliError::Settings(_) => ExitCode::ConfigError,
        CliError::Benchmark(err) if err.is_configuration() => ExitCode::ConfigError,
        _ => ExitCode::GeneralError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_config::settings::error::SettingsError;

    #[test]
    fn test_sync_requires_both_selectors() {
        let cli = Cli::try_parse_from(["syncbench", "sync", "--insert", "bulk", "--fetch", "2"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Sync { ref insert, ref fetch, env_file: None } if insert == "bulk" && fetch == "2"
        ));

        assert!(Cli::try_parse_from(["syncbench", "sync", "--insert", "bulk"]).is_err());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&CliError::ShutdownRequested).as_i32(), 130);
        assert_eq!(
            exit_code(&CliError::Settings(SettingsError::Missing("DATABASE_URL"))),
            ExitCode::ConfigError
        );

        let selector = parse_selectors("undefined", "keyset").unwrap_err();
        assert_eq!(
            exit_code(&CliError::Benchmark(selector)),
            ExitCode::ConfigError
        );
        assert_eq!(
            exit_code(&CliError::Benchmark(BenchmarkError::Cancelled)),
            ExitCode::GeneralError
        );
    }
}
