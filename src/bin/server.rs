// Territory Service - Main Server Binary
// Master process by default; the same binary runs as each worker
// Run with: cargo run --bin server

//! # Territory Server Binary
//!
//! ```text
//! server [OPTIONS] [COMMAND]
//!
//!   supervise  master process, one worker per CPU core (default)
//!   serve      a single worker without supervision
//!   migrate    apply database migrations and exit
//! ```
//!
//! Options go before the command. Every option also has an environment
//! variable (`TERRITORY_PORT`, `TERRITORY_SERVER`, ...) and a `.env` file in
//! the working directory is loaded first. Logs go to stderr and are filtered
//! with `RUST_LOG`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use territory_service::server::{
    run_worker, shutdown_on_signal, ServerSettings, SupervisorArgs, WORKER_SLOT_ENV,
};
use territory_service::{MySqlStorage, ProcessLauncher, Supervisor};

#[derive(Parser)]
#[command(name = "territory-server")]
#[command(about = "Territory GraphQL API server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    settings: ServerSettings,

    #[command(flatten)]
    supervisor: SupervisorArgs,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Run the master process and its workers
    Supervise,

    /// Run one supervised worker (started by the master)
    #[command(hide = true)]
    Worker,

    /// Run a single server process without supervision
    Serve,

    /// Apply database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv_result = dotenv();

    // stdout is the worker -> master control channel
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dotenv_result {
        tracing::debug!("No .env file loaded: {}", e);
    }

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Supervise);

    match command {
        Commands::Supervise => supervise(&cli.settings, &cli.supervisor).await,
        Commands::Worker => {
            let slot = std::env::var(WORKER_SLOT_ENV).unwrap_or_default();
            info!("Starting worker {} (pid {})", slot, std::process::id());
            run_worker(&cli.settings, true, shutdown_on_signal())
                .await
                .context("worker failed")
        }
        Commands::Serve => {
            info!("🚀 Starting Territory Server...");
            run_worker(&cli.settings, false, shutdown_on_signal())
                .await
                .context("server failed")
        }
        Commands::Migrate => migrate(&cli.settings).await,
    }
}

async fn supervise(settings: &ServerSettings, args: &SupervisorArgs) -> Result<()> {
    // Fail here rather than in every worker
    settings.tls_config()?;
    if !settings.in_memory {
        settings.database.to_config()?;
    } else if args.worker_count() > 1 {
        warn!("In-memory storage is per worker; requests will see different data");
    }

    let workers = args.worker_count();
    info!("🚀 Starting Territory Server...");
    info!("Environment: {}", settings.environment.as_str());
    info!(
        "Database pool: {} connections per worker, {} in total",
        settings.database.pool_size,
        settings.database.pool_size as usize * workers
    );

    let launcher = ProcessLauncher::current_exe()?
        .envs(settings.to_env())
        .arg("worker");

    Supervisor::new(launcher, workers)
        .with_policy(args.restart_policy())
        .with_port(settings.port)
        .run(shutdown_on_signal())
        .await
        .context("supervisor stopped")
}

async fn migrate(settings: &ServerSettings) -> Result<()> {
    let config = settings.database.to_config()?;
    info!(
        "Applying migrations to {}:{}/{}",
        config.host, config.port, config.database
    );

    let storage = MySqlStorage::connect(&config)
        .await
        .context("cannot connect to the database")?;
    storage.migrate().await.context("migration failed")?;

    info!("✅ Migrations applied");
    Ok(())
}
