use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use autobridge_core::saved_search::Frequency;
use autobridge_events::{EmailConfig, SmtpMailer};
use autobridge_worker::config::WorkerConfig;
use autobridge_worker::jobs;

#[derive(Parser, Debug)]
#[command(
    name = "autobridge-worker",
    about = "Scheduled saved-search notifications",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the three saved-search jobs on their schedules (default command)
    Serve,
    /// Run a single pass for one frequency and print its report as JSON
    Run {
        /// immediate, daily or weekly
        #[arg(long)]
        frequency: Frequency,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autobridge_worker=debug,autobridge_events=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = WorkerConfig::from_env();

    let pool = autobridge_db::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    autobridge_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database connection pool created");

    let email_config = EmailConfig::from_env().expect("SMTP_HOST must be set");
    let mailer = Arc::new(SmtpMailer::new(email_config).expect("Failed to build SMTP transport"));

    let code = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            serve(pool.clone(), mailer, &config).await;
            ExitCode::SUCCESS
        }
        Command::Run { frequency } => {
            let cancel = CancellationToken::new();
            match jobs::run_once(&pool, mailer.as_ref(), frequency, &cancel).await {
                Ok(Some(report)) => {
                    match serde_json::to_string_pretty(&report) {
                        Ok(json) => println!("{json}"),
                        Err(e) => tracing::error!(error = %e, "Failed to serialize run report"),
                    }
                    ExitCode::SUCCESS
                }
                Ok(None) => {
                    tracing::warn!(job = frequency.job_name(), "Job is locked by another worker");
                    ExitCode::FAILURE
                }
                Err(e) => {
                    tracing::error!(error = %e, "Saved-search pass failed");
                    ExitCode::FAILURE
                }
            }
        }
    };

    pool.close().await;
    code
}

/// Spawn one loop per frequency and wait for a shutdown signal.
async fn serve(pool: autobridge_db::DbPool, mailer: Arc<SmtpMailer>, config: &WorkerConfig) {
    let cancel = CancellationToken::new();

    let handles: Vec<_> = Frequency::ALL
        .into_iter()
        .map(|frequency| {
            tokio::spawn(jobs::run_schedule(
                pool.clone(),
                Arc::clone(&mailer),
                frequency,
                config.schedule_for(frequency),
                config.utc_offset,
                cancel.clone(),
            ))
        })
        .collect();
    tracing::info!(jobs = handles.len(), "Worker started");

    shutdown_signal().await;
    cancel.cancel();

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Job task panicked");
        }
    }
    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
