use std::time::Duration;

use clap::Parser;
use dotenv::dotenv;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use domainpulse::server::config::ServerConfig;
use domainpulse::server::core_services::CoreServices;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,
}

fn init_logging() {
    // File: JSON, daily rotation. Stdout: human-readable.
    let file_appender = rolling::daily("logs", "domainpulse.log");
    let file_layer = fmt::layer().with_writer(file_appender).with_ansi(false).json();
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_logging();
    dotenv().ok();
    let args = Args::parse();

    let config = match ServerConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load configuration: {e}");
            return Err(e.into());
        }
    };

    let pg_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    info!("connected to database");

    let services = CoreServices::build(&config, pg_pool)?;

    let reconciler = services.reconciler.clone();
    tokio::spawn(reconciler.run(Duration::from_secs(config.reconcile_interval_secs)));

    // The HTTP API drives `services.orchestrator` and the stores; the core
    // keeps running until the process is told to stop.
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, exiting");
    drop(services);
    Ok(())
}
