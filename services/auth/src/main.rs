use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use common::database::{DatabaseConfig, init_pool};
use session_auth::{
    AppState,
    config::AppConfig,
    create_app,
    models::NewUser,
    repositories::UserRepository,
    validation::validate_username,
};

#[derive(Parser)]
#[command(name = "session-auth", about = "Session based authentication service")]
struct Cli {
    /// Path to a configuration file (toml, yaml or json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the web server (default)
    Start,
    /// Add a user to the database user store
    AddUser {
        #[arg(long)]
        username: String,
        /// Read from SESSIONAUTH_NEW_USER_PASSWORD when omitted
        #[arg(long, env = "SESSIONAUTH_NEW_USER_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log.level))
        .context("Invalid log level")?;
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")?;

    match cli.command.unwrap_or(Command::Start) {
        Command::Start => serve(config).await,
        Command::AddUser { username, password } => add_user(&config, username, password).await,
    }
}

async fn serve(config: AppConfig) -> Result<()> {
    info!("Starting authentication service");

    let state = AppState::from_config(&config).await?;
    let app = create_app(
        state,
        Duration::from_secs(config.server.request_timeout_secs),
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!("Authentication service listening on {}", config.server.bind);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Authentication service stopped");
    Ok(())
}

async fn add_user(config: &AppConfig, username: String, password: String) -> Result<()> {
    validate_username(&username).map_err(|e| anyhow::anyhow!(e))?;

    let url = config
        .users
        .database_url
        .as_deref()
        .context("users.database_url is required to add users")?;
    let pool = init_pool(&DatabaseConfig::new(url)).await?;

    let user = UserRepository::new(pool)
        .create(&NewUser { username, password })
        .await?;
    info!("Created user {} ({})", user.username, user.id);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
