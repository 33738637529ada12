use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use clap::Parser;
use rand::RngCore;
use rand::rngs::OsRng;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use activation_server::activation::ActivationService;
use activation_server::config::Config;
use activation_server::db::{AppState, create_pool, init_db};
use activation_server::email::EmailService;
use activation_server::handlers;

#[derive(Parser, Debug)]
#[command(name = "activation-server")]
#[command(about = "Issues and verifies encrypted software activation codes")]
struct Cli {
    /// Print a fresh random ACTIVATION_SECRET and exit
    #[arg(long)]
    generate_secret: bool,

    /// Delete the database on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.generate_secret {
        println!("ACTIVATION_SECRET={}", generate_secret());
        return;
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "activation_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }
    if config.admin_api_key.is_none() {
        tracing::warn!("ADMIN_API_KEY not set, admin endpoints will reject every request");
    }
    if config.webhook_secret.is_none() {
        tracing::warn!("WEBHOOK_SECRET not set, purchase webhooks are not authenticated");
    }
    if !config.allow_unregistered_codes {
        tracing::info!("Codes without a license record will be rejected");
    }

    // Create database pool and schema
    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let email = Arc::new(EmailService::new(&config.email));
    let state = AppState {
        db: db_pool.clone(),
        activation: ActivationService::new(db_pool, &config, email),
        admin_api_key: config.admin_api_key.clone(),
        webhook_secret: config.webhook_secret.clone(),
        app_name: config.app_name.clone(),
    };

    let app = handlers::app(state, Some(config.rate_limit)).layer(TraceLayer::new_for_http());

    // Start the server
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    // Track if we should clean up on exit
    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();

    if cli.ephemeral && !config.dev_mode {
        tracing::warn!("--ephemeral flag ignored: not in dev mode (set APP_ENV=dev)");
    }
    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: database will be deleted on exit");
    }

    tracing::info!("{} activation server listening on {}", config.app_name, addr);

    // Peer addresses are needed for per-IP rate limiting
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral database...");
        if let Err(e) = std::fs::remove_file(&db_path) {
            tracing::warn!("Failed to remove {}: {}", db_path, e);
        } else {
            tracing::info!("Removed {}", db_path);
        }
        // Also remove WAL and SHM files if they exist
        let _ = std::fs::remove_file(format!("{}-wal", db_path));
        let _ = std::fs::remove_file(format!("{}-shm", db_path));
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
