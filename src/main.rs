//! Hospital Records API
//! Mission: Serve patient, doctor and appointment records to authenticated staff

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hospital_backend::{
    api::{self, AppState},
    auth::{AuthState, CredentialStore, TokenService},
    config::{Config, DEV_JWT_SECRET},
    middleware::AccessLog,
    storage,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment and logging
    load_env();
    init_tracing();

    let config = Config::parse();

    info!("🏥 Hospital Records API starting");

    let store = storage::open(&config.storage_settings())
        .await
        .context("Failed to open record store")?;

    let credentials = match &config.credentials_file {
        Some(path) => CredentialStore::load(path)?,
        None => CredentialStore::builtin(),
    };
    if config.jwt_secret == DEV_JWT_SECRET {
        warn!("⚠️  Using the development JWT secret; set JWT_SECRET in production");
    }
    let tokens = TokenService::new(&config.jwt_secret, config.token_ttl());
    let auth_state = AuthState::new(Arc::new(credentials), Arc::new(tokens));

    info!(
        "🔐 Authentication initialized ({} accounts, {}h tokens)",
        auth_state.credentials.len(),
        config.token_ttl_hours
    );

    let access_log = config.access_log_path().map(|path| {
        info!("📝 Access log: {}", path.display());
        Arc::new(AccessLog::new(path.clone()))
    });

    let app = api::router(AppState {
        store,
        auth: auth_state,
        access_log,
    })
    .layer(TimeoutLayer::new(config.request_timeout()))
    .layer(CorsLayer::permissive());

    // Start server
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("🎯 API server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("👋 Server stopped");
    Ok(())
}

/// Initialize tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hospital_backend=debug,hospital=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // Standard dotenv search (cwd + parents), then the crate root.
    let _ = dotenv();

    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!("Failed to listen for SIGTERM: {}", err);
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

    info!("🛑 Shutdown signal received");
}
