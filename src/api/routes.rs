//! Router construction and server lifecycle.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::ceremony::verifier::FidoVerifier;
use crate::ceremony::CeremonyCoordinator;
use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::pending::PendingOperationStore;

use super::pages;
use super::webauthn;

/// Shared application state, constructed once at startup and injected into
/// every handler.
pub struct AppState {
    pub config: Config,
    pub credentials: Arc<CredentialStore>,
    pub pending: Arc<PendingOperationStore>,
    pub coordinator: CeremonyCoordinator,
}

impl AppState {
    /// Build the state: open both durable stores and wire the coordinator to
    /// the production verifier.
    pub async fn init(config: Config) -> Self {
        let credentials = Arc::new(CredentialStore::new(config.credentials_file()).await);
        let pending = Arc::new(
            PendingOperationStore::new(config.pending_ops_file(), config.origin.clone()).await,
        );
        let coordinator = CeremonyCoordinator::new(
            &config,
            Arc::clone(&credentials),
            Arc::clone(&pending),
            Arc::new(FidoVerifier::new()),
        );

        Self {
            config,
            credentials,
            pending,
            coordinator,
        }
    }
}

/// Build the router over an already-constructed state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(pages::index))
        .route("/register", get(pages::register_page))
        .route("/approve/:op_id", get(pages::approve_page))
        .route("/webauthn/register/options", post(webauthn::register_options))
        .route("/webauthn/register/verify", post(webauthn::register_verify))
        .route(
            "/webauthn/authenticate/options",
            post(webauthn::authenticate_options),
        )
        .route(
            "/webauthn/authenticate/verify",
            post(webauthn::authenticate_verify),
        )
        .route("/status/:op_id", get(webauthn::status))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server and run until a shutdown signal arrives.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState::init(config).await);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Approval server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Wait for SIGTERM or ctrl-c.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
