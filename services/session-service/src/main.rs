use anyhow::Context;
use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use sb_api_types::{ErrorKind, ErrorResponse, SessionSnapshot};
use sb_chain_solana::SolanaRpcGateway;
use sb_session_core::{Session, SessionConfig, SessionError};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, watch};
use tower_http::cors::CorsLayer;
use tracing::info;

mod config;
mod session_ops;

use config::ServiceConfig;

#[derive(Debug, Serialize)]
struct HealthResponse {
    service: &'static str,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct VersionResponse {
    service: &'static str,
    version: &'static str,
}

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);
pub(crate) type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Clone)]
pub(crate) struct AppState {
    session: Arc<Mutex<Session>>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl AppState {
    pub(crate) fn new(session: Session) -> Self {
        let snapshots = session.subscribe();
        Self {
            session: Arc::new(Mutex::new(session)),
            snapshots,
        }
    }

    /// Grants the session to one workflow at a time. A request that arrives
    /// while another action is in flight is turned away, not queued.
    pub(crate) fn acquire(&self) -> Result<MutexGuard<'_, Session>, ApiError> {
        self.session
            .try_lock()
            .map_err(|_| conflict("another session action is still in progress"))
    }

    /// Last published snapshot, readable while an action holds the session.
    pub(crate) fn latest_snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServiceConfig::from_env()?;
    let gateway = SolanaRpcGateway::new(config.rpc_config())
        .context("failed to build the Solana RPC gateway")?;
    let host = config.host()?;

    let session = Session::start(&host, Arc::new(gateway), SessionConfig::default());
    let app = app(AppState::new(session));

    info!("session-service listening on {}", config.listen_addr);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

pub(crate) fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .route("/session", get(session_ops::session_snapshot))
        .route("/wallet/connect", post(session_ops::wallet_connect))
        .route("/wallet/disconnect", post(session_ops::wallet_disconnect))
        .route("/account/create", post(session_ops::account_create))
        .route("/account/fund", post(session_ops::account_fund))
        .route("/account/balance", post(session_ops::account_balance))
        .route("/transfer", post(session_ops::transfer))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("shutting down session-service");
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        service: "session-service",
        status: "ok",
    })
}

async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        service: "session-service",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub(crate) fn session_error(err: SessionError) -> ApiError {
    let status = match err.kind() {
        ErrorKind::ProviderAbsent => StatusCode::PRECONDITION_FAILED,
        ErrorKind::UserRejected => StatusCode::FORBIDDEN,
        ErrorKind::NetworkError | ErrorKind::SubmissionError => StatusCode::BAD_GATEWAY,
        ErrorKind::FaucetUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::ConfirmationExpired => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::InvalidAction => StatusCode::BAD_REQUEST,
    };

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            kind: err.kind().as_str().to_owned(),
        }),
    )
}

fn conflict(message: &str) -> ApiError {
    (
        StatusCode::CONFLICT,
        Json(ErrorResponse {
            error: message.to_owned(),
            kind: "busy".to_owned(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use sb_api_types::LAMPORTS_PER_SOL;
    use sb_chain_client::InMemoryLedger;
    use sb_wallet_provider::{KeypairWallet, PROVIDER_GLOBAL, StaticHost};
    use serde_json::Value;
    use tower::ServiceExt;

    fn state_with_wallet(wallet: Option<Arc<KeypairWallet>>) -> AppState {
        let host = match wallet {
            Some(wallet) => StaticHost::empty().with_global(PROVIDER_GLOBAL, wallet),
            None => StaticHost::empty(),
        };
        let ledger = Arc::new(InMemoryLedger::new().with_signature_fee(0));
        AppState::new(Session::start(&host, ledger, SessionConfig::default()))
    }

    async fn call(state: &AppState, method: &str, uri: &str) -> anyhow::Result<(StatusCode, Value)> {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())?;
        let response = app(state.clone()).oneshot(request).await?;
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        Ok((status, serde_json::from_slice(&body)?))
    }

    #[tokio::test]
    async fn health_and_version_respond() -> anyhow::Result<()> {
        let state = state_with_wallet(None);

        let (status, body) = call(&state, "GET", "/health").await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = call(&state, "GET", "/version").await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        Ok(())
    }

    #[tokio::test]
    async fn missing_provider_is_reported_per_action() -> anyhow::Result<()> {
        let state = state_with_wallet(None);

        let (status, body) = call(&state, "POST", "/wallet/connect").await?;
        assert_eq!(status, StatusCode::PRECONDITION_FAILED);
        assert_eq!(body["kind"], "provider_absent");

        let (_, snapshot) = call(&state, "GET", "/session").await?;
        assert_eq!(snapshot["state"], "no_provider");
        assert_eq!(snapshot["last_error"]["kind"], "provider_absent");
        Ok(())
    }

    #[tokio::test]
    async fn full_flow_over_http() -> anyhow::Result<()> {
        let wallet = Arc::new(KeypairWallet::generate());
        let state = state_with_wallet(Some(wallet.clone()));

        let (status, body) = call(&state, "POST", "/wallet/connect").await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["wallet_address"], wallet.address().as_str());
        assert_eq!(body["state"], "wallet_connected");

        let (status, body) = call(&state, "POST", "/account/create").await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["balance_lamports"], 2 * LAMPORTS_PER_SOL);
        assert_eq!(body["balance_sol"], 2.0);
        assert_eq!(body["state"], "account_funded");

        let (status, body) = call(&state, "POST", "/transfer").await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["transfer"]["destination"], wallet.address().as_str());
        assert_eq!(body["transfer"]["lamports"], 2 * LAMPORTS_PER_SOL);
        assert_eq!(body["state"], "transfer_complete");

        let (status, body) = call(&state, "POST", "/account/balance").await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["balance_lamports"], 0);

        let (_, snapshot) = call(&state, "GET", "/session").await?;
        assert_eq!(snapshot["state"], "transfer_complete");
        assert!(snapshot["last_error"].is_null());
        Ok(())
    }

    #[tokio::test]
    async fn transfer_without_account_is_a_bad_request() -> anyhow::Result<()> {
        let state = state_with_wallet(Some(Arc::new(KeypairWallet::generate())));

        let (status, body) = call(&state, "POST", "/transfer").await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_action");
        Ok(())
    }

    #[tokio::test]
    async fn rejected_connect_is_forbidden() -> anyhow::Result<()> {
        let wallet = Arc::new(KeypairWallet::generate());
        wallet.set_approving(false);
        let state = state_with_wallet(Some(wallet));

        let (status, body) = call(&state, "POST", "/wallet/connect").await?;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["kind"], "user_rejected");

        let (status, body) = call(&state, "POST", "/wallet/disconnect").await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_action");
        Ok(())
    }

    #[tokio::test]
    async fn busy_session_answers_conflict() -> anyhow::Result<()> {
        let state = state_with_wallet(Some(Arc::new(KeypairWallet::generate())));
        let _held = state.session.lock().await;

        let (status, body) = call(&state, "POST", "/account/create").await?;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "busy");

        let (status, snapshot) = call(&state, "GET", "/session").await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(snapshot["state"], "provider_ready");
        Ok(())
    }

    #[tokio::test]
    async fn wallet_side_disconnect_shows_in_the_snapshot() -> anyhow::Result<()> {
        let wallet = Arc::new(KeypairWallet::generate());
        let state = state_with_wallet(Some(wallet.clone()));
        call(&state, "POST", "/wallet/connect").await?;

        wallet.revoke();

        let (_, snapshot) = call(&state, "GET", "/session").await?;
        assert_eq!(snapshot["state"], "provider_ready");
        assert!(snapshot["wallet_address"].is_null());
        Ok(())
    }
}
