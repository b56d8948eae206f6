//! Axum-based HTTP gateway for the account service.
//!
//! Routes mirror what the FitTrack front end calls:
//! - `POST /users`          — create an account
//! - `POST /login`          — check a username/password pair
//! - `PUT /update/users`    — change a password (current password required)
//! - `DELETE /delete/users` — delete an account (password required)
//! - `GET /users`           — list accounts (diagnostic; never includes hashes)
//! - `GET /health`          — liveness plus account count
//!
//! Store calls run on the blocking pool: hashing is deliberately slow and must
//! not stall the async workers.

pub mod error;
pub mod payload;

use crate::auth::{AuthError, CredentialStore, PasswordHasher};
use crate::config::{Config, GatewayConfig};
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use payload::{CredentialsBody, DeleteBody, UpdateBody};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<CredentialStore>,
}

impl AppState {
    pub fn new(store: CredentialStore) -> Self {
        Self {
            store: Arc::new(store),
        }
    }
}

/// Concrete return type for handlers; errors map to responses in `error.rs`.
type ApiResponse = Result<(StatusCode, Json<serde_json::Value>), AuthError>;

/// Open the store and serve until Ctrl+C or SIGTERM.
///
/// A missing or unopenable database is fatal here, before anything binds.
pub async fn run_gateway(config: Config) -> Result<()> {
    config.validate()?;
    let store = open_store(&config)?;

    let state = AppState::new(store);
    let app = build_router(state, &config.gateway)?;

    let host = config.gateway.host.as_str();
    let port = config.gateway.port;
    let listener = TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind {host}:{port}"))?;
    tracing::info!("FitTrack accounts listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shut down");
    Ok(())
}

/// Open the configured database and confirm it answers a query.
pub fn open_store(config: &Config) -> Result<CredentialStore> {
    let database_url = config.database_url()?;

    let hasher = PasswordHasher::new(config.auth.hash_rounds)
        .context("Failed to initialize password hasher")?;
    let rounds = hasher.rounds();
    let store = CredentialStore::open(database_url, hasher)
        .with_context(|| format!("Failed to open account database '{database_url}'"))?;
    let accounts = store
        .count()
        .with_context(|| format!("Failed to read account database '{database_url}'"))?;
    tracing::info!(accounts, rounds, "Account store opened at {}", store.location());

    Ok(store)
}

/// Assemble routes and middleware.
pub fn build_router(state: AppState, config: &GatewayConfig) -> Result<Router> {
    let cors = CorsLayer::new()
        .allow_origin(allowed_origins(&config.cors_allowed_origins)?)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/users", post(handle_create_user).get(handle_list_users))
        .route("/login", post(handle_login))
        .route("/update/users", put(handle_update_user))
        .route("/delete/users", delete(handle_delete_user))
        .with_state(state)
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ));

    Ok(app)
}

fn allowed_origins(origins: &[String]) -> Result<AllowOrigin> {
    if origins.is_empty() {
        return Ok(AllowOrigin::from(Any));
    }
    let values = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .with_context(|| format!("Invalid CORS origin: {origin}"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(AllowOrigin::list(values))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                tracing::info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

/// Lets a blocking store call see that its request future was dropped.
#[derive(Clone)]
struct Checkpoint(Arc<AtomicBool>);

impl Checkpoint {
    /// Fails with `Abandoned` once the request is gone. Call before a write.
    fn ensure_live(&self) -> Result<(), AuthError> {
        if self.0.load(Ordering::Acquire) {
            return Err(AuthError::Abandoned);
        }
        Ok(())
    }
}

/// Marks the checkpoint abandoned when the awaiting future is dropped.
struct AbandonOnDrop(Arc<AtomicBool>);

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Run a store call on the blocking pool.
///
/// The blocking task is not cancelled when the request times out: the
/// `TimeoutLayer` answers 408 and drops this future, but the closure keeps
/// running. Closures that write must call `Checkpoint::ensure_live` first so
/// a request the client saw time out does not commit afterwards. A write
/// already past its checkpoint still completes.
async fn with_store<T, F>(state: &AppState, f: F) -> Result<T, AuthError>
where
    T: Send + 'static,
    F: FnOnce(&CredentialStore, &Checkpoint) -> Result<T, AuthError> + Send + 'static,
{
    let store = Arc::clone(&state.store);
    let abandoned = Arc::new(AtomicBool::new(false));
    let checkpoint = Checkpoint(Arc::clone(&abandoned));
    let _guard = AbandonOnDrop(abandoned);
    tokio::task::spawn_blocking(move || f(&store, &checkpoint)).await?
}

/// Confirm the caller knows the target account's password.
///
/// Unlike login, this distinguishes a missing account (404) from a wrong
/// password (401), matching the update/delete contract.
fn require_owner(store: &CredentialStore, username: &str, password: &str) -> Result<(), AuthError> {
    if store.find(username)?.is_none() {
        return Err(AuthError::NotFound);
    }
    if !store.authenticate(username, password)? {
        return Err(AuthError::InvalidCredentials);
    }
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// AXUM HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// GET /health
async fn handle_health(State(state): State<AppState>) -> ApiResponse {
    let accounts = with_store(&state, |store, _| store.count()).await?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "accounts": accounts,
        })),
    ))
}

/// POST /users — create a new account.
async fn handle_create_user(
    State(state): State<AppState>,
    body: Result<Json<CredentialsBody>, JsonRejection>,
) -> ApiResponse {
    let creds = payload::parse_body(body)?.validate()?;

    let account = with_store(&state, move |store, checkpoint| {
        checkpoint.ensure_live()?;
        store.create(&creds.username, &creds.password)
    })
    .await?;
    tracing::info!(username = %account.username, id = %account.id, "Account created");

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "message": "User created successfully",
            "user": account,
        })),
    ))
}

/// POST /login — check credentials. No session is issued.
async fn handle_login(
    State(state): State<AppState>,
    body: Result<Json<CredentialsBody>, JsonRejection>,
) -> ApiResponse {
    let creds = payload::parse_body(body)?.validate()?;
    let username = creds.username.clone();

    let matched =
        with_store(&state, move |store, _| store.authenticate(&creds.username, &creds.password))
            .await?;
    if !matched {
        tracing::info!(username = %username, "Login rejected");
        return Err(AuthError::InvalidCredentials);
    }

    tracing::debug!(username = %username, "Login accepted");
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({"message": "Login successful"})),
    ))
}

/// PUT /update/users — change the password of an account the caller owns.
async fn handle_update_user(
    State(state): State<AppState>,
    body: Result<Json<UpdateBody>, JsonRejection>,
) -> ApiResponse {
    let change = payload::parse_body(body)?.validate()?;

    let account = with_store(&state, move |store, checkpoint| {
        require_owner(store, &change.username, &change.current_password)?;
        checkpoint.ensure_live()?;
        store.update(&change.username, &change.new_password)
    })
    .await?;
    tracing::info!(username = %account.username, "Password updated");

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "message": "User updated successfully",
            "user": account,
        })),
    ))
}

/// DELETE /delete/users — permanently delete an account the caller owns.
async fn handle_delete_user(
    State(state): State<AppState>,
    body: Result<Json<DeleteBody>, JsonRejection>,
) -> ApiResponse {
    let creds = payload::parse_body(body)?.validate()?;
    let username = creds.username.clone();

    with_store(&state, move |store, checkpoint| {
        require_owner(store, &creds.username, &creds.password)?;
        checkpoint.ensure_live()?;
        store.delete(&creds.username)
    })
    .await?;
    tracing::info!(username = %username.trim(), "Account deleted");

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({"message": "User deleted successfully"})),
    ))
}

/// GET /users — every account, without password hashes.
async fn handle_list_users(State(state): State<AppState>) -> ApiResponse {
    let accounts = with_store(&state, |store, _| store.list()).await?;
    Ok((StatusCode::OK, Json(serde_json::json!(accounts))))
}
