//! Authentication service routes

use std::net::SocketAddr;

use axum::{
    Form, Json, Router, async_trait,
    extract::{ConnectInfo, FromRequest, Request, State},
    http::header::CONTENT_TYPE,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use axum_extra::extract::PrivateCookieJar;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    AppState,
    error::{AuthError, AuthResult},
    middleware::{AuthUser, basic_auth, session_auth},
    rate_limiter::attempt_key,
    session::{Identity, SessionKey},
    validation::require_field,
};

/// Request for user login
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    /// Optional client-chosen device label stored with the session
    #[serde(default)]
    pub device: Option<String>,
}

/// Login status as seen by the client
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserStatus {
    pub username: String,
    #[serde(rename = "logged-in")]
    pub logged_in: bool,
}

/// Login payload, read from a JSON body or an urlencoded form
#[derive(Debug)]
pub struct Credentials(pub LoginRequest);

#[async_trait]
impl<S> FromRequest<S> for Credentials
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));

        let payload = if is_form {
            Form::<LoginRequest>::from_request(req, state)
                .await
                .map_err(|e| AuthError::BadRequest(e.body_text()))?
                .0
        } else {
            Json::<LoginRequest>::from_request(req, state)
                .await
                .map_err(|e| AuthError::BadRequest(e.body_text()))?
                .0
        };

        require_field("username", &payload.username).map_err(AuthError::BadRequest)?;
        require_field("password", &payload.password).map_err(AuthError::BadRequest)?;

        Ok(Credentials(payload))
    }
}

/// Create the router for the authentication service
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/api/v0/whoami", get(whoami))
        .route_layer(middleware::from_fn_with_state(state.clone(), session_auth));

    let basic_routes = Router::new()
        .route("/basic", get(whoami))
        .route_layer(middleware::from_fn_with_state(state.clone(), basic_auth));

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/login", post(login))
        .route("/auth/logout", get(logout).post(logout))
        .route("/auth/status", get(status))
        .merge(protected_routes)
        .merge(basic_routes)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "session-auth"
    }))
}

/// User login endpoint
///
/// A fresh session key is minted on every successful login, so a key
/// planted in the browser before login is never promoted to an
/// authenticated session.
pub async fn login(
    State(state): State<AppState>,
    client: Option<ConnectInfo<SocketAddr>>,
    jar: PrivateCookieJar,
    Credentials(payload): Credentials,
) -> AuthResult<impl IntoResponse> {
    info!("Login attempt for user: {}", payload.username);

    let attempt = attempt_key(&payload.username, client.map(|ConnectInfo(addr)| addr.ip()));
    if !state.rate_limiter.is_allowed(&attempt).await {
        warn!("Login blocked for user: {}", payload.username);
        return Err(AuthError::TooManyRequests);
    }

    let accepted = state
        .verifier
        .verify_credentials(&payload.username, &payload.password)
        .await?;

    if !accepted {
        state.rate_limiter.record_failure(&attempt).await;
        warn!("Rejected credentials for user: {}", payload.username);
        return Err(AuthError::Unauthorized);
    }
    state.rate_limiter.reset(&attempt).await;

    let mut identity = Identity::new(payload.username);
    if let Some(device) = payload.device.filter(|d| !d.trim().is_empty()) {
        identity = identity.with_device(device);
    }

    let key = SessionKey::generate();
    let record = state.sessions.issue(&key, identity).await?;

    let status = UserStatus {
        username: record.identity.user_id,
        logged_in: record.authenticated,
    };
    Ok((state.cookie.bind(jar, &key), Json(status)))
}

/// Logout endpoint
pub async fn logout(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
) -> AuthResult<impl IntoResponse> {
    let key = state.cookie.session_key(&jar);
    state.sessions.revoke(key.as_ref()).await?;

    let status = UserStatus {
        username: String::new(),
        logged_in: false,
    };
    Ok((state.cookie.unbind(jar), Json(status)))
}

/// Session status endpoint
///
/// Reads without renewing, so polling the status does not keep a session
/// alive.
pub async fn status(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
) -> AuthResult<Json<UserStatus>> {
    let key = state.cookie.session_key(&jar);
    let record = state.sessions.read(key.as_ref()).await?;

    Ok(Json(UserStatus {
        username: record.identity.user_id,
        logged_in: record.authenticated,
    }))
}

/// Identity injected by the session middleware
pub async fn whoami(user: AuthUser) -> Json<AuthUser> {
    Json(user)
}
