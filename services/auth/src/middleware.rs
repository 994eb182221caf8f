//! Session authentication middleware
//!
//! Protected routes are wrapped with [`session_auth`]. It admits a request
//! only when the bound session is still authenticated and hands the verified
//! identity to handlers as an [`AuthUser`] request extension.
//! [`basic_auth`] does the same for clients sending HTTP Basic credentials
//! on every request.

use std::net::SocketAddr;

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::PrivateCookieJar;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{AppState, error::AuthError, rate_limiter::attempt_key, session::SessionRecord};

/// Verified identity of the caller, attached by [`session_auth`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthUser {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub authenticated: bool,
}

impl AuthUser {
    fn from_record(record: &SessionRecord) -> Self {
        Self {
            user_id: record.identity.user_id.clone(),
            device_id: record.identity.device_id.clone(),
            authenticated: record.authenticated,
        }
    }
}

/// Admit requests carrying an authenticated session
///
/// - no session or a lapsed one: `401`, the inner handler is not called
/// - session store failure: `500`, the request is not let through
///
/// A renewal write happens before the inner handler runs, and the refreshed
/// cookie is attached to the response.
pub async fn session_auth(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let key = state.cookie.session_key(&jar);

    let renewal = state.sessions.read_and_renew(key.as_ref()).await?;

    if !renewal.record.authenticated {
        debug!("Rejecting request to {} without a valid session", req.uri().path());
        return Err(AuthError::Unauthorized);
    }

    req.extensions_mut()
        .insert(AuthUser::from_record(&renewal.record));

    let response = next.run(req).await;

    match key {
        Some(key) if renewal.persisted => {
            Ok((state.cookie.bind(jar, &key), response).into_response())
        }
        _ => Ok(response),
    }
}

/// Admit requests carrying valid `Authorization: Basic` credentials
///
/// Credentials are checked against the same verifier and login limiter as
/// the login endpoint. No session is created. Missing or rejected
/// credentials get a `401` with a `WWW-Authenticate` challenge.
pub async fn basic_auth(
    State(state): State<AppState>,
    client: Option<ConnectInfo<SocketAddr>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let Some((username, password)) = basic_credentials(req.headers()) else {
        debug!("Challenging request to {} without Basic credentials", req.uri().path());
        return Err(AuthError::BasicChallenge);
    };

    let attempt = attempt_key(&username, client.map(|ConnectInfo(addr)| addr.ip()));
    if !state.rate_limiter.is_allowed(&attempt).await {
        warn!("Basic login blocked for user: {}", username);
        return Err(AuthError::TooManyRequests);
    }

    if !state.verifier.verify_credentials(&username, &password).await? {
        state.rate_limiter.record_failure(&attempt).await;
        warn!("Rejected Basic credentials for user: {}", username);
        return Err(AuthError::BasicChallenge);
    }
    state.rate_limiter.reset(&attempt).await;

    req.extensions_mut().insert(AuthUser {
        user_id: username,
        device_id: None,
        authenticated: true,
    });
    Ok(next.run(req).await)
}

/// Decode `Authorization: Basic base64(user:password)`
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (username, password) = decoded.split_once(':')?;
    if username.is_empty() {
        return None;
    }
    Some((username.to_string(), password.to_string()))
}

/// Extract the authenticated user from the request extensions
pub fn get_current_user<B>(req: &axum::http::Request<B>) -> Option<AuthUser> {
    req.extensions()
        .get::<AuthUser>()
        .filter(|user| user.authenticated && !user.user_id.is_empty())
        .cloned()
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .filter(|user| user.authenticated && !user.user_id.is_empty())
            .cloned()
            .ok_or(AuthError::Unauthorized)
    }
}
