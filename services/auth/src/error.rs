//! HTTP error responses for the authentication service

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::WWW_AUTHENTICATE},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::session::SessionError;
use crate::verifier::VerifierError;

/// Challenge sent with a rejected Basic authentication attempt
pub const BASIC_CHALLENGE: &str = r#"Basic realm="session-auth", charset="UTF-8""#;

/// Errors returned to HTTP clients
///
/// Internal failures carry no detail in the response body; the cause is
/// logged where the error is created.
#[derive(Error, Debug)]
pub enum AuthError {
    /// No valid session, or rejected credentials
    #[error("Unauthorized")]
    Unauthorized,

    /// Missing or rejected Basic credentials, answered with a challenge
    #[error("Unauthorized")]
    BasicChallenge,

    /// Bad request with message
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Login attempts for this user are temporarily blocked
    #[error("Too many requests")]
    TooManyRequests,

    /// Internal server error
    #[error("Internal server error")]
    InternalServerError,
}

impl From<SessionError> for AuthError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::EmptyIdentity => AuthError::BadRequest(e.to_string()),
            _ => {
                error!("Session error: {}", e);
                AuthError::InternalServerError
            }
        }
    }
}

impl From<VerifierError> for AuthError {
    fn from(e: VerifierError) -> Self {
        error!("Credential verification failed: {}", e);
        AuthError::InternalServerError
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let challenge = matches!(self, AuthError::BasicChallenge);
        let (status, error_message) = match self {
            AuthError::Unauthorized | AuthError::BasicChallenge => {
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            AuthError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AuthError::TooManyRequests => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many login attempts".to_string(),
            ),
            AuthError::InternalServerError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        let mut response = (status, body).into_response();
        if challenge {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static(BASIC_CHALLENGE));
        }
        response
    }
}

/// Type alias for handler results
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;
    use common::store::StoreError;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AuthError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::BadRequest("x".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::TooManyRequests.into_response().status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AuthError::InternalServerError.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_basic_challenge_carries_www_authenticate() {
        let response = AuthError::BasicChallenge.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(WWW_AUTHENTICATE).unwrap(),
            BASIC_CHALLENGE
        );

        let response = AuthError::Unauthorized.into_response();
        assert!(response.headers().get(WWW_AUTHENTICATE).is_none());
    }

    #[test]
    fn test_store_failures_become_internal_errors() {
        let err: AuthError =
            SessionError::StoreRead(StoreError::Unavailable("redis down".into())).into();
        assert!(matches!(err, AuthError::InternalServerError));

        let err: AuthError = SessionError::EmptyIdentity.into();
        assert!(matches!(err, AuthError::BadRequest(_)));
    }
}
