//! Session based authentication service
//!
//! Users log in with a username and password, receive an encrypted session
//! cookie, and are admitted to protected routes by [`middleware::session_auth`]
//! while their session is valid. Sessions slide forward with activity up to
//! a hard re-authentication deadline.

pub mod config;
pub mod cookies;
pub mod error;
pub mod middleware;
pub mod models;
pub mod rate_limiter;
pub mod repositories;
pub mod routes;
pub mod session;
pub mod validation;
pub mod verifier;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{Router, extract::FromRef};
use axum_extra::extract::cookie::Key;
use common::{
    cache::{RedisConfig, RedisPool},
    database::{DatabaseConfig, init_pool},
    store::{FilesystemStore, MemoryStore, RedisStore, SessionStore},
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    config::{AppConfig, StoreKind, UserSource},
    cookies::{SessionCookie, load_cookie_key},
    rate_limiter::{RateLimiter, RateLimiterConfig},
    repositories::UserRepository,
    session::{SessionConfig, SessionManager},
    verifier::{CredentialVerifier, DatabaseUsers, StaticUsers},
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionManager,
    pub verifier: Arc<dyn CredentialVerifier>,
    pub rate_limiter: RateLimiter,
    pub cookie: SessionCookie,
    pub cookie_key: Key,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

impl AppState {
    /// Wire the state from already constructed collaborators
    pub fn new(
        sessions: SessionManager,
        verifier: Arc<dyn CredentialVerifier>,
        cookie: SessionCookie,
        cookie_key: Key,
    ) -> Self {
        Self {
            sessions,
            verifier,
            rate_limiter: RateLimiter::new(RateLimiterConfig::default()),
            cookie,
            cookie_key,
        }
    }

    /// Build the state described by `config`, connecting to the configured
    /// session store and user source
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let session_config = config.session.to_session_config().normalized();
        let store = open_store(config, &session_config).await?;
        let sessions = SessionManager::new(store, session_config);

        let verifier = open_verifier(config).await?;

        let cookie = SessionCookie::new(
            &config.cookie,
            sessions.config().max_session_duration.num_seconds(),
        );
        let cookie_key = load_cookie_key(&config.cookie)?;

        Ok(Self::new(sessions, verifier, cookie, cookie_key))
    }
}

/// Redis TTL for session keys: a record is useless past its forced
/// re-authentication deadline
fn store_ttl_secs(session: &SessionConfig) -> u64 {
    u64::try_from(session.max_session_duration.num_seconds()).unwrap_or_default()
}

async fn open_store(
    config: &AppConfig,
    session: &SessionConfig,
) -> Result<Arc<dyn SessionStore>> {
    let store: Arc<dyn SessionStore> = match config.store.kind {
        StoreKind::Memory => {
            info!("Using in-memory session store");
            Arc::new(MemoryStore::new())
        }
        StoreKind::Filesystem => {
            let dir = config
                .store
                .path
                .clone()
                .unwrap_or_else(std::env::temp_dir);
            Arc::new(
                FilesystemStore::open(dir)
                    .await
                    .context("Failed to open filesystem session store")?,
            )
        }
        StoreKind::Redis => {
            let pool = RedisPool::new(&RedisConfig {
                url: config.store.redis_url.clone(),
            })?;
            let store = RedisStore::new(pool, store_ttl_secs(session));
            if !store.health_check().await? {
                anyhow::bail!("Redis did not answer PING");
            }
            Arc::new(store)
        }
    };
    Ok(store)
}

async fn open_verifier(config: &AppConfig) -> Result<Arc<dyn CredentialVerifier>> {
    let verifier: Arc<dyn CredentialVerifier> = match config.users.source {
        UserSource::Static => Arc::new(StaticUsers::new(&config.users.static_users)?),
        UserSource::Database => {
            let url = config
                .users
                .database_url
                .as_deref()
                .context("users.database_url is required for the database user source")?;
            let pool = init_pool(&DatabaseConfig::new(url)).await?;
            if !common::database::health_check(&pool).await? {
                anyhow::bail!("Failed to connect to database");
            }
            info!("Database connection successful");
            Arc::new(DatabaseUsers::new(UserRepository::new(pool)))
        }
    };
    Ok(verifier)
}

/// Build the HTTP application with logging and a per-request deadline
pub fn create_app(state: AppState, request_timeout: Duration) -> Router {
    routes::create_router(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}
