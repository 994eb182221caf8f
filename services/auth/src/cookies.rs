//! Session key binding through an encrypted cookie
//!
//! The cookie only carries the session key; the record itself stays in the
//! session store. The key is encrypted and authenticated by
//! `PrivateCookieJar`, so a client cannot forge or read it.

use anyhow::{Context, Result};
use axum_extra::extract::PrivateCookieJar;
use axum_extra::extract::cookie::{Cookie, Key, SameSite};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use time::Duration;
use tracing::{debug, warn};

use crate::config::CookieSettings;
use crate::session::SessionKey;

/// How the session cookie is written
#[derive(Debug, Clone)]
pub struct SessionCookie {
    name: String,
    secure: bool,
    max_age: Duration,
}

impl SessionCookie {
    /// `max_age_secs` should cover the forced re-authentication window, so
    /// the browser keeps the key as long as the session can live
    pub fn new(settings: &CookieSettings, max_age_secs: i64) -> Self {
        Self {
            name: settings.name.clone(),
            secure: settings.secure,
            max_age: Duration::seconds(max_age_secs),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve the session key bound to a request, if any
    pub fn session_key(&self, jar: &PrivateCookieJar) -> Option<SessionKey> {
        let cookie = jar.get(&self.name)?;
        let key = SessionKey::parse(cookie.value());
        if key.is_none() {
            debug!("Ignoring malformed session cookie");
        }
        key
    }

    /// Bind `key` to the response
    pub fn bind(&self, jar: PrivateCookieJar, key: &SessionKey) -> PrivateCookieJar {
        jar.add(
            Cookie::build((self.name.clone(), key.to_string()))
                .http_only(true)
                .secure(self.secure)
                .same_site(SameSite::Lax)
                .path("/")
                .max_age(self.max_age),
        )
    }

    /// Remove the session cookie from the client
    pub fn unbind(&self, jar: PrivateCookieJar) -> PrivateCookieJar {
        jar.remove(Cookie::build(self.name.clone()).path("/"))
    }
}

/// Load the cookie encryption key from its base64 form, or generate one
pub fn load_cookie_key(settings: &CookieSettings) -> Result<Key> {
    match settings.key.as_deref() {
        Some(encoded) => {
            let bytes = STANDARD
                .decode(encoded.trim())
                .context("Cookie key is not valid base64")?;
            Key::try_from(bytes.as_slice())
                .map_err(|_| anyhow::anyhow!("Cookie key must be at least 64 bytes"))
        }
        None => {
            warn!("No cookie key configured, generating a random one; sessions will not survive a restart");
            Ok(Key::generate())
        }
    }
}
