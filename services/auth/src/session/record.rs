//! Session record and identity
//!
//! A record carries two independent clocks: `expires_at` slides forward on
//! activity, `force_reauth_at` is fixed at login. Whether a record still
//! authenticates its holder is derived from both on every read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who a session belongs to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// User ID or username, empty for anonymous sessions
    pub user_id: String,
    /// Optional device the session was opened from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            device_id: None,
        }
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_empty()
    }
}

/// Persisted session state
///
/// The default value is the anonymous "no session" record: no identity,
/// not authenticated and every timestamp at the Unix epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(default)]
    pub identity: Identity,
    #[serde(default)]
    pub authenticated: bool,
    /// Sliding expiry, pushed forward by renewals
    #[serde(default)]
    pub expires_at: DateTime<Utc>,
    /// Absolute ceiling, never moved after login
    #[serde(default)]
    pub force_reauth_at: DateTime<Utc>,
    #[serde(default)]
    pub(crate) last_persisted_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Apply both expiry clocks at `now`
    ///
    /// A lapsed record keeps its identity and timestamps but is no longer
    /// authenticated.
    pub fn derive(mut self, now: DateTime<Utc>) -> Self {
        self.authenticated = is_effectively_authenticated(&self, now);
        self
    }

    /// The earlier of the two expiry clocks
    pub fn valid_until(&self) -> DateTime<Utc> {
        self.expires_at.min(self.force_reauth_at)
    }
}

/// Whether `record` still authenticates its holder at `now`
///
/// Authentication ends once `now` passes either `expires_at` or
/// `force_reauth_at`, whatever the stored flag says.
pub fn is_effectively_authenticated(record: &SessionRecord, now: DateTime<Utc>) -> bool {
    record.authenticated
        && !record.identity.is_anonymous()
        && now <= record.expires_at
        && now <= record.force_reauth_at
}
