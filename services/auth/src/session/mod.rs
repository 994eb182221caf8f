//! Login sessions with sliding and absolute expiry
//!
//! [`SessionManager`] owns the session policy. Records are persisted through
//! a [`common::store::SessionStore`] under a [`SessionKey`] that the HTTP
//! layer binds to a cookie.

pub mod clock;
pub mod key;
pub mod manager;
pub mod record;

pub use clock::{Clock, ManualClock, SystemClock};
pub use key::SessionKey;
pub use manager::{Renewal, SessionConfig, SessionError, SessionManager};
pub use record::{Identity, SessionRecord, is_effectively_authenticated};
