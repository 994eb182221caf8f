use std::fmt;

use uuid::Uuid;

/// Opaque identifier a session record is stored under
///
/// Keys are random UUIDs. Anything that does not parse as one is refused,
/// so a tampered cookie never reaches the store as a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    /// Mint a fresh random key
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Accept a key received from a client
    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw).ok().map(|id| Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_parse_back() {
        let key = SessionKey::generate();
        assert_eq!(SessionKey::parse(key.as_str()), Some(key));
    }

    #[test]
    fn test_rejects_non_uuid() {
        assert_eq!(SessionKey::parse(""), None);
        assert_eq!(SessionKey::parse("../../etc/passwd"), None);
        assert_eq!(SessionKey::parse("session:abc"), None);
    }
}
