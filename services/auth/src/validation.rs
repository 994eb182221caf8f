//! Input validation utilities

use regex::Regex;
use std::sync::OnceLock;

/// Validate a configured username
///
/// Login requests are not held to this rule: an unknown name is simply
/// rejected by the verifier.
pub fn validate_username(username: &str) -> Result<(), String> {
    if username.is_empty() {
        return Err("Username is required".to_string());
    }

    if username.len() < 3 {
        return Err("Username must be at least 3 characters long".to_string());
    }

    if username.len() > 64 {
        return Err("Username must be at most 64 characters long".to_string());
    }

    static USERNAME_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = USERNAME_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9_.@-]+$").expect("Failed to compile username regex")
    });

    if !regex.is_match(username) {
        return Err(
            "Username can only contain letters, numbers, dots, dashes, @ and underscores"
                .to_string(),
        );
    }

    Ok(())
}

/// Check that a login field is present
pub fn require_field(name: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} is required", name));
    }
    Ok(())
}
