//! Authentication utility functions.

use rand::prelude::RngExt;
use rand::rng;

use crate::config::Config;

/// Derive a username for an account created on someone's behalf, e.g. when an
/// application is approved.
/// Format: "{local part of email}-{4-digit number}"
/// Example: "ada.lovelace-4729"
pub fn generate_username(email: &str) -> String {
    let local: String = email
        .split('@')
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .take(32)
        .collect::<String>()
        .to_lowercase();
    let local = if local.is_empty() { "volunteer".to_string() } else { local };

    let number = rng().random_range(1000..10000);
    format!("{local}-{number}")
}

/// `Set-Cookie` value carrying a session token.
pub fn create_session_cookie(token: &str, config: &Config) -> String {
    let session = &config.auth.native.session;
    let max_age = config.auth.security.jwt_expiry.as_secs();
    let secure = if session.cookie_secure { "; Secure" } else { "" };
    format!(
        "{}={token}; Path=/; HttpOnly; SameSite={}; Max-Age={max_age}{secure}",
        session.cookie_name, session.cookie_same_site
    )
}

/// `Set-Cookie` value that removes the session cookie.
pub fn clear_session_cookie(config: &Config) -> String {
    let session = &config.auth.native.session;
    let secure = if session.cookie_secure { "; Secure" } else { "" };
    format!(
        "{}=; Path=/; HttpOnly; SameSite={}; Max-Age=0{secure}",
        session.cookie_name, session.cookie_same_site
    )
}
