//! Masking of credentials before they reach the logs.

use url::Url;

/// Masks the password in a connection string.
///
/// `redis://:password@host:6379/0` becomes `redis://:***@host:6379/0`.
/// Strings that do not parse as URLs, or carry no password, are returned
/// unchanged.
pub fn mask_connection_string(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) if url.password().is_some() => {
            if url.set_password(Some("***")).is_err() {
                return raw.to_string();
            }
            url.into()
        }
        _ => raw.to_string(),
    }
}

/// Masks a bare secret such as an ACL token or password.
pub fn mask_secret(secret: &str) -> &'static str {
    if secret.is_empty() { "<empty>" } else { "***" }
}
