//! Key namespacing helpers.

const SEPARATOR: &str = ":";

/// Joins `parts` with `:`.
///
/// ```
/// use service_common::redis::build_key;
///
/// assert_eq!(build_key(&["user", "42", "profile"]), "user:42:profile");
/// ```
pub fn build_key<S: AsRef<str>>(parts: &[S]) -> String {
    let mut key = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            key.push_str(SEPARATOR);
        }
        key.push_str(part.as_ref());
    }
    key
}

/// `cache:<prefix>:<key>`
pub fn build_cache_key(prefix: &str, key: &str) -> String {
    build_key(&["cache", prefix, key])
}

/// `lock:<resource>`, for use with [`super::RedisClient::lock`].
pub fn build_lock_key(resource: &str) -> String {
    build_key(&["lock", resource])
}
