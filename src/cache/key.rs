//! Cache-key derivation — a stable, keyed digest for "this logical request".
//!
//! Two requests that should share a cached response must derive the same key,
//! and nothing else may collide with it. The key is an HMAC-SHA256 over the
//! request's identifying components, keyed by an application secret so cache
//! entries cannot be addressed or primed by guessing digests.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Separator joining the key components. Not expected inside a URL's
/// authority/path or a locale code, which keeps component boundaries
/// unambiguous.
const COMPONENT_DELIMITER: &str = "|";

/// Derives a cache key from the identifying components of a request.
///
/// Components are joined in a fixed order — `namespace` (only when present),
/// `locale`, `url` — and digested with HMAC-SHA256 under `secret`. The result
/// is the lowercase hex digest.
///
/// The same inputs always produce the same key, and changing any single
/// input (including the secret) produces a different key.
///
/// # Examples
///
/// ```
/// use shardcache::cache::derive_cache_key;
///
/// let key = derive_cache_key(
///     "http://shop.example/items?id=1",
///     "en_US",
///     None,
///     b"per-application-secret",
/// );
/// assert_eq!(key.len(), 64);
/// assert_eq!(
///     key,
///     derive_cache_key("http://shop.example/items?id=1", "en_US", None, b"per-application-secret"),
/// );
/// ```
pub fn derive_cache_key(
    url: &str,
    locale: &str,
    namespace: Option<&str>,
    secret: &[u8],
) -> String {
    let mut components = Vec::with_capacity(3);
    if let Some(namespace) = namespace {
        components.push(namespace);
    }
    components.push(locale);
    components.push(url);
    let message = components.join(COMPONENT_DELIMITER);

    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any size");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "http://shop.example/items?id=1";
    const SECRET: &[u8] = b"test-secret";

    #[test]
    fn identical_inputs_identical_key() {
        let a = derive_cache_key(URL, "en_US", Some("user:7"), SECRET);
        let b = derive_cache_key(URL, "en_US", Some("user:7"), SECRET);
        assert_eq!(a, b);
    }

    #[test]
    fn any_changed_input_changes_key() {
        let base = derive_cache_key(URL, "en_US", Some("user:7"), SECRET);

        let other_url = derive_cache_key("http://shop.example/items?id=2", "en_US", Some("user:7"), SECRET);
        let other_locale = derive_cache_key(URL, "zh_CN", Some("user:7"), SECRET);
        let other_namespace = derive_cache_key(URL, "en_US", Some("user:8"), SECRET);
        let no_namespace = derive_cache_key(URL, "en_US", None, SECRET);
        let other_secret = derive_cache_key(URL, "en_US", Some("user:7"), b"other-secret");

        for derived in [other_url, other_locale, other_namespace, no_namespace, other_secret] {
            assert_ne!(base, derived);
        }
    }

    #[test]
    fn key_is_lowercase_hex_digest() {
        let key = derive_cache_key(URL, "en_US", None, SECRET);
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
