//! Response-caching middleware — transparent read-through/write-through
//! caching around the request pipeline.
//!
//! [`CacheMiddleware`] derives a key from the inbound request (full URL,
//! resolved browser locale, optional namespace), short-circuits with the
//! stored response when the key is present and the method is cacheable, and
//! otherwise lets processing run and stores the produced response afterward.
//! Handlers never know they are cached, and a cache outage only makes
//! requests slower, never fail.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{CacheBackend, derive_cache_key};
use crate::http::{Method, StatusCode, resolve_locale};
use crate::middleware::{Middleware, Next};
use crate::{Request, Response};

/// Default expiration for stored responses, in seconds (2 hours).
pub const DEFAULT_TTL_SECONDS: u64 = 7200;

/// Configuration for [`CacheMiddleware`].
#[derive(Clone, Serialize, Deserialize)]
pub struct CachePolicyConfig {
    /// Key for the cache-key HMAC. Use a per-application secret, not a
    /// guessable constant.
    pub secret: Vec<u8>,
    /// Optional namespace prepended to every derived key (e.g. a tenant or
    /// user-identity prefix).
    pub namespace: Option<String>,
    /// Expiration for stored responses; `None` stores without expiry.
    pub ttl_seconds: Option<u64>,
    /// Methods whose responses may be served from and stored into the cache.
    pub cacheable_methods: Vec<Method>,
    /// Locales the application can serve; cache keys vary across these.
    pub supported_locales: Vec<String>,
    /// Locale used when the request has no resolvable preference.
    pub default_locale: String,
    /// Scheme used when reconstructing the request URL (set to `https` when
    /// TLS terminates upstream).
    pub scheme: String,
}

impl Default for CachePolicyConfig {
    fn default() -> Self {
        Self {
            secret: Vec::new(),
            namespace: None,
            ttl_seconds: Some(DEFAULT_TTL_SECONDS),
            cacheable_methods: vec![Method::Get, Method::Head],
            supported_locales: vec!["en_US".to_owned()],
            default_locale: "en_US".to_owned(),
            scheme: "http".to_owned(),
        }
    }
}

impl CachePolicyConfig {
    /// Default policy with the given HMAC secret.
    pub fn with_secret(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            ..Self::default()
        }
    }
}

impl std::fmt::Debug for CachePolicyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachePolicyConfig")
            .field("secret", &"[redacted]")
            .field("namespace", &self.namespace)
            .field("ttl_seconds", &self.ttl_seconds)
            .field("cacheable_methods", &self.cacheable_methods)
            .field("supported_locales", &self.supported_locales)
            .field("default_locale", &self.default_locale)
            .field("scheme", &self.scheme)
            .finish()
    }
}

/// A serialized response as stored in the cache: status, explicit headers,
/// and the exact body bytes.
#[derive(Debug, Serialize, Deserialize)]
struct CachedResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl CachedResponse {
    fn capture(response: &Response) -> Self {
        let (status, headers, body) = response.parts();
        Self {
            status: status.as_u16(),
            headers: headers
                .iter()
                .map(|(name, value)| (name.to_owned(), value.to_owned()))
                .collect(),
            body: body.to_vec(),
        }
    }

    fn into_response(self) -> Option<Response> {
        let status = StatusCode::from_u16(self.status)?;
        let mut response = Response::new(status);
        for (name, value) in self.headers {
            response.add_header(name, value);
        }
        Some(response.body_bytes(self.body))
    }
}

/// Read-through/write-through response caching middleware.
///
/// Per request: derive the key; on a hit for a cacheable method, emit the
/// stored response without invoking downstream processing; on a miss, run the
/// pipeline, store the serialized response under the key, and pass the
/// original response onward unchanged.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use shardcache::cache::{CacheMiddleware, CachePolicyConfig, InMemoryCache};
/// use shardcache::middleware::from_middleware;
///
/// let policy = CacheMiddleware::new(
///     Arc::new(InMemoryCache::new()),
///     CachePolicyConfig::with_secret(&b"per-application-secret"[..]),
/// );
/// let handler = from_middleware(Arc::new(policy));
/// ```
pub struct CacheMiddleware {
    cache: Arc<dyn CacheBackend>,
    config: CachePolicyConfig,
}

impl CacheMiddleware {
    /// Creates the policy over any [`CacheBackend`].
    pub fn new(cache: Arc<dyn CacheBackend>, config: CachePolicyConfig) -> Self {
        Self { cache, config }
    }

    /// Derives the cache key for `request`, exactly as the policy itself
    /// does. Exposed for application code that wants ad-hoc caching keyed by
    /// the same scheme.
    ///
    /// An explicit `namespace` overrides the configured one.
    pub fn cache_key(&self, request: &Request, namespace: Option<&str>) -> String {
        let locale = resolve_locale(
            request.headers().get("accept-language"),
            &self.config.supported_locales,
            &self.config.default_locale,
        );
        let url = request.full_url(&self.config.scheme);
        derive_cache_key(
            &url,
            &locale,
            namespace.or(self.config.namespace.as_deref()),
            &self.config.secret,
        )
    }

    fn is_cacheable(&self, method: &Method) -> bool {
        self.config.cacheable_methods.contains(method)
    }
}

/// Decodes a stored payload back into a response; a payload this crate
/// cannot decode (corruption, format drift) is treated as a miss.
fn decode_cached(key: &str, payload: &[u8]) -> Option<Response> {
    match serde_json::from_slice::<CachedResponse>(payload) {
        Ok(cached) => match cached.into_response() {
            Some(response) => Some(response),
            None => {
                warn!(key, "cached response has unknown status code — ignoring");
                None
            }
        },
        Err(error) => {
            warn!(key, %error, "discarding undecodable cache entry");
            None
        }
    }
}

impl Middleware for CacheMiddleware {
    fn handle(
        &self,
        request: Request,
        next: Next,
    ) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let cache = Arc::clone(&self.cache);
        let cacheable = self.is_cacheable(request.method());
        let key = self.cache_key(&request, None);
        let ttl = self.config.ttl_seconds;

        Box::pin(async move {
            if cacheable {
                if let Some(stored) = cache.get(&key).await {
                    if let Some(response) = decode_cached(&key, &stored) {
                        debug!(%key, "serving cached response");
                        return response;
                    }
                }
            }

            let response = next.run(request).await;

            if cacheable {
                match serde_json::to_vec(&CachedResponse::capture(&response)) {
                    Ok(payload) => cache.set(&key, Bytes::from(payload), ttl).await,
                    Err(error) => warn!(%key, %error, "failed to serialize response for caching"),
                }
            }

            response
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::cache::{InMemoryCache, NullCache};
    use crate::middleware::{MiddlewareHandler, from_middleware};

    const RAW_GET: &[u8] =
        b"GET /items?id=1 HTTP/1.1\r\nHost: shop.example\r\nAccept-Language: en-US\r\n\r\n";

    fn request(raw: &[u8]) -> Request {
        Request::parse(raw).unwrap().0
    }

    /// Handler that counts invocations and answers with a fixed JSON body.
    fn counting_handler(counter: Arc<AtomicUsize>) -> MiddlewareHandler {
        Arc::new(move |_request: Request, _next: Next| {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Response::new(StatusCode::Ok)
                    .header("Content-Type", "application/json")
                    .body(r#"{"id":1}"#)
            })
        })
    }

    fn pipeline(cache: Arc<dyn CacheBackend>, counter: Arc<AtomicUsize>) -> Vec<MiddlewareHandler> {
        let policy = CacheMiddleware::new(cache, CachePolicyConfig::with_secret(&b"test-secret"[..]));
        vec![from_middleware(Arc::new(policy)), counting_handler(counter)]
    }

    #[tokio::test]
    async fn miss_then_hit_short_circuits_processing() {
        let cache = Arc::new(InMemoryCache::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let stack = pipeline(cache.clone(), counter.clone());

        // First request: miss. The handler runs and the response is stored.
        let first = Next::new(stack.clone()).run(request(RAW_GET)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);

        // Identical second request: hit. The handler does not run.
        let second = Next::new(stack).run(request(RAW_GET)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // The stored response is byte-exact.
        assert_eq!(second.status(), first.status());
        let (_, first_headers, first_body) = first.parts();
        let (_, second_headers, second_body) = second.parts();
        assert_eq!(second_body, first_body);
        assert_eq!(
            second_headers.get("content-type"),
            first_headers.get("content-type")
        );
    }

    #[tokio::test]
    async fn non_cacheable_methods_bypass_the_cache() {
        let cache = Arc::new(InMemoryCache::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let stack = pipeline(cache.clone(), counter.clone());

        let raw = b"POST /items HTTP/1.1\r\nHost: shop.example\r\nContent-Length: 0\r\n\r\n";
        Next::new(stack.clone()).run(request(raw)).await;
        Next::new(stack).run(request(raw)).await;

        // Both requests were processed; nothing was stored.
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn locale_varies_the_key() {
        let cache = Arc::new(InMemoryCache::new());
        let counter = Arc::new(AtomicUsize::new(0));

        let policy = CacheMiddleware::new(cache.clone(), {
            let mut config = CachePolicyConfig::with_secret(&b"test-secret"[..]);
            config.supported_locales = vec!["en_US".to_owned(), "zh_CN".to_owned()];
            config
        });
        let stack = vec![
            from_middleware(Arc::new(policy)),
            counting_handler(counter.clone()),
        ];

        Next::new(stack.clone()).run(request(RAW_GET)).await;

        let raw_zh =
            b"GET /items?id=1 HTTP/1.1\r\nHost: shop.example\r\nAccept-Language: zh-CN\r\n\r\n";
        Next::new(stack).run(request(raw_zh)).await;

        // Different locales never share an entry.
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn cache_outage_never_fails_the_request() {
        let counter = Arc::new(AtomicUsize::new(0));
        let stack = pipeline(Arc::new(NullCache::new()), counter.clone());

        let first = Next::new(stack.clone()).run(request(RAW_GET)).await;
        let second = Next::new(stack).run(request(RAW_GET)).await;

        // Every store is dropped, so every request is processed.
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(first.status(), StatusCode::Ok);
        assert_eq!(second.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn corrupt_entries_are_treated_as_misses() {
        let cache = Arc::new(InMemoryCache::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let stack = pipeline(cache.clone(), counter.clone());

        // Pre-seed garbage under the derived key.
        let policy = CacheMiddleware::new(
            cache.clone(),
            CachePolicyConfig::with_secret(&b"test-secret"[..]),
        );
        let key = policy.cache_key(&request(RAW_GET), None);
        cache.set(&key, Bytes::from_static(b"not json"), None).await;

        let response = Next::new(stack).run(request(RAW_GET)).await;
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cache_key_namespace_override() {
        let policy = CacheMiddleware::new(
            Arc::new(NullCache::new()),
            CachePolicyConfig::with_secret(&b"test-secret"[..]),
        );
        let req = request(RAW_GET);
        let plain = policy.cache_key(&req, None);
        let scoped = policy.cache_key(&req, Some("user:7"));
        assert_ne!(plain, scoped);
        // Deterministic for identical inputs.
        assert_eq!(scoped, policy.cache_key(&req, Some("user:7")));
    }
}
