//! Response caching end to end: the same GET served twice, first by the
//! handler, then straight from the cache.
//!
//! Run with:
//!
//! ```sh
//! cargo run --example response_cache
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use shardcache::cache::{CacheMiddleware, CachePolicyConfig, InMemoryCache};
use shardcache::middleware::{LoggerMiddleware, MiddlewareHandler, Next, from_middleware};
use shardcache::{Request, Response, StatusCode};

const RAW_REQUEST: &[u8] =
    b"GET /items?id=1 HTTP/1.1\r\nHost: demo.local\r\nAccept-Language: en-US\r\n\r\n";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,shardcache=debug".into()),
        )
        .init();

    let policy = CacheMiddleware::new(
        Arc::new(InMemoryCache::new()),
        CachePolicyConfig::with_secret(&b"demo-secret"[..]),
    );

    // A deliberately slow handler standing in for real rendering work.
    let handler: MiddlewareHandler = Arc::new(|request: Request, _next: Next| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            Response::new(StatusCode::Ok)
                .header("Content-Type", "text/plain")
                .body(format!("rendered {}", request.path()))
        })
    });

    let stack = vec![
        from_middleware(Arc::new(LoggerMiddleware)),
        from_middleware(Arc::new(policy)),
        handler,
    ];

    for attempt in 1..=2 {
        let (request, _) = Request::parse(RAW_REQUEST).expect("static request parses");
        let start = Instant::now();
        let response = Next::new(stack.clone()).run(request).await;
        println!(
            "attempt {attempt}: {} in {:?}",
            response.status(),
            start.elapsed()
        );
    }
}
