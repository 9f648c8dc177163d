//! Ordered request gates that run before route dispatch.
//!
//! # Responsibility
//! - Inspect each request and pass it on or reject it with an `ApiError`.
//! - Provide the origin guard and the rate-limit gate.
//!
//! # Invariants
//! - The first `Reject` short-circuits; later interceptors and the handler never run.
//! - Headers returned with `Pass` are attached to the final response.
//! - The chain is assembled once in `build_router`; order is the order given.
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::ORIGIN, HeaderMap, HeaderName, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use log::{debug, warn};
use notebox_core::{Decision, FixedWindowLimiter, KeyStrategy};

use crate::{
    error::{retry_after_secs, ApiError},
    store::NoteStore,
};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Request facts interceptors may look at.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: Method,
    pub path: String,
    pub origin: Option<HeaderValue>,
    pub peer: Option<IpAddr>,
}

impl RequestInfo {
    pub fn from_request(req: &Request) -> Self {
        Self {
            method: req.method().clone(),
            path: req.uri().path().to_string(),
            origin: req.headers().get(ORIGIN).cloned(),
            peer: req
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0.ip()),
        }
    }
}

pub enum Verdict {
    /// Continue; the headers are merged into the eventual response.
    Pass(HeaderMap),
    Reject(ApiError),
}

#[async_trait]
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn inspect(&self, request: &RequestInfo) -> Verdict;
}

#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Arc<Vec<Arc<dyn Interceptor>>>,
}

impl InterceptorChain {
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        Self {
            interceptors: Arc::new(interceptors),
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }
}

/// axum middleware that runs the chain in order.
pub async fn run_interceptors(
    State(chain): State<InterceptorChain>,
    req: Request,
    next: Next,
) -> Response {
    let info = RequestInfo::from_request(&req);
    let mut extra_headers = HeaderMap::new();

    for interceptor in chain.interceptors.iter() {
        match interceptor.inspect(&info).await {
            Verdict::Pass(headers) => extra_headers.extend(headers),
            Verdict::Reject(error) => {
                debug!(
                    "event=request_rejected module=http interceptor={} method={} path={} reason={}",
                    interceptor.name(),
                    info.method,
                    info.path,
                    error
                );
                return error.into_response();
            }
        }
    }

    let mut response = next.run(req).await;
    response.headers_mut().extend(extra_headers);
    response
}

/// Rejects browser requests from any origin other than the configured one.
///
/// Requests without an `Origin` header pass; they do not come from a
/// cross-origin browser context.
pub struct OriginGuard {
    allowed: HeaderValue,
}

impl OriginGuard {
    pub fn new(allowed: HeaderValue) -> Self {
        Self { allowed }
    }
}

#[async_trait]
impl Interceptor for OriginGuard {
    fn name(&self) -> &'static str {
        "origin_guard"
    }

    async fn inspect(&self, request: &RequestInfo) -> Verdict {
        match &request.origin {
            Some(origin) if *origin != self.allowed => {
                warn!(
                    "event=origin_rejected module=http origin={:?} path={}",
                    origin, request.path
                );
                Verdict::Reject(ApiError::OriginRejected)
            }
            _ => Verdict::Pass(HeaderMap::new()),
        }
    }
}

/// Counts every request against the persisted fixed-window limiter.
pub struct RateLimitGate {
    store: NoteStore,
    limiter: FixedWindowLimiter,
    keys: KeyStrategy,
}

impl RateLimitGate {
    pub fn new(store: NoteStore, limiter: FixedWindowLimiter, keys: KeyStrategy) -> Self {
        Self {
            store,
            limiter,
            keys,
        }
    }
}

#[async_trait]
impl Interceptor for RateLimitGate {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    async fn inspect(&self, request: &RequestInfo) -> Verdict {
        let key = self.keys.client_key(request.peer);
        let limiter = self.limiter;

        let decision = self
            .store
            .run(move |conn| Ok(limiter.check(conn, &key)?))
            .await;

        match decision {
            Ok(Decision::Allowed {
                limit,
                remaining,
                reset_after,
            }) => Verdict::Pass(rate_limit_headers(limit, remaining, reset_after)),
            Ok(Decision::Denied { retry_after, .. }) => {
                Verdict::Reject(ApiError::RateLimited { retry_after })
            }
            Err(error) => Verdict::Reject(error),
        }
    }
}

/// `X-RateLimit-*` headers for an allowed request. The reset value is rounded
/// up like `Retry-After`, so it never reads 0 while the window is still open.
fn rate_limit_headers(limit: u32, remaining: u32, reset_after: Duration) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
    headers.insert(
        X_RATELIMIT_RESET,
        HeaderValue::from(retry_after_secs(reset_after)),
    );
    headers
}

#[cfg(test)]
mod tests {
    use super::{rate_limit_headers, X_RATELIMIT_RESET};
    use std::time::Duration;

    #[test]
    fn reset_header_rounds_up_in_last_second() {
        let headers = rate_limit_headers(100, 3, Duration::from_millis(400));
        assert_eq!(headers[X_RATELIMIT_RESET], "1");

        let headers = rate_limit_headers(100, 3, Duration::from_millis(12_001));
        assert_eq!(headers[X_RATELIMIT_RESET], "13");
    }
}
