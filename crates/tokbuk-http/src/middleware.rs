//! Hyper service wrapper that enforces a [`RateLimit`]
//!
//! Admitted requests are forwarded to the inner service unchanged. Rejected
//! requests never reach it and get `429 Too Many Requests`.

use std::future::{self, Future};
use std::pin::Pin;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};

use crate::key::RequestHead;
use crate::policy::RateLimit;

/// Body of every rejection response.
pub const REJECTION_BODY: &str = "rate limit exceeded\n";

/// Boxed response future returned by [`RateLimited`].
pub type ResponseFuture<E> =
    Pin<Box<dyn Future<Output = Result<Response<Full<Bytes>>, E>> + Send>>;

/// Builds the response sent to a client whose bucket is empty.
pub fn too_many_requests() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(REJECTION_BODY.as_bytes())));
    *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
    let headers = response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    response
}

/// Service `S` guarded by a shared rate-limit policy.
#[derive(Debug)]
pub struct RateLimited<S> {
    policy: Arc<RateLimit>,
    inner: S,
}

impl<S> RateLimited<S> {
    pub fn new(policy: Arc<RateLimit>, inner: S) -> Self {
        Self { policy, inner }
    }

    pub fn policy(&self) -> &Arc<RateLimit> {
        &self.policy
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: Clone> Clone for RateLimited<S> {
    fn clone(&self) -> Self {
        Self {
            policy: Arc::clone(&self.policy),
            inner: self.inner.clone(),
        }
    }
}

impl<S, B> Service<Request<B>> for RateLimited<S>
where
    S: Service<Request<B>, Response = Response<Full<Bytes>>>,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = Response<Full<Bytes>>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Error>;

    fn call(&self, req: Request<B>) -> Self::Future {
        let admission = self.policy.check(&RequestHead::from_request(&req));
        if !admission.is_admitted() {
            return Box::pin(future::ready(Ok(too_many_requests())));
        }
        Box::pin(self.inner.call(req))
    }
}
