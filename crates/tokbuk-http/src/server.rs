//! Rate-limited HTTP endpoint
//!
//! Serves a single route behind a [`RateLimited`] guard: admitted requests
//! get `200 allowed`, rejected ones `429`. Every method on the route is
//! limited. Any other path is `404` and does not consume tokens.

use std::convert::Infallible;
use std::future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::{service_fn, Service};
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::key::RemoteAddr;
use crate::middleware::{RateLimited, ResponseFuture};
use crate::policy::RateLimit;

/// Body returned for admitted requests.
pub const ADMITTED_BODY: &str = "allowed\n";

/// HTTP/1 server exposing one rate-limited route.
#[derive(Debug)]
pub struct AdmissionServer {
    policy: Arc<RateLimit>,
    route: String,
    addr: SocketAddr,
}

impl AdmissionServer {
    /// Creates a new `AdmissionServer`.
    ///
    /// # Arguments
    /// * `policy` - Rate-limit policy guarding `route`
    /// * `endpoint` - Address to bind, e.g. `"127.0.0.1:8080"`
    /// * `route` - Path of the limited endpoint, e.g. `"/test"`
    pub fn new(
        policy: Arc<RateLimit>,
        endpoint: &str,
        route: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let addr: SocketAddr = endpoint.parse()?;
        Ok(Self {
            policy,
            route: route.into(),
            addr,
        })
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    /// Binds the configured address and serves until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }

    /// Binds the configured address without serving yet.
    pub async fn bind(&self) -> anyhow::Result<TcpListener> {
        TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("Failed to bind admission endpoint {}", self.addr))
    }

    /// Serves on an already bound listener until `shutdown` is cancelled.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        info!(
            addr = %listener.local_addr()?,
            route = %self.route,
            capacity = self.policy.capacity(),
            rate = self.policy.rate(),
            "Admission server listening"
        );

        let limited = RateLimited::new(
            Arc::clone(&self.policy),
            service_fn(allowed::<hyper::body::Incoming>),
        );
        let route: Arc<str> = Arc::from(self.route.as_str());

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, peer) = result?;
                    debug!(peer = %peer, "Accepted connection");
                    let io = TokioIo::new(stream);
                    let limited = limited.clone();
                    let route = Arc::clone(&route);

                    tokio::spawn(async move {
                        let service = service_fn(move |mut req: Request<hyper::body::Incoming>| {
                            req.extensions_mut().insert(RemoteAddr(peer));
                            dispatch(&limited, &route, req)
                        });

                        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                            error!(error = %e, peer = %peer, "HTTP connection error");
                        }
                    });
                }
                _ = shutdown.cancelled() => {
                    info!("Admission server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Sends requests for `route`, whatever their method, through the limiter
/// and answers 404 otherwise.
fn dispatch<S, B>(limited: &RateLimited<S>, route: &str, req: Request<B>) -> ResponseFuture<S::Error>
where
    S: Service<Request<B>, Response = Response<Full<Bytes>>>,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    if req.uri().path() == route {
        limited.call(req)
    } else {
        let mut response = Response::new(Full::new(Bytes::from_static(b"Not Found")));
        *response.status_mut() = StatusCode::NOT_FOUND;
        Box::pin(future::ready(Ok(response)))
    }
}

async fn allowed<B>(_req: Request<B>) -> Result<Response<Full<Bytes>>, Infallible> {
    Ok(Response::new(Full::new(Bytes::from_static(
        ADMITTED_BODY.as_bytes(),
    ))))
}
