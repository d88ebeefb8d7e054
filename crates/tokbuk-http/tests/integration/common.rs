//! Shared helpers: spin up an admission server on 127.0.0.1:0

use std::net::SocketAddr;
use std::sync::Arc;

use tokbuk_core::{BucketRegistry, ManualClock};
use tokbuk_http::{AdmissionServer, KeyExtractor, RateLimit};
use tokbuk_telemetry::MetricsRegistry;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const ROUTE: &str = "/test";

/// A running server plus the handles a test needs to steer it.
pub struct TestServer {
    pub addr: SocketAddr,
    pub clock: Arc<ManualClock>,
    pub registry: Arc<BucketRegistry>,
    pub metrics: Arc<MetricsRegistry>,
    shutdown: CancellationToken,
    task: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Sends `GET path` and returns the status code.
    pub async fn get(&self, client: &reqwest::Client, path: &str) -> u16 {
        client
            .get(self.url(path))
            .send()
            .await
            .expect("request failed")
            .status()
            .as_u16()
    }

    pub async fn stop(self) {
        self.shutdown.cancel();
        self.task
            .await
            .expect("server task panicked")
            .expect("server returned an error");
    }
}

/// HTTP client that never routes loopback traffic through a proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("reqwest client")
}

/// Starts a server limiting `ROUTE` to `capacity` requests refilled at `rate`.
pub async fn start_server(
    capacity: u64,
    rate: f64,
    extractor: impl KeyExtractor + 'static,
) -> TestServer {
    let clock = Arc::new(ManualClock::new());
    let registry = Arc::new(BucketRegistry::with_clock(clock.clone()));
    let metrics = Arc::new(MetricsRegistry::new().expect("metrics registry"));
    let policy = RateLimit::new(Arc::clone(&registry), capacity, rate, extractor)
        .expect("valid policy")
        .with_metrics(Arc::clone(&metrics));

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let server =
        AdmissionServer::new(Arc::new(policy), &addr.to_string(), ROUTE).expect("server");

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let task = tokio::spawn(async move { server.serve(listener, token).await });

    TestServer {
        addr,
        clock,
        registry,
        metrics,
        shutdown,
        task,
    }
}
