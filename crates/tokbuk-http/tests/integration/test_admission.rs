//! Admission through the HTTP boundary: 200 until empty, then 429

use std::time::Duration;

use tokbuk_http::{PeerIp, StaticKey, ADMITTED_BODY, REJECTION_BODY};

use crate::common::{client, start_server, ROUTE};

#[tokio::test]
async fn test_rate_limit_then_refill() {
    let server = start_server(2, 1.0, StaticKey::new("test-user")).await;
    let client = client();

    assert_eq!(server.get(&client, ROUTE).await, 200);
    assert_eq!(server.get(&client, ROUTE).await, 200);
    assert_eq!(server.get(&client, ROUTE).await, 429);

    server.clock.advance(Duration::from_secs(1));
    assert_eq!(server.get(&client, ROUTE).await, 200);
    assert_eq!(server.get(&client, ROUTE).await, 429);

    server.stop().await;
}

#[tokio::test]
async fn test_response_bodies() {
    let server = start_server(1, 1.0, StaticKey::new("k")).await;
    let client = client();

    let admitted = client.get(server.url(ROUTE)).send().await.unwrap();
    assert_eq!(admitted.status().as_u16(), 200);
    assert_eq!(admitted.text().await.unwrap(), ADMITTED_BODY);

    let rejected = client.get(server.url(ROUTE)).send().await.unwrap();
    assert_eq!(rejected.status().as_u16(), 429);
    assert_eq!(
        rejected.headers()["content-type"],
        "text/plain; charset=utf-8"
    );
    assert_eq!(rejected.text().await.unwrap(), REJECTION_BODY);

    server.stop().await;
}

#[tokio::test]
async fn test_peer_ip_keys_by_loopback_address() {
    let server = start_server(3, 1.0, PeerIp).await;
    let http = client();

    for _ in 0..3 {
        assert_eq!(server.get(&http, ROUTE).await, 200);
    }
    assert_eq!(server.get(&http, ROUTE).await, 429);

    // Fresh connections from the same host share the bucket.
    let other_http = client();
    assert_eq!(server.get(&other_http, ROUTE).await, 429);

    assert_eq!(server.registry.keys(), vec!["127.0.0.1".to_string()]);
    server.stop().await;
}

#[tokio::test]
async fn test_unknown_paths_are_not_limited() {
    let server = start_server(1, 1.0, StaticKey::new("k")).await;
    let client = client();

    for _ in 0..5 {
        assert_eq!(server.get(&client, "/elsewhere").await, 404);
    }
    assert!(server.registry.is_empty());
    assert_eq!(server.get(&client, ROUTE).await, 200);

    server.stop().await;
}

#[tokio::test]
async fn test_post_shares_the_route_budget() {
    let server = start_server(2, 1.0, StaticKey::new("k")).await;
    let http = client();

    let posted = http.post(server.url(ROUTE)).send().await.unwrap();
    assert_eq!(posted.status().as_u16(), 200);
    assert_eq!(server.get(&http, ROUTE).await, 200);

    let posted = http.post(server.url(ROUTE)).send().await.unwrap();
    assert_eq!(posted.status().as_u16(), 429);

    server.stop().await;
}

#[tokio::test]
async fn test_metrics_count_decisions() {
    let server = start_server(2, 1.0, StaticKey::new("k")).await;
    let client = client();

    for _ in 0..5 {
        server.get(&client, ROUTE).await;
    }

    assert_eq!(server.metrics.admissions("admitted"), 2);
    assert_eq!(server.metrics.admissions("rejected"), 3);
    assert_eq!(server.metrics.buckets.get(), 1);

    server.stop().await;
}
