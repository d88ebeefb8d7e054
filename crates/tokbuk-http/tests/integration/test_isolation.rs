//! Per-client isolation when clients identify themselves by header

use std::time::Duration;

use tokbuk_http::HeaderKey;

use crate::common::{client, start_server, ROUTE};

async fn get_as(client: &reqwest::Client, url: &str, api_key: &str) -> u16 {
    client
        .get(url)
        .header("x-api-key", api_key)
        .send()
        .await
        .expect("request failed")
        .status()
        .as_u16()
}

#[tokio::test]
async fn test_exhausting_one_key_leaves_others_untouched() {
    let server = start_server(2, 1.0, HeaderKey::new("x-api-key").unwrap()).await;
    let client = client();
    let url = server.url(ROUTE);

    assert_eq!(get_as(&client, &url, "alice").await, 200);
    assert_eq!(get_as(&client, &url, "alice").await, 200);
    assert_eq!(get_as(&client, &url, "alice").await, 429);

    assert_eq!(get_as(&client, &url, "bob").await, 200);
    assert_eq!(get_as(&client, &url, "bob").await, 200);
    assert_eq!(get_as(&client, &url, "bob").await, 429);

    assert_eq!(server.registry.len(), 2);
    server.stop().await;
}

#[tokio::test]
async fn test_missing_header_falls_back_to_peer_ip() {
    let server = start_server(1, 1.0, HeaderKey::new("x-api-key").unwrap()).await;
    let client = client();

    assert_eq!(server.get(&client, ROUTE).await, 200);
    assert_eq!(server.get(&client, ROUTE).await, 429);
    assert!(server.registry.contains("127.0.0.1"));

    server.stop().await;
}

#[tokio::test]
async fn test_refill_clamps_at_capacity_over_http() {
    let server = start_server(5, 10.0, HeaderKey::new("x-api-key").unwrap()).await;
    let client = client();
    let url = server.url(ROUTE);

    for _ in 0..5 {
        assert_eq!(get_as(&client, &url, "carol").await, 200);
    }
    assert_eq!(get_as(&client, &url, "carol").await, 429);

    server.clock.advance(Duration::from_secs(10));
    for _ in 0..5 {
        assert_eq!(get_as(&client, &url, "carol").await, 200);
    }
    assert_eq!(get_as(&client, &url, "carol").await, 429);

    server.stop().await;
}
