//! Plain HTTP forwarding and blocking

use std::time::Duration;
use tokio::io::AsyncReadExt;

use super::{config_for, payload, send_raw, unused_addr, ConnectParent, HttpParent, RunningProxy};

#[tokio::test]
async fn test_forward_preserves_status_headers_and_body() {
    let parent = HttpParent::spawn(Duration::ZERO).await;
    let proxy = RunningProxy::start(config_for(parent.addr)).await;

    let response = proxy
        .http_client()
        .get("http://origin.test/path?q=1")
        .send()
        .await
        .expect("request through proxy should succeed");

    assert_eq!(response.status().as_u16(), 201);
    assert_eq!(response.headers().get("x-parent").unwrap(), "yes");
    let body = response.bytes().await.unwrap();
    assert_eq!(body.as_ref(), payload().as_slice(), "body must arrive byte for byte");

    let recorded = parent.recorded();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].method, "GET");
    assert_eq!(recorded[0].uri, "http://origin.test/path?q=1");
    assert!(recorded[0].proxy_authorization.is_none());

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_forward_adds_parent_credential() {
    let parent = HttpParent::spawn(Duration::ZERO).await;
    let mut config = config_for(parent.addr);
    config.username = Some("alice".to_string());
    config.password = Some("secret".to_string());
    let proxy = RunningProxy::start(config).await;

    let response = proxy
        .http_client()
        .post("http://origin.test/upload")
        .header("proxy-authorization", "Basic client-supplied")
        .body("hello upstream")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    let recorded = parent.recorded();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].method, "POST");
    assert_eq!(recorded[0].body, b"hello upstream");
    assert_eq!(
        recorded[0].proxy_authorization.as_deref(),
        Some("Basic YWxpY2U6c2VjcmV0"),
        "configured credential replaces the client's"
    );

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_parent_unreachable_is_bad_gateway() {
    let proxy = RunningProxy::start(config_for(unused_addr().await)).await;

    let response = proxy.http_client().get("http://origin.test/").send().await.unwrap();
    assert_eq!(response.status().as_u16(), 502);
    assert_eq!(response.text().await.unwrap(), "Bad Gateway\n");

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_blocked_request_never_reaches_parent() {
    let parent = ConnectParent::spawn(b"HTTP/1.1 200 OK\r\n\r\n").await;
    let mut config = config_for(parent.addr);
    config.blocked_hosts = vec!["ads.example.com".to_string()];
    let proxy = RunningProxy::start(config).await;

    for url in ["http://ads.example.com/banner.png", "http://x.ADS.example.com:8080/"] {
        let response = proxy.http_client().get(url).send().await.unwrap();
        assert_eq!(response.status().as_u16(), 403, "{} should be blocked", url);
        assert_eq!(response.text().await.unwrap(), "Forbidden by proxy (blocked)\n");
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(parent.accepted(), 0, "blocked requests must not contact the parent");

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_userinfo_in_target_is_still_blocked() {
    let parent = ConnectParent::spawn(b"HTTP/1.1 200 OK\r\n\r\n").await;
    let mut config = config_for(parent.addr);
    config.blocked_hosts = vec!["ads.example.com".to_string()];
    let proxy = RunningProxy::start(config).await;

    let request = "GET http://user@ads.example.com/ HTTP/1.1\r\nHost: ads.example.com\r\nConnection: close\r\n\r\n";
    let (mut stream, head) = send_raw(proxy.addr, request).await;
    assert!(head.starts_with("HTTP/1.1 403"), "unexpected head {:?}", head);

    let mut body = String::new();
    stream.read_to_string(&mut body).await.unwrap();
    assert_eq!(body, "Forbidden by proxy (blocked)\n");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(parent.accepted(), 0);

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_suffix_without_dot_is_not_blocked() {
    let parent = HttpParent::spawn(Duration::ZERO).await;
    let mut config = config_for(parent.addr);
    config.blocked_hosts = vec!["bad.com".to_string()];
    let proxy = RunningProxy::start(config).await;

    let response = proxy.http_client().get("http://xbad.com/").send().await.unwrap();
    assert_eq!(response.status().as_u16(), 201);
    assert_eq!(parent.recorded().len(), 1);

    proxy.shutdown().await.unwrap();
}
