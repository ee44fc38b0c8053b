//! CONNECT tunnels chained through the parent

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::{config_for, eventually, send_connect, unused_addr, ConnectParent, RunningProxy};

#[tokio::test]
async fn test_tunnel_relays_bytes_exactly() {
    let parent = ConnectParent::spawn(b"HTTP/1.1 200 Connection established\r\n\r\n").await;
    let mut config = config_for(parent.addr);
    config.username = Some("alice".to_string());
    config.password = Some("secret".to_string());
    let proxy = RunningProxy::start(config).await;

    let (mut stream, head) = send_connect(proxy.addr, "secure.example.com:443", "").await;
    assert_eq!(head, "HTTP/1.1 200 Connection established\r\n\r\n");

    let requests = parent.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].starts_with("CONNECT secure.example.com:443 HTTP/1.1\r\nHost: secure.example.com:443\r\n"));
    assert!(requests[0].contains("Proxy-Authorization: Basic YWxpY2U6c2VjcmV0\r\n"));

    // Binary data, including bytes that look like HTTP framing
    let data: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();
    stream.write_all(&data).await.unwrap();
    let mut echoed = vec![0u8; data.len()];
    tokio::time::timeout(Duration::from_secs(10), stream.read_exact(&mut echoed))
        .await
        .expect("echo should arrive")
        .unwrap();
    assert_eq!(echoed, data);

    // Closing the client side closes the parent side
    drop(stream);
    assert!(eventually(|| parent.closed() == 1).await, "parent connection should close");

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_parent_bytes_after_header_reach_client() {
    let parent = ConnectParent::spawn(b"HTTP/1.1 200 OK\r\nVia: parent\r\n\r\nWELCOME").await;
    let proxy = RunningProxy::start(config_for(parent.addr)).await;

    let (mut stream, head) = send_connect(proxy.addr, "secure.example.com:443", "").await;
    assert_eq!(head, "HTTP/1.1 200 Connection established\r\n\r\n");

    let mut greeting = [0u8; 7];
    tokio::time::timeout(Duration::from_secs(10), stream.read_exact(&mut greeting))
        .await
        .expect("buffered parent bytes should be forwarded")
        .unwrap();
    assert_eq!(&greeting, b"WELCOME");

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_parent_refusal_is_bad_gateway() {
    let parent = ConnectParent::spawn(b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n").await;
    let proxy = RunningProxy::start(config_for(parent.addr)).await;

    let (mut stream, head) = send_connect(proxy.addr, "secure.example.com:443", "Connection: close\r\n").await;
    assert!(head.starts_with("HTTP/1.1 502"), "unexpected head {:?}", head);

    let mut body = String::new();
    stream.read_to_string(&mut body).await.unwrap();
    assert_eq!(body, "Parent proxy refused CONNECT\n");

    assert!(eventually(|| parent.closed() == 1).await, "parent connection should be closed");

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_parent_unreachable_connect_is_bad_gateway() {
    let proxy = RunningProxy::start(config_for(unused_addr().await)).await;

    let (mut stream, head) = send_connect(proxy.addr, "secure.example.com:443", "Connection: close\r\n").await;
    assert!(head.starts_with("HTTP/1.1 502"), "unexpected head {:?}", head);

    let mut body = String::new();
    stream.read_to_string(&mut body).await.unwrap();
    assert_eq!(body, "Bad Gateway\n");

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_blocked_connect_never_reaches_parent() {
    let parent = ConnectParent::spawn(b"HTTP/1.1 200 OK\r\n\r\n").await;
    let mut config = config_for(parent.addr);
    config.blocked_hosts = vec!["example.com".to_string()];
    let proxy = RunningProxy::start(config).await;

    let (mut stream, head) = send_connect(proxy.addr, "secure.example.com:443", "Connection: close\r\n").await;
    assert!(head.starts_with("HTTP/1.1 403"), "unexpected head {:?}", head);

    let mut body = String::new();
    stream.read_to_string(&mut body).await.unwrap();
    assert_eq!(body, "Forbidden by proxy (blocked)\n");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(parent.accepted(), 0);

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_userinfo_in_connect_target_is_still_blocked() {
    let parent = ConnectParent::spawn(b"HTTP/1.1 200 OK\r\n\r\n").await;
    let mut config = config_for(parent.addr);
    config.blocked_hosts = vec!["ads.example.com".to_string()];
    let proxy = RunningProxy::start(config).await;

    let (_stream, head) = send_connect(proxy.addr, "user@ads.example.com:443", "Connection: close\r\n").await;
    assert!(head.starts_with("HTTP/1.1 403"), "unexpected head {:?}", head);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(parent.accepted(), 0);

    proxy.shutdown().await.unwrap();
}
