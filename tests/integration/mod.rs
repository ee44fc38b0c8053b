//! End-to-end tests for Mini Proxy
//!
//! Each test runs a real proxy on a loopback port in front of a fake parent
//! proxy, and drives it with an ordinary HTTP client or raw sockets.

mod forwarding;
mod tunneling;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use mini_proxy::config::ProxyConfig;
use mini_proxy::Proxy;

/// Body every fake parent sends back: all byte values, twice
pub fn payload() -> Vec<u8> {
    (0..=255u8).chain(0..=255u8).collect()
}

/// A proxy under test
pub struct RunningProxy {
    pub addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<mini_proxy::Result<()>>,
}

impl RunningProxy {
    pub async fn start(config: ProxyConfig) -> Self {
        Self::start_with_grace(config, mini_proxy::proxy::SHUTDOWN_GRACE_PERIOD).await
    }

    pub async fn start_with_grace(config: ProxyConfig, grace: Duration) -> Self {
        let proxy = Proxy::bind(&config).await.expect("proxy should bind").with_grace_period(grace);
        let addr = proxy.local_addr();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(proxy.run(async move {
            let _ = stop_rx.await;
        }));

        Self { addr, stop: Some(stop_tx), handle }
    }

    /// Ask the proxy to stop without waiting for it
    pub fn trigger_stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }

    /// Stop the proxy and wait for `run` to return
    pub async fn shutdown(mut self) -> mini_proxy::Result<()> {
        self.trigger_stop();
        self.handle.await.expect("proxy task panicked")
    }

    pub fn http_client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .proxy(reqwest::Proxy::http(format!("http://{}", self.addr)).unwrap())
            .http1_only()
            .build()
            .unwrap()
    }
}

pub fn config_for(parent: SocketAddr) -> ProxyConfig {
    ProxyConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        parent_proxy: format!("http://{}", parent),
        ..ProxyConfig::default()
    }
}

/// What a fake HTTP parent saw
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub uri: String,
    pub proxy_authorization: Option<String>,
    pub body: Vec<u8>,
}

/// Fake parent for plain requests
///
/// Answers every request with `201 Created`, an `X-Parent` header and
/// `payload()` after waiting `delay`.
pub struct HttpParent {
    pub addr: SocketAddr,
    pub requests: Arc<Mutex<Vec<Recorded>>>,
}

impl HttpParent {
    pub async fn spawn(delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let recorded = Arc::clone(&recorded);
                        async move {
                            let (parts, body) = req.into_parts();
                            let body = body.collect().await.map(|c| c.to_bytes()).unwrap_or_default();
                            recorded.lock().unwrap().push(Recorded {
                                method: parts.method.to_string(),
                                uri: parts.uri.to_string(),
                                proxy_authorization: parts
                                    .headers
                                    .get("proxy-authorization")
                                    .map(|v| v.to_str().unwrap().to_string()),
                                body: body.to_vec(),
                            });

                            tokio::time::sleep(delay).await;
                            Ok::<_, Infallible>(
                                Response::builder()
                                    .status(201)
                                    .header("x-parent", "yes")
                                    .body(Full::new(Bytes::from(payload())))
                                    .unwrap(),
                            )
                        }
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self { addr, requests }
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

/// Fake parent for CONNECT
///
/// Replies to the CONNECT header with `reply`. When the reply is a 200 it then
/// echoes every byte back, standing in for the tunneled origin.
pub struct ConnectParent {
    pub addr: SocketAddr,
    pub accepted: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl ConnectParent {
    pub async fn spawn(reply: &'static [u8]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let (accepted_count, closed_count, recorded) =
            (Arc::clone(&accepted), Arc::clone(&closed), Arc::clone(&requests));
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                accepted_count.fetch_add(1, Ordering::SeqCst);
                let closed_count = Arc::clone(&closed_count);
                let recorded = Arc::clone(&recorded);

                tokio::spawn(async move {
                    let head = match read_head(&mut stream).await {
                        Some(head) => head,
                        None => {
                            closed_count.fetch_add(1, Ordering::SeqCst);
                            return;
                        }
                    };
                    recorded.lock().unwrap().push(head);

                    if stream.write_all(reply).await.is_err() {
                        closed_count.fetch_add(1, Ordering::SeqCst);
                        return;
                    }

                    let echo = reply.starts_with(b"HTTP/1.1 200");
                    let mut buf = vec![0u8; 8192];
                    loop {
                        match stream.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) if echo => {
                                if stream.write_all(&buf[..n]).await.is_err() {
                                    break;
                                }
                            }
                            Ok(_) => {}
                        }
                    }
                    closed_count.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        Self { addr, accepted, closed, requests }
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Loopback address with nothing listening on it
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Read an HTTP header block byte by byte, leaving anything after it unread
pub async fn read_head(stream: &mut TcpStream) -> Option<String> {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        match stream.read(&mut byte).await {
            Ok(1) => head.push(byte[0]),
            _ => return None,
        }
    }
    Some(String::from_utf8_lossy(&head).into_owned())
}

/// Send a CONNECT to the proxy and return the stream plus the response head
pub async fn send_connect(proxy: SocketAddr, target: &str, extra_headers: &str) -> (TcpStream, String) {
    let request = format!("CONNECT {} HTTP/1.1\r\nHost: {}\r\n{}\r\n", target, target, extra_headers);
    send_raw(proxy, &request).await
}

/// Write a hand-made request to the proxy and return the stream plus the response head
pub async fn send_raw(proxy: SocketAddr, request: &str) -> (TcpStream, String) {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();

    let head = tokio::time::timeout(Duration::from_secs(10), read_head(&mut stream))
        .await
        .expect("proxy should answer")
        .expect("proxy closed before answering");
    (stream, head)
}

/// Poll `check` until it holds or a few seconds pass
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}
