//! Request dispatch module
//!
//! Every request accepted by the server passes through `dispatch`: blocklist
//! check first, then CONNECT tunneling or plain forwarding. Exactly one
//! terminal log line is written per request.

use axum::body::Body;
use bytes::Bytes;
use futures::StreamExt;
use http::header::HOST;
use http::uri::Authority;
use http::{Method, Request, Response, StatusCode};
use http_body::Body as HttpBody;
use hyper::upgrade::OnUpgrade;
use log::{info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use super::blocklist::is_blocked;
use super::upstream::Upstream;
use super::{forwarder, tunnel};
use crate::common::{bare_authority, ProxyError, Result};
use crate::config::ProxyConfig;
use crate::identify::{self, ProcessIdentifier};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Time allowed for identifying the client's process in debug mode
pub const IDENTIFY_BUDGET: Duration = Duration::from_millis(500);

/// Shared, read-only state of a running proxy
pub struct ProxyState {
    upstream: Upstream,
    blocked_hosts: Vec<String>,
    debug: bool,
    identifier: Arc<dyn ProcessIdentifier>,
}

impl ProxyState {
    /// Build the state with the platform's process identifier
    pub fn new(config: &ProxyConfig) -> Result<Self> {
        Self::with_identifier(config, identify::platform())
    }

    pub fn with_identifier(config: &ProxyConfig, identifier: Arc<dyn ProcessIdentifier>) -> Result<Self> {
        Ok(Self {
            upstream: Upstream::new(config)?,
            blocked_hosts: config.blocked_hosts.clone(),
            debug: config.debug,
            identifier,
        })
    }

    pub fn upstream(&self) -> &Upstream {
        &self.upstream
    }
}

/// Handle one proxied request
///
/// Never fails: every error is turned into the matching client response.
pub async fn dispatch<B>(state: Arc<ProxyState>, client_addr: SocketAddr, mut req: Request<B>) -> Response<Body>
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let start = Instant::now();
    let client = client_label(&state, client_addr).await;
    let method = req.method().clone();
    let url = req.uri().to_string();

    let target = match target_host(&req) {
        Some(target) => target,
        None => {
            warn!("FAILED {} {} {} -> request has no target host", client, method, url);
            record("bad_request");
            return text_response(StatusCode::BAD_REQUEST, "Bad Request\n");
        }
    };

    if is_blocked(&target, &state.blocked_hosts) {
        info!("BLOCKED {} {} {} -> {}", client, method, url, target);
        record("blocked");
        return text_response(StatusCode::FORBIDDEN, "Forbidden by proxy (blocked)\n");
    }

    if method == Method::CONNECT {
        let on_upgrade = req.extensions_mut().remove::<OnUpgrade>();
        return match tunnel::negotiate(&state.upstream, &target, on_upgrade).await {
            Ok(response) => {
                info!("TUNNELED {} {} {} in {:?}", client, method, target, start.elapsed());
                record("tunneled");
                response
            }
            Err(e) => {
                warn!("FAILED CONNECT {} {} -> {} in {:?}", client, target, e, start.elapsed());
                record(e.kind());
                error_response(&e)
            }
        };
    }

    match forwarder::forward(&state.upstream, req).await {
        Ok(response) => {
            record("proxied");
            let outcome = Outcome {
                line: format!("PROXIED {} {} {} -> {}", client, method, url, response.status().as_u16()),
                start,
            };
            log_when_streamed(response, outcome)
        }
        Err(e) => {
            warn!("FAILED {} {} {} -> {}", client, method, url, e);
            record(e.kind());
            error_response(&e)
        }
    }
}

/// Target of the request: the request-target authority, else the Host header
///
/// For CONNECT this is the `host:port` being tunneled to. Userinfo is never
/// part of the target, so `user@host` is checked and dialed as `host`.
pub fn target_host<B>(req: &Request<B>) -> Option<String> {
    if let Some(authority) = req.uri().authority() {
        return Some(bare_authority(authority));
    }

    req.headers()
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .and_then(|host| host.trim().parse::<Authority>().ok())
        .map(|authority| bare_authority(&authority))
}

/// Client response for a failed request
pub fn error_response(err: &ProxyError) -> Response<Body> {
    match err {
        ProxyError::ParentRefused(_) => {
            text_response(StatusCode::BAD_GATEWAY, "Parent proxy refused CONNECT\n")
        }
        ProxyError::HijackUnsupported => {
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Hijacking not supported\n")
        }
        ProxyError::Http(_) => text_response(StatusCode::BAD_REQUEST, "Bad Request\n"),
        _ => text_response(StatusCode::BAD_GATEWAY, "Bad Gateway\n"),
    }
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Client address, annotated with its process in debug mode
async fn client_label(state: &ProxyState, addr: SocketAddr) -> String {
    if !state.debug {
        return addr.to_string();
    }

    let identifier = Arc::clone(&state.identifier);
    let lookup = tokio::task::spawn_blocking(move || identifier.identify(addr));
    match timeout(IDENTIFY_BUDGET, lookup).await {
        Ok(Ok(Some(process))) if !process.is_empty() => format!("{} [{}]", addr, process),
        _ => addr.to_string(),
    }
}

fn record(outcome: &'static str) {
    metrics::counter!("mini_proxy.requests", "outcome" => outcome).increment(1);
}

/// Terminal log line of a forwarded request, written when its body is done
struct Outcome {
    line: String,
    start: Instant,
}

impl Drop for Outcome {
    fn drop(&mut self) {
        info!("{} in {:?}", self.line, self.start.elapsed());
    }
}

// The outcome rides along with the body stream, so the line is written once
// the body has been fully sent or the client went away
fn log_when_streamed(response: Response<Body>, outcome: Outcome) -> Response<Body> {
    response.map(move |body| {
        let stream = body.into_data_stream().map(move |chunk| {
            let _pending = &outcome;
            chunk
        });
        Body::from_stream(stream)
    })
}
