//! CONNECT tunnel negotiation
//!
//! A client CONNECT is chained through the parent proxy: dial the parent,
//! send our own CONNECT, and once the parent answers 200 take the client
//! connection out of HTTP framing and splice the two sockets together.

use axum::body::Body;
use http::{Response, StatusCode};
use hyper::ext::ReasonPhrase;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use log::{debug, warn};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;

use super::upstream::{ProxyCredential, Upstream};
use crate::common::{ProxyError, Result};
use crate::BUFFER_SIZE;

/// Upper bound on the parent's CONNECT response header
pub const CONNECT_RESPONSE_LIMIT: usize = 4096;

/// Reason phrase of the success line sent back to the client
pub const CONNECTION_ESTABLISHED: &[u8] = b"Connection established";

/// Negotiate a tunnel to `target` through the parent proxy
///
/// On success the returned response is the client's
/// `HTTP/1.1 200 Connection established`; the splice starts in a detached task
/// as soon as hyper hands over the upgraded connection. On failure the parent
/// connection is already closed and the caller picks the error response.
pub async fn negotiate(
    upstream: &Upstream,
    target: &str,
    on_upgrade: Option<OnUpgrade>,
) -> Result<Response<Body>> {
    let mut parent = upstream.dial().await?;
    let leftover = handshake(&mut parent, target, upstream.credential()).await?;

    let on_upgrade = on_upgrade.ok_or(ProxyError::HijackUnsupported)?;

    let target = target.to_string();
    tokio::spawn(async move {
        match on_upgrade.await {
            Ok(upgraded) => {
                let mut client = TokioIo::new(upgraded);
                // Bytes the parent sent right after its header belong to the client
                if !leftover.is_empty() {
                    if let Err(e) = client.write_all(&leftover).await {
                        debug!("Tunnel to {} closed before buffered data was sent: {}", target, e);
                        return;
                    }
                }
                splice(client, parent);
            }
            Err(e) => debug!("Client upgrade for {} failed: {}", target, e),
        }
    });

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    response
        .extensions_mut()
        .insert(ReasonPhrase::from_static(CONNECTION_ESTABLISHED));
    Ok(response)
}

/// Hand-written CONNECT request for the parent proxy
pub fn connect_request(target: &str, credential: &ProxyCredential) -> String {
    let mut request = format!("CONNECT {} HTTP/1.1\r\nHost: {}\r\n", target, target);
    if let Some(value) = credential.as_str() {
        request.push_str("Proxy-Authorization: ");
        request.push_str(value);
        request.push_str("\r\n");
    }
    request.push_str("\r\n");
    request
}

/// Send CONNECT to the parent and read its answer
///
/// Reads until the end of the response header or `CONNECT_RESPONSE_LIMIT`
/// bytes, whichever comes first. Only a `200` status code is accepted.
/// Returns whatever the parent sent after the header.
pub async fn handshake<S>(parent: &mut S, target: &str, credential: &ProxyCredential) -> Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    parent.write_all(connect_request(target, credential).as_bytes()).await?;
    parent.flush().await?;

    let mut buffer = vec![0u8; CONNECT_RESPONSE_LIMIT];
    let mut filled = 0;
    let header_end = loop {
        let n = parent.read(&mut buffer[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Err(ProxyError::ParentRefused("connection closed without a response".to_string()));
            }
            break None;
        }
        filled += n;

        if let Some(end) = find_header_end(&buffer[..filled]) {
            break Some(end);
        }
        if filled == buffer.len() {
            break None;
        }
    };

    let head = &buffer[..header_end.unwrap_or(filled)];
    let status_line = status_line(head);
    if parse_status_code(&status_line) != Some(200) {
        return Err(ProxyError::ParentRefused(status_line));
    }

    match header_end {
        Some(end) => Ok(buffer[end..filled].to_vec()),
        None => Err(ProxyError::ParentRefused(format!(
            "{} (response header incomplete after {} bytes)",
            status_line, filled
        ))),
    }
}

/// Offset just past the `\r\n\r\n` that ends a response header
fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n").map(|pos| pos + 4)
}

fn status_line(head: &[u8]) -> String {
    let line = head.split(|&b| b == b'\n').next().unwrap_or_default();
    String::from_utf8_lossy(line).trim_end().to_string()
}

/// Status code of an `HTTP/1.x NNN Reason` line
pub fn parse_status_code(line: &str) -> Option<u16> {
    let mut parts = line.split_whitespace();
    let version = parts.next()?;
    if !version.starts_with("HTTP/") {
        return None;
    }
    let code = parts.next()?;
    if code.len() != 3 {
        return None;
    }
    code.parse().ok()
}

/// Relay bytes both ways between the client and the parent
///
/// Each direction runs in its own task. When either direction ends, both
/// connections are closed.
pub fn splice<C, P>(client: C, parent: P)
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    P: AsyncRead + AsyncWrite + Send + 'static,
{
    let (client_reader, client_writer) = tokio::io::split(client);
    let (parent_reader, parent_writer) = tokio::io::split(parent);

    let (closed_tx, closed_rx) = watch::channel(false);
    let closed_tx = Arc::new(closed_tx);

    tokio::spawn(pump(
        "client to parent",
        client_reader,
        parent_writer,
        Arc::clone(&closed_tx),
        closed_rx.clone(),
    ));
    tokio::spawn(pump(
        "parent to client",
        parent_reader,
        client_writer,
        closed_tx,
        closed_rx,
    ));
}

async fn pump<R, W>(
    direction: &'static str,
    mut reader: R,
    mut writer: W,
    closed_tx: Arc<watch::Sender<bool>>,
    mut closed_rx: watch::Receiver<bool>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut total_bytes: u64 = 0;

    loop {
        tokio::select! {
            read = reader.read(&mut buffer) => match read {
                Ok(0) => break,
                Ok(n) => {
                    if let Err(e) = writer.write_all(&buffer[..n]).await {
                        debug!("Tunnel {} write failed: {}", direction, e);
                        break;
                    }
                    total_bytes += n as u64;
                }
                Err(e) => {
                    debug!("Tunnel {} read failed: {}", direction, e);
                    break;
                }
            },
            _ = closed_rx.changed() => break,
        }
    }

    closed_tx.send_replace(true);
    if let Err(e) = writer.shutdown().await {
        if e.kind() != std::io::ErrorKind::NotConnected {
            warn!("Tunnel {} shutdown failed: {}", direction, e);
        }
    }
    debug!("Tunnel {} closed after {} bytes", direction, total_bytes);
}
