//! Plain request forwarding
//!
//! Non-CONNECT requests are re-issued through the parent proxy with the
//! pooled client. The response status, headers and body come back unmodified;
//! the body is streamed, never buffered.

use axum::body::Body;
use bytes::Bytes;
use futures::TryStreamExt;
use http::header::{HOST, PROXY_AUTHORIZATION};
use http::request::Parts;
use http::uri::Authority;
use http::{Request, Response};
use http_body::Body as HttpBody;
use http_body_util::BodyDataStream;
use log::warn;

use super::upstream::Upstream;
use crate::common::{bare_authority, ProxyError, Result};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Forward a plain HTTP request through the parent proxy
///
/// The request headers are copied as received, with `Proxy-Authorization`
/// replaced by the configured credential when there is one. Any transport
/// failure or timeout is returned as an error; the caller answers 502.
pub async fn forward<B>(upstream: &Upstream, req: Request<B>) -> Result<Response<Body>>
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let (parts, body) = req.into_parts();
    let url = absolute_url(&parts)?;

    let mut headers = parts.headers.clone();
    if let Some(value) = upstream.credential().header_value() {
        headers.insert(PROXY_AUTHORIZATION, value.clone());
    }

    let mut outbound = upstream
        .client()
        .request(parts.method.clone(), url.as_str())
        .headers(headers);

    // Without this a body-less GET would go out chunked
    if !body.is_end_stream() {
        outbound = outbound.body(reqwest::Body::wrap_stream(BodyDataStream::new(body)));
    }

    let response = outbound.send().await?;

    let status = response.status();
    let headers = response.headers().clone();
    let stream = response
        .bytes_stream()
        .inspect_err(move |e| warn!("FAILED copy back {} -> {}", url, e));

    let mut forwarded = Response::new(Body::from_stream(stream));
    *forwarded.status_mut() = status;
    *forwarded.headers_mut() = headers;
    Ok(forwarded)
}

/// Absolute URL for the outbound request
///
/// Absolute-form request targets keep their scheme, host, port and path.
/// Origin-form targets are rebuilt as `http://{Host}{path}`. Userinfo is
/// dropped either way.
pub fn absolute_url(parts: &Parts) -> Result<String> {
    let uri = &parts.uri;
    let path = uri.path_and_query().map_or("/", |pq| pq.as_str());

    if let (Some(scheme), Some(authority)) = (uri.scheme(), uri.authority()) {
        return Ok(format!("{}://{}{}", scheme, bare_authority(authority), path));
    }

    let host = parts
        .headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .and_then(|host| host.trim().parse::<Authority>().ok())
        .ok_or_else(|| ProxyError::Http("request has no Host header".to_string()))?;

    Ok(format!("http://{}{}", bare_authority(&host), path))
}
