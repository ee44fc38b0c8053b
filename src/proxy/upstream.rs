//! Parent proxy access
//!
//! Everything that talks to the parent proxy starts here: the pre-computed
//! `Proxy-Authorization` credential, the pooled HTTP client used for plain
//! requests, and raw TCP dialing for CONNECT tunnels.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use http::HeaderValue;
use log::debug;
use reqwest::Url;
use std::fmt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::common::net::set_keepalive;
use crate::common::{ProxyError, Result};
use crate::config::ProxyConfig;

/// Timeout for establishing the TCP connection to the parent for CONNECT
pub const PARENT_DIAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Keep-alive interval on parent connections
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Pre-computed `Proxy-Authorization` value
///
/// Empty when neither username nor password is configured. Built once at
/// startup and never mutated.
#[derive(Clone, Default)]
pub struct ProxyCredential {
    value: Option<HeaderValue>,
}

impl ProxyCredential {
    /// `Basic base64(username:password)`
    pub fn basic(username: &str, password: &str) -> Result<Self> {
        let encoded = STANDARD.encode(format!("{}:{}", username, password));
        let mut value = HeaderValue::from_str(&format!("Basic {}", encoded))
            .map_err(|e| ProxyError::Config(format!("invalid proxy credential: {}", e)))?;
        value.set_sensitive(true);
        Ok(Self { value: Some(value) })
    }

    /// Build from the configured username and password
    pub fn from_config(config: &ProxyConfig) -> Result<Self> {
        match config.credentials() {
            Some((username, password)) => Self::basic(username, password),
            None => Ok(Self::default()),
        }
    }

    pub fn header_value(&self) -> Option<&HeaderValue> {
        self.value.as_ref()
    }

    /// Credential as text, for hand-written CONNECT requests
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_ref().and_then(|value| value.to_str().ok())
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }
}

impl fmt::Debug for ProxyCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Some(_) => f.write_str("ProxyCredential(<redacted>)"),
            None => f.write_str("ProxyCredential(None)"),
        }
    }
}

/// Handle on the parent proxy
///
/// Cheap to share: the HTTP client pools its connections internally and is
/// safe for concurrent use.
#[derive(Debug)]
pub struct Upstream {
    client: reqwest::Client,
    addr: String,
    credential: ProxyCredential,
}

impl Upstream {
    /// Create the upstream handle from a validated configuration
    pub fn new(config: &ProxyConfig) -> Result<Self> {
        let url = config.parent_url()?;
        let addr = parent_addr(&url)?;
        let credential = ProxyCredential::from_config(config)?;
        let client = build_client(&url, &credential, config.timeout())?;

        debug!("Parent proxy {} resolved to dial address {}", url, addr);
        Ok(Self { client, addr, credential })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// `host:port` of the parent, used for CONNECT dialing
    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn credential(&self) -> &ProxyCredential {
        &self.credential
    }

    /// Open a raw TCP connection to the parent
    ///
    /// Bounded by `PARENT_DIAL_TIMEOUT`. Keep-alive is enabled on the
    /// resulting socket.
    pub async fn dial(&self) -> Result<TcpStream> {
        let stream = timeout(PARENT_DIAL_TIMEOUT, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| ProxyError::UpstreamDial {
                addr: self.addr.clone(),
                reason: "connection timed out".to_string(),
            })?
            .map_err(|e| ProxyError::UpstreamDial {
                addr: self.addr.clone(),
                reason: e.to_string(),
            })?;

        if let Err(e) = set_keepalive(&stream, KEEPALIVE_INTERVAL) {
            debug!("Failed to enable keep-alive on parent connection: {}", e);
        }

        Ok(stream)
    }
}

/// Build the pooled HTTP client that sends every request through the parent
///
/// The credential is attached to the proxy as well, so `https://` URLs that
/// reqwest tunnels on its own still authenticate. Redirects are passed back to
/// the client untouched.
pub fn build_client(parent: &Url, credential: &ProxyCredential, timeout: Duration) -> Result<reqwest::Client> {
    let mut proxy = reqwest::Proxy::all(parent.as_str())?;
    if let Some(value) = credential.header_value() {
        proxy = proxy.custom_http_auth(value.clone());
    }

    let client = reqwest::Client::builder()
        .proxy(proxy)
        .connect_timeout(timeout)
        .timeout(timeout)
        .tcp_keepalive(KEEPALIVE_INTERVAL)
        .danger_accept_invalid_certs(true)
        .redirect(reqwest::redirect::Policy::none())
        .http1_only()
        .build()?;

    Ok(client)
}

/// `host:port` dial address for a parent URL, defaulting the port by scheme
pub fn parent_addr(url: &Url) -> Result<String> {
    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| ProxyError::Config(format!("parent proxy {} has no host", url)))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| ProxyError::Config(format!("parent proxy {} has no port", url)))?;

    Ok(format!("{}:{}", host, port))
}
