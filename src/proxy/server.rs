//! Proxy server module
//!
//! Accepts client connections, serves HTTP/1.1 on each of them, and
//! coordinates graceful shutdown.

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use log::{debug, error, info, warn};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;

use super::handler::{dispatch, ProxyState};
use crate::common::{bind_listener, ProxyError, Result};
use crate::config::ProxyConfig;

/// How long in-flight requests may run after shutdown starts
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Proxy server structure
///
/// Binding and serving are separate steps so callers can learn the bound
/// address (useful with port 0) before traffic starts.
pub struct Proxy {
    listener: TcpListener,
    local_addr: SocketAddr,
    state: Arc<ProxyState>,
    grace_period: Duration,
}

impl Proxy {
    /// Bind the listener and prepare shared state
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is unusable or the listen address
    /// cannot be bound.
    pub async fn bind(config: &ProxyConfig) -> Result<Self> {
        let state = ProxyState::new(config)?;
        Self::bind_with_state(config, state).await
    }

    /// Bind with prepared state, e.g. a custom process identifier
    pub async fn bind_with_state(config: &ProxyConfig, state: ProxyState) -> Result<Self> {
        let listen_addr = config.listen_socket_addr()?;
        let listener = bind_listener(listen_addr).map_err(|e| ProxyError::Bind {
            addr: config.listen_addr.clone(),
            source: e,
        })?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
            state: Arc::new(state),
            grace_period: SHUTDOWN_GRACE_PERIOD,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Override the shutdown grace period
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Serve connections until `stop` completes
    ///
    /// On stop the listener is closed first, then every open connection is
    /// asked to finish its current request. Connections still busy after the
    /// grace period are aborted. Established tunnels are detached from their
    /// connections and keep running until either side closes.
    pub async fn run<F>(self, stop: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let Proxy { listener, local_addr, state, grace_period } = self;
        info!("Proxy service started, listening on {}", local_addr);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = JoinSet::new();
        tokio::pin!(stop);

        loop {
            tokio::select! {
                _ = &mut stop => {
                    info!("Shutting down server...");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, client_addr)) => {
                        debug!("Accepted connection from {}", client_addr);
                        tasks.spawn(serve_connection(
                            stream,
                            client_addr,
                            Arc::clone(&state),
                            shutdown_rx.clone(),
                        ));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                    }
                },
                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = result {
                        error!("Task error: {}", e);
                    }
                }
            }
        }

        drop(listener);
        shutdown_tx.send_replace(true);
        drain(tasks, grace_period).await;

        info!("Proxy service shutdown complete");
        Ok(())
    }
}

/// Serve HTTP/1.1 on one client connection
async fn serve_connection(
    stream: TcpStream,
    client_addr: SocketAddr,
    state: Arc<ProxyState>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let service = service_fn(move |req| {
        let state = Arc::clone(&state);
        async move { Ok::<_, Infallible>(dispatch(state, client_addr, req).await) }
    });

    // The CONNECT 200 must reach the client as a bare status line
    let conn = http1::Builder::new()
        .preserve_header_case(true)
        .title_case_headers(true)
        .auto_date_header(false)
        .serve_connection(TokioIo::new(stream), service)
        .with_upgrades();
    tokio::pin!(conn);

    let mut shutting_down = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    debug!("Connection from {} ended with error: {}", client_addr, e);
                }
                break;
            }
            _ = shutdown_rx.changed(), if !shutting_down => {
                shutting_down = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}

/// Wait for connection tasks to finish, aborting them after `grace_period`
async fn drain(mut tasks: JoinSet<()>, grace_period: Duration) {
    if tasks.is_empty() {
        return;
    }

    info!("Waiting up to {:?} for {} connections to finish", grace_period, tasks.len());
    let finished = timeout(grace_period, async {
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!("Task error during shutdown: {}", e);
            }
        }
    })
    .await;

    if finished.is_err() {
        warn!("Shutdown timeout reached, {} connections still active", tasks.len());
        tasks.shutdown().await;
    }
}
