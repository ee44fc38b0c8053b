//! Process lifecycle glue
//!
//! The proxy itself only knows about a stop future. This module supplies the
//! one the binary uses: SIGINT or SIGTERM on Unix, Ctrl+C elsewhere, and the
//! Service Control Manager's stop request when running as a Windows service.

use log::{info, warn};

use crate::common::Result;
use crate::config::ProxyConfig;

#[cfg(windows)]
mod windows;

/// Name the proxy registers under with the Windows Service Control Manager
pub const SERVICE_NAME: &str = "mini-proxy";

/// Run the proxy until the platform asks it to stop
///
/// On Windows this first tries to hand control to the Service Control
/// Manager; when the process was not started as a service it runs as a
/// console program like everywhere else.
pub async fn serve(config: ProxyConfig) -> Result<()> {
    #[cfg(windows)]
    return windows::serve(config).await;

    #[cfg(not(windows))]
    crate::run(config, shutdown_signal()).await
}

/// Resolves once the process is asked to stop
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(terminate) => terminate,
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = ctrl_c() => {}
            _ = terminate.recv() => info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received interrupt"),
        Err(e) => {
            // Without a handler we must not resolve, or the proxy would stop at once
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
