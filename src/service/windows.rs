//! Windows Service Control Manager adapter
//!
//! The SCM calls the service entry point on a thread of its own. The proxy
//! runs there on the binary's tokio runtime, reached through a stored
//! `Handle`, while the dispatcher blocks a thread of the blocking pool.

use log::{error, info, warn};
use std::ffi::OsString;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use windows_service::service::{
    ServiceControl, ServiceControlAccept, ServiceExitCode, ServiceState, ServiceStatus, ServiceType,
};
use windows_service::service_control_handler::{self, ServiceControlHandlerResult, ServiceStatusHandle};
use windows_service::{define_windows_service, service_dispatcher};

use super::{shutdown_signal, SERVICE_NAME};
use crate::common::{ProxyError, Result};
use crate::config::ProxyConfig;

/// `StartServiceCtrlDispatcher` fails with this when the process is a console program
const ERROR_FAILED_SERVICE_CONTROLLER_CONNECT: i32 = 1063;

struct Launch {
    config: ProxyConfig,
    runtime: Handle,
}

static LAUNCH: OnceLock<Launch> = OnceLock::new();

define_windows_service!(ffi_service_main, service_main);

pub async fn serve(config: ProxyConfig) -> Result<()> {
    let launch = Launch {
        config: config.clone(),
        runtime: Handle::current(),
    };
    if LAUNCH.set(launch).is_err() {
        return Err(ProxyError::Service("service already started".to_string()));
    }

    let dispatched = tokio::task::spawn_blocking(|| service_dispatcher::start(SERVICE_NAME, ffi_service_main))
        .await
        .map_err(|e| ProxyError::Service(e.to_string()))?;

    match dispatched {
        Ok(()) => Ok(()),
        Err(e) if is_console_launch(&e) => {
            info!("Not started by the Service Control Manager, running in console mode");
            crate::run(config, shutdown_signal()).await
        }
        Err(e) => Err(ProxyError::Service(e.to_string())),
    }
}

fn is_console_launch(err: &windows_service::Error) -> bool {
    match err {
        windows_service::Error::Winapi(e) => e.raw_os_error() == Some(ERROR_FAILED_SERVICE_CONTROLLER_CONNECT),
        _ => false,
    }
}

fn service_main(_arguments: Vec<OsString>) {
    if let Err(e) = run_service() {
        error!("Service stopped with error: {}", e);
    }
}

fn run_service() -> Result<()> {
    let launch = LAUNCH
        .get()
        .ok_or_else(|| ProxyError::Service("service entry point reached before launch".to_string()))?;

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let status = service_control_handler::register(SERVICE_NAME, move |control| match control {
        ServiceControl::Stop | ServiceControl::Shutdown => {
            stop_tx.send_replace(true);
            ServiceControlHandlerResult::NoError
        }
        ServiceControl::Interrogate => ServiceControlHandlerResult::NoError,
        _ => ServiceControlHandlerResult::NotImplemented,
    })
    .map_err(service_error)?;

    report(status, ServiceState::StartPending, ServiceControlAccept::empty(), 0)?;
    report(
        status,
        ServiceState::Running,
        ServiceControlAccept::STOP | ServiceControlAccept::SHUTDOWN,
        0,
    )?;
    info!("Running as Windows service {}", SERVICE_NAME);

    let stop = async move {
        // A dropped sender means the control handler is gone; stop as well
        let _ = stop_rx.wait_for(|stopping| *stopping).await;
        info!("Service stop requested");
        if let Err(e) = report(status, ServiceState::StopPending, ServiceControlAccept::empty(), 0) {
            warn!("Failed to report StopPending: {}", e);
        }
    };

    let result = launch.runtime.block_on(crate::run(launch.config.clone(), stop));
    let exit_code = if result.is_ok() { 0 } else { 1 };
    report(status, ServiceState::Stopped, ServiceControlAccept::empty(), exit_code)?;
    result
}

fn report(handle: ServiceStatusHandle, state: ServiceState, accepts: ServiceControlAccept, exit_code: u32) -> Result<()> {
    handle
        .set_service_status(ServiceStatus {
            service_type: ServiceType::OWN_PROCESS,
            current_state: state,
            controls_accepted: accepts,
            exit_code: ServiceExitCode::Win32(exit_code),
            checkpoint: 0,
            wait_hint: Duration::default(),
            process_id: None,
        })
        .map_err(service_error)
}

fn service_error(err: windows_service::Error) -> ProxyError {
    ProxyError::Service(err.to_string())
}
