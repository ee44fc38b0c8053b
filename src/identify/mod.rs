//! Client process identification
//!
//! In debug mode each log line is annotated with the local process that owns
//! the client socket. The lookup is platform specific and best effort: it
//! returns `None` whenever the owner cannot be determined.
//!
//! Descriptions look like `PID:1234 [curl https://example.com]` when the
//! command line is known, else `PID:1234 (curl)` or just `PID:1234`.

use std::net::SocketAddr;
use std::sync::Arc;

#[cfg(target_os = "linux")]
#[path = "linux.rs"]
mod platform;

#[cfg(windows)]
#[path = "windows.rs"]
mod platform;

#[cfg(not(any(target_os = "linux", windows)))]
mod platform {
    pub fn identify(_addr: std::net::SocketAddr) -> Option<String> {
        None
    }
}

/// Maps a client socket address to a description of its owning process
///
/// Implementations may block; callers run them on the blocking pool.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessIdentifier: Send + Sync {
    fn identify(&self, addr: SocketAddr) -> Option<String>;
}

/// Identifier backed by the operating system's socket tables
#[derive(Debug, Default, Clone, Copy)]
pub struct PlatformIdentifier;

impl ProcessIdentifier for PlatformIdentifier {
    fn identify(&self, addr: SocketAddr) -> Option<String> {
        platform::identify(addr)
    }
}

/// The identifier for the current platform
pub fn platform() -> Arc<dyn ProcessIdentifier> {
    Arc::new(PlatformIdentifier)
}

/// Format a process description from whatever is known about it
pub fn describe(pid: u32, command_line: Option<&str>, name: Option<&str>) -> String {
    match (command_line.map(str::trim), name.map(str::trim)) {
        (Some(cmd), _) if !cmd.is_empty() => format!("PID:{} [{}]", pid, cmd),
        (_, Some(name)) if !name.is_empty() => format!("PID:{} ({})", pid, name),
        _ => format!("PID:{}", pid),
    }
}
