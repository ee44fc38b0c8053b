//! Linux process lookup through `/proc`
//!
//! The client's port is matched against the local-address column of the
//! established sockets in `/proc/net/tcp{,6}`; the socket inode is then
//! searched for among every process's open file descriptors.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;

const SOCKET_TABLES: [&str; 2] = ["/proc/net/tcp", "/proc/net/tcp6"];

/// `st` column value of an established socket
const TCP_ESTABLISHED: &str = "01";

pub fn identify(addr: SocketAddr) -> Option<String> {
    // Only clients on this machine have their sockets in our /proc
    if !addr.ip().to_canonical().is_loopback() {
        return None;
    }

    let inode = SOCKET_TABLES
        .iter()
        .find_map(|table| fs::read_to_string(table).ok().and_then(|t| find_inode(&t, addr.port())))?;
    let pid = find_pid_by_inode(Path::new("/proc"), &inode)?;

    let command_line = fs::read(format!("/proc/{}/cmdline", pid))
        .ok()
        .map(|raw| String::from_utf8_lossy(&raw).replace('\0', " "));
    let name = fs::read_to_string(format!("/proc/{}/comm", pid)).ok();

    Some(super::describe(pid, command_line.as_deref(), name.as_deref()))
}

/// Inode of the established socket whose local port is `port`
fn find_inode(table: &str, port: u16) -> Option<String> {
    let hex_port = format!("{:04X}", port);

    table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 || fields[3] != TCP_ESTABLISHED {
            return None;
        }

        let (_, local_port) = fields[1].split_once(':')?;
        (local_port == hex_port).then(|| fields[9].to_string())
    })
}

fn find_pid_by_inode(proc_root: &Path, inode: &str) -> Option<u32> {
    let target = format!("socket:[{}]", inode);

    for entry in fs::read_dir(proc_root).ok()?.flatten() {
        let pid = match entry.file_name().to_str().and_then(|name| name.parse::<u32>().ok()) {
            Some(pid) => pid,
            None => continue,
        };

        // Processes we may not inspect are skipped
        let fds = match fs::read_dir(entry.path().join("fd")) {
            Ok(fds) => fds,
            Err(_) => continue,
        };

        for fd in fds.flatten() {
            if let Ok(link) = fs::read_link(fd.path()) {
                if link.as_os_str() == target.as_str() {
                    return Some(pid);
                }
            }
        }
    }

    None
}
