//! Windows process lookup through the system tools
//!
//! `netstat -ano` maps the client port to a PID; `wmic` supplies the command
//! line and `tasklist` the image name.

use std::net::SocketAddr;
use std::os::windows::process::CommandExt;
use std::process::Command;

// Keep console windows from flashing up, notably under the Service Control Manager
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

pub fn identify(addr: SocketAddr) -> Option<String> {
    if !addr.ip().to_canonical().is_loopback() {
        return None;
    }

    let netstat = run("netstat", &["-ano", "-p", "tcp"])?;
    let pid = find_pid(&netstat, addr.port())?;

    let command_line = run(
        "wmic",
        &["process", "where", &format!("processid={}", pid), "get", "commandline", "/format:list"],
    )
    .and_then(|out| parse_command_line(&out));
    let name = run("tasklist", &["/FI", &format!("PID eq {}", pid), "/NH", "/FO", "CSV"])
        .and_then(|out| parse_image_name(&out));

    Some(super::describe(pid, command_line.as_deref(), name.as_deref()))
}

fn run(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program)
        .args(args)
        .creation_flags(CREATE_NO_WINDOW)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// PID owning the TCP socket whose local address ends in `:port`
///
/// Rows look like `TCP 127.0.0.1:51234 127.0.0.1:3128 ESTABLISHED 1234`.
fn find_pid(netstat: &str, port: u16) -> Option<u32> {
    let suffix = format!(":{}", port);

    netstat.lines().find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 5 || !fields[1].ends_with(&suffix) {
            return None;
        }
        fields[fields.len() - 1].parse::<u32>().ok().filter(|&pid| pid > 0)
    })
}

fn parse_command_line(wmic: &str) -> Option<String> {
    wmic.lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("CommandLine="))
        .map(str::to_string)
        .filter(|cmd| !cmd.is_empty())
}

/// First CSV column of `tasklist /NH /FO CSV` output
fn parse_image_name(tasklist: &str) -> Option<String> {
    let first = tasklist.trim().split(',').next()?.trim_matches('"');
    // tasklist prints an informational line instead of CSV when nothing matches
    (!first.is_empty() && !first.starts_with("INFO:")).then(|| first.to_string())
}
