//! `leta`: the short-lived CLI client. Ensures the daemon is running, sends
//! one `{method, params}` request over the Unix socket, prints the response.
//!
//! Grounded on `leta/cli.py`'s `ensure_daemon_running`/`send_request`/
//! `run_request`: spawn-detached-and-poll-for-socket, write-then-half-close,
//! read-to-EOF, and surfacing a daemon log tail alongside internal errors.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::Value;

const DAEMON_POLL_ATTEMPTS: u32 = 50;
const DAEMON_POLL_INTERVAL: Duration = Duration::from_millis(100);

fn init_logging() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

/// Spawn `leta-daemon` detached if it isn't already up, then wait for the
/// socket file to appear.
fn ensure_daemon_running() -> Result<()> {
    let pid_path = leta::config::pid_path();
    let socket_path = leta::config::socket_path();

    if leta::daemon::pidfile::is_daemon_running(&pid_path) && socket_path.exists() {
        return Ok(());
    }

    let daemon_binary = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|dir| dir.join("leta-daemon")))
        .filter(|p| p.exists())
        .unwrap_or_else(|| "leta-daemon".into());

    Command::new(daemon_binary)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()
        .context("failed to spawn leta-daemon")?;

    for _ in 0..DAEMON_POLL_ATTEMPTS {
        if socket_path.exists() {
            return Ok(());
        }
        std::thread::sleep(DAEMON_POLL_INTERVAL);
    }

    bail!("daemon did not start within {:?}", DAEMON_POLL_INTERVAL * DAEMON_POLL_ATTEMPTS);
}

fn send_request(method: &str, params: &Value) -> Result<Value> {
    let socket_path = leta::config::socket_path();
    let mut stream = UnixStream::connect(&socket_path)
        .with_context(|| format!("failed to connect to {}", socket_path.display()))?;

    let request = serde_json::json!({"method": method, "params": params});
    stream.write_all(&serde_json::to_vec(&request)?)?;
    stream.shutdown(std::net::Shutdown::Write)?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response)?;
    serde_json::from_slice(&response).context("daemon returned invalid JSON")
}

fn daemon_log_tail(lines: usize) -> Option<String> {
    let log_path = leta::config::log_dir().join("daemon.log");
    let content = std::fs::read_to_string(log_path).ok()?;
    let all_lines: Vec<&str> = content.lines().collect();
    let start = all_lines.len().saturating_sub(lines);
    Some(all_lines[start..].join("\n"))
}

fn main() -> Result<()> {
    init_logging();

    let mut args = std::env::args().skip(1);
    let Some(method) = args.next() else {
        eprintln!("usage: leta <method> [json-params]");
        std::process::exit(2);
    };
    let params: Value = match args.next() {
        Some(raw) => serde_json::from_str(&raw).context("params must be valid JSON")?,
        None => Value::Object(serde_json::Map::new()),
    };

    ensure_daemon_running()?;
    let response = send_request(&method, &params)?;

    if let Some(error) = response.get("error").and_then(Value::as_str) {
        eprintln!("{error}");
        if error.to_ascii_lowercase().contains("internal error") {
            if let Some(tail) = daemon_log_tail(15) {
                eprintln!("\nRecent daemon log:\n{tail}");
            }
        }
        std::process::exit(1);
    }

    let result = response.get("result").cloned().unwrap_or(Value::Null);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
