//! IPC client utilities for talking to a running nightshade daemon.
//!
//! [`send_command`] performs one request/response exchange on the command
//! socket. [`EventStream`] follows the event socket for `status --follow`.

use anyhow::{Context, Result, bail};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use super::server::{command_socket_path, events_socket_path};
use crate::common::constants::COMMAND_TIMEOUT_SECS;
use crate::core::command::Command;
use crate::state::automation::CommandResponse;
use crate::state::ipc::events::{AutomationEvent, IpcRequest, IpcResponse};

/// Send `command` to the daemon on the default socket.
pub fn send_command(command: Command) -> Result<CommandResponse> {
    let socket_path = command_socket_path().context("Failed to get IPC socket path")?;
    send_command_to(&socket_path, command)
}

/// Send `command` to the daemon listening on `socket_path`.
pub fn send_command_to(socket_path: &Path, command: Command) -> Result<CommandResponse> {
    let stream = UnixStream::connect(socket_path).with_context(|| {
        format!("Failed to connect to nightshade at {socket_path:?}. Is nightshade running?")
    })?;
    // The daemon may itself wait up to the command timeout for the coordinator
    stream
        .set_read_timeout(Some(Duration::from_secs(COMMAND_TIMEOUT_SECS * 2)))
        .context("Failed to set read timeout on IPC socket")?;

    let request_id = std::process::id().to_string();
    let request = IpcRequest {
        request_id: Some(request_id.clone()),
        command,
    };
    let json_line = serde_json::to_string(&request).context("Failed to serialize request")?;
    let mut writer = &stream;
    writer
        .write_all(format!("{json_line}\n").as_bytes())
        .context("Failed to send command")?;
    writer.flush()?;

    let mut line = String::new();
    BufReader::new(&stream)
        .read_line(&mut line)
        .context("Failed to read response from IPC socket")?;
    if line.trim().is_empty() {
        bail!("Received empty response from nightshade");
    }

    let response: IpcResponse = serde_json::from_str(line.trim())
        .with_context(|| format!("Failed to parse response JSON: {}", line.trim()))?;

    if response.request_id.as_deref() != Some(request_id.as_str()) {
        bail!("Response does not match the request that was sent");
    }
    if let Some(failure) = response.failure {
        bail!(failure);
    }
    response
        .state
        .context("Response carried neither state nor failure")
}

/// Subscription to the event broadcast socket.
pub struct EventStream {
    reader: BufReader<UnixStream>,
}

impl EventStream {
    pub fn connect() -> Result<Self> {
        let socket_path = events_socket_path().context("Failed to get IPC socket path")?;
        Self::connect_to(&socket_path)
    }

    pub fn connect_to(socket_path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(socket_path).with_context(|| {
            format!("Failed to connect to nightshade events at {socket_path:?}. Is nightshade running?")
        })?;
        Ok(Self {
            reader: BufReader::new(stream),
        })
    }

    /// Block until the next event arrives.
    pub fn receive(&mut self) -> Result<AutomationEvent> {
        let mut line = String::new();
        self.reader
            .read_line(&mut line)
            .context("Failed to receive event from IPC socket")?;

        if line.trim().is_empty() {
            bail!("Connection closed by nightshade");
        }

        serde_json::from_str(line.trim())
            .with_context(|| format!("Failed to parse event JSON: {}", line.trim()))
    }
}

/// Quick reachability check for the daemon's command socket.
pub fn is_running() -> bool {
    command_socket_path()
        .ok()
        .filter(|path| path.exists())
        .is_some_and(|path| UnixStream::connect(path).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_failure_is_reported() {
        let temp_dir = tempfile::tempdir().unwrap();
        let missing = temp_dir.path().join("absent.sock");
        let err = send_command_to(&missing, Command::QueryState).unwrap_err();
        assert!(err.to_string().contains("Failed to connect"));
    }

    #[test]
    fn test_event_stream_failure_is_reported() {
        let temp_dir = tempfile::tempdir().unwrap();
        let missing = temp_dir.path().join("absent-events.sock");
        assert!(EventStream::connect_to(&missing).is_err());
    }
}
