//! Unix socket server for nightshade IPC.
//!
//! One loop serves both sockets: it drains coordinator events and broadcasts
//! them, accepts event subscribers and prunes disconnected ones. Each command
//! connection is answered on its own short-lived thread, so a client that
//! never sends its request cannot hold up event delivery.

use anyhow::{Context, Result};
use nix::unistd::getuid;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use super::SocketPaths;
use crate::common::constants::COMMAND_TIMEOUT_SECS;
use crate::core::Mailbox;
use crate::state::automation::AutomationState;
use crate::state::ipc::events::{AutomationEvent, IpcRequest, IpcResponse};

/// Unix socket server for command and event clients.
pub struct IpcSocketServer {
    paths: SocketPaths,
    command_listener: UnixListener,
    events_listener: UnixListener,
    mailbox: Mailbox,
    clients: HashMap<u32, ClientConnection>,
    next_client_id: u32,
    current_state: Option<AutomationState>,
}

/// A connected event subscriber.
struct ClientConnection {
    raw_stream: UnixStream,
    writer: BufWriter<UnixStream>,
    connected_at: Instant,
}

fn bind(socket_path: &Path) -> Result<UnixListener> {
    // A stale socket from a crashed run would make bind fail
    if socket_path.exists() {
        std::fs::remove_file(socket_path)
            .with_context(|| format!("Failed to remove existing socket: {socket_path:?}"))?;
    }

    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create socket directory: {parent:?}"))?;
    }

    let listener = UnixListener::bind(socket_path)
        .with_context(|| format!("Failed to bind Unix socket: {socket_path:?}"))?;
    listener
        .set_nonblocking(true)
        .context("Failed to set socket to non-blocking mode")?;
    Ok(listener)
}

impl IpcSocketServer {
    pub fn new(paths: SocketPaths, mailbox: Mailbox) -> Result<Self> {
        let command_listener = bind(&paths.command)?;
        let events_listener = bind(&paths.events)?;

        Ok(Self {
            paths,
            command_listener,
            events_listener,
            mailbox,
            clients: HashMap::new(),
            next_client_id: 1,
            current_state: None,
        })
    }

    /// Serve until `running` is cleared.
    pub fn run(
        mut self,
        event_receiver: mpsc::Receiver<AutomationEvent>,
        running: Arc<AtomicBool>,
        debug_enabled: bool,
    ) -> Result<()> {
        if debug_enabled {
            log_debug!("IPC server listening on {:?}", self.paths.command);
        }

        while running.load(Ordering::SeqCst) {
            while let Ok(event) = event_receiver.try_recv() {
                if let Err(e) = self.update_state(event, debug_enabled) {
                    log_warning!("Failed to broadcast event: {e:#}");
                }
            }

            self.accept_subscribers(debug_enabled);
            self.serve_commands(debug_enabled);
            self.prune_clients(debug_enabled);

            // Small delay to prevent busy-waiting
            thread::sleep(Duration::from_millis(10));
        }

        if debug_enabled {
            log_debug!("IPC server shutting down");
        }

        self.cleanup()
    }

    fn update_state(&mut self, event: AutomationEvent, debug_enabled: bool) -> Result<()> {
        if let AutomationEvent::StatePublished { state } = event {
            self.current_state = Some(state);
        }
        self.broadcast_event(&event, debug_enabled)
    }

    fn broadcast_event(&mut self, event: &AutomationEvent, debug_enabled: bool) -> Result<()> {
        let json_line = serde_json::to_string(event).context("Failed to serialize event to JSON")?;
        let message = format!("{json_line}\n");

        let mut failed_clients = Vec::new();
        for (client_id, client) in &mut self.clients {
            if client.writer.write_all(message.as_bytes()).is_err()
                || client.writer.flush().is_err()
            {
                failed_clients.push(*client_id);
            }
        }

        for client_id in failed_clients {
            self.remove_client(client_id, debug_enabled);
        }
        Ok(())
    }

    /// Accept new event subscribers (non-blocking). A subscriber that cannot
    /// be set up is dropped on its own; the server keeps running.
    fn accept_subscribers(&mut self, debug_enabled: bool) {
        loop {
            match self.events_listener.accept() {
                Ok((stream, _addr)) => {
                    if let Err(e) = self.register_subscriber(stream, debug_enabled) {
                        log_warning!("Dropping event subscriber: {e:#}");
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    if debug_enabled {
                        log_debug!("Error accepting subscriber: {e}");
                    }
                    break;
                }
            }
        }
    }

    fn register_subscriber(&mut self, stream: UnixStream, debug_enabled: bool) -> Result<()> {
        let client_id = self.next_client_id;
        self.next_client_id += 1;

        // Non-blocking so reads detect disconnects without stalling
        stream
            .set_nonblocking(true)
            .context("Failed to set client stream to non-blocking mode")?;
        let writer_stream = stream
            .try_clone()
            .context("Failed to clone stream for writer")?;

        let mut client = ClientConnection {
            raw_stream: stream,
            writer: BufWriter::new(writer_stream),
            connected_at: Instant::now(),
        };

        if let Some(state) = self.current_state {
            let event = AutomationEvent::state_published(state);
            let json_line = serde_json::to_string(&event)
                .context("Failed to serialize current state for new client")?;
            client
                .writer
                .write_all(format!("{json_line}\n").as_bytes())
                .and_then(|()| client.writer.flush())
                .with_context(|| format!("Failed to send current state to client {client_id}"))?;
        }

        self.clients.insert(client_id, client);
        if debug_enabled {
            log_debug!("IPC subscribers: {}", self.clients.len());
        }
        Ok(())
    }

    /// Hand every pending command connection to its own thread.
    fn serve_commands(&mut self, debug_enabled: bool) {
        loop {
            match self.command_listener.accept() {
                Ok((stream, _addr)) => {
                    let mailbox = self.mailbox.clone();
                    let spawned = thread::Builder::new()
                        .name("ipc-command".to_string())
                        .spawn(move || {
                            if let Err(e) = serve_command(stream, &mailbox)
                                && debug_enabled
                            {
                                log_debug!("Command connection failed: {e:#}");
                            }
                        });
                    if let Err(e) = spawned {
                        log_warning!("Failed to start command handler: {e}");
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    if debug_enabled {
                        log_debug!("Error accepting command connection: {e}");
                    }
                    break;
                }
            }
        }
    }

    /// Remove disconnected subscribers by attempting to read from them.
    ///
    /// Subscribers never send data, so a zero-length read or a reset means the
    /// peer is gone.
    fn prune_clients(&mut self, debug_enabled: bool) {
        use std::io::Read;
        let mut disconnected = Vec::new();

        for (client_id, client) in &mut self.clients {
            let mut buffer = [0u8; 1];
            match client.raw_stream.read(&mut buffer) {
                Ok(0) => disconnected.push(*client_id),
                Ok(_) => {}
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(_) => disconnected.push(*client_id),
            }
        }

        for client_id in disconnected {
            self.remove_client(client_id, debug_enabled);
        }
    }

    fn remove_client(&mut self, client_id: u32, debug_enabled: bool) {
        if let Some(client) = self.clients.remove(&client_id)
            && debug_enabled
        {
            log_debug!(
                "IPC subscriber left after {}s - subscribers: {}",
                client.connected_at.elapsed().as_secs(),
                self.clients.len()
            );
        }
    }

    fn cleanup(&self) -> Result<()> {
        for path in [&self.paths.command, &self.paths.events] {
            if path.exists() {
                std::fs::remove_file(path)
                    .with_context(|| format!("Failed to remove socket file: {path:?}"))?;
            }
        }
        Ok(())
    }
}

/// Read one request line, answer it and close the connection.
fn serve_command(stream: UnixStream, mailbox: &Mailbox) -> Result<()> {
    stream
        .set_nonblocking(false)
        .context("Failed to set command stream to blocking mode")?;
    stream
        .set_read_timeout(Some(Duration::from_secs(COMMAND_TIMEOUT_SECS)))
        .context("Failed to set read timeout on command stream")?;

    let mut line = String::new();
    BufReader::new(&stream)
        .read_line(&mut line)
        .context("Failed to read command")?;

    let response = answer(line.trim(), mailbox);
    let json_line = serde_json::to_string(&response).context("Failed to serialize response")?;
    let mut writer = &stream;
    writer.write_all(format!("{json_line}\n").as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Turn one request line into a response, forwarding the command to the
/// coordinator.
pub(crate) fn answer(line: &str, mailbox: &Mailbox) -> IpcResponse {
    let request: IpcRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => return IpcResponse::failed(None, format!("Invalid request: {e}")),
    };

    match mailbox.request(request.command, Duration::from_secs(COMMAND_TIMEOUT_SECS)) {
        Ok(state) => IpcResponse::answered(request.request_id, state),
        Err(e) => IpcResponse::failed(request.request_id, format!("{e:#}")),
    }
}

fn runtime_dir() -> PathBuf {
    if let Ok(xdg_runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(xdg_runtime_dir)
    } else {
        PathBuf::from(format!("/run/user/{}", getuid()))
    }
}

/// Command socket: `$XDG_RUNTIME_DIR/nightshade.sock`, falling back to
/// `/run/user/{uid}/nightshade.sock`.
pub fn command_socket_path() -> Result<PathBuf> {
    Ok(runtime_dir().join("nightshade.sock"))
}

/// Event broadcast socket next to the command socket.
pub fn events_socket_path() -> Result<PathBuf> {
    Ok(runtime_dir().join("nightshade-events.sock"))
}
