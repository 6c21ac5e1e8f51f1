//! IPC system for nightshade.
//!
//! Two Unix sockets live in the runtime directory:
//!
//! - `nightshade.sock` takes one JSON command per connection and answers with
//!   one JSON response line. The CLI client subcommands use it.
//! - `nightshade-events.sock` broadcasts [`AutomationEvent`]s, one JSON object
//!   per line, starting with the current state on connect.
//!
//! The server runs on its own thread so socket I/O never stalls the
//! coordinator; commands reach the coordinator through its [`Mailbox`].

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};

use crate::core::Mailbox;

pub mod client;
pub mod events;
mod server;

pub use server::{command_socket_path, events_socket_path};

use events::AutomationEvent;

/// Forwards coordinator events to the IPC server thread.
#[derive(Clone)]
pub struct IpcNotifier {
    event_sender: mpsc::Sender<AutomationEvent>,
}

impl IpcNotifier {
    /// Create a notifier and the receiver the server consumes.
    pub fn new() -> (Self, mpsc::Receiver<AutomationEvent>) {
        let (event_sender, event_receiver) = mpsc::channel();
        (Self { event_sender }, event_receiver)
    }

    pub fn send(&self, event: AutomationEvent) {
        let _ = self.event_sender.send(event);
    }
}

/// Where the server binds its two sockets.
#[derive(Debug, Clone)]
pub struct SocketPaths {
    pub command: PathBuf,
    pub events: PathBuf,
}

impl SocketPaths {
    /// Sockets in the user's runtime directory.
    pub fn runtime() -> Result<Self> {
        Ok(Self {
            command: command_socket_path()?,
            events: events_socket_path()?,
        })
    }
}

/// IPC server running in a background thread.
pub struct IpcServer {
    running: Arc<AtomicBool>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl IpcServer {
    /// Bind both sockets and start serving.
    ///
    /// Binding happens on the calling thread so failures surface here.
    pub fn start(
        paths: SocketPaths,
        event_receiver: mpsc::Receiver<AutomationEvent>,
        mailbox: Mailbox,
        debug_enabled: bool,
    ) -> Result<Self> {
        let socket_server = server::IpcSocketServer::new(paths, mailbox)
            .context("Failed to create IPC socket server")?;

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);

        let thread_handle = std::thread::Builder::new()
            .name("ipc-server".to_string())
            .spawn(move || {
                if let Err(e) = socket_server.run(event_receiver, thread_running, debug_enabled) {
                    log_error!("IPC server stopped: {e:#}");
                }
            })
            .context("Failed to spawn IPC server thread")?;

        Ok(Self {
            running,
            thread_handle: Some(thread_handle),
        })
    }

    /// Stop serving, remove the sockets and wait for the thread.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            handle
                .join()
                .map_err(|_| anyhow::anyhow!("IPC server thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
