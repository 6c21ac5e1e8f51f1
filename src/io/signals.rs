//! Unix signal handling for the nightshade daemon.
//!
//! Signals are turned into coordinator mailbox messages on a dedicated thread:
//!
//! - SIGINT, SIGTERM, SIGHUP: shut down (restoring automatic behaviour first)
//! - SIGUSR1: evaluate immediately, e.g. after resume or a clock change

use anyhow::{Context, Result};
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM, SIGUSR1};
use signal_hook::iterator::{Handle, Signals};
use std::thread::{self, JoinHandle};

use crate::core::{Mailbox, Message};

/// What a received signal asks the daemon to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    Shutdown,
    Reevaluate,
    Ignore,
}

/// Map a raw signal number to its action.
pub fn action_for(signal: i32) -> SignalAction {
    match signal {
        SIGINT | SIGTERM | SIGHUP => SignalAction::Shutdown,
        SIGUSR1 => SignalAction::Reevaluate,
        _ => SignalAction::Ignore,
    }
}

/// Running signal forwarder. Dropping it unregisters the handlers.
pub struct SignalForwarder {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl SignalForwarder {
    fn close(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SignalForwarder {
    fn drop(&mut self) {
        self.close();
    }
}

/// Register the handlers and forward signals into `mailbox`.
pub fn setup_signal_handler(mailbox: Mailbox, debug_enabled: bool) -> Result<SignalForwarder> {
    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP, SIGUSR1])
        .context("failed to register signal handlers")?;
    let handle = signals.handle();

    let thread = thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            for sig in signals.forever() {
                let message = match action_for(sig) {
                    SignalAction::Shutdown => {
                        if debug_enabled {
                            log_pipe!();
                            log_debug!("Received signal {sig}, shutting down");
                        }
                        Message::Shutdown
                    }
                    SignalAction::Reevaluate => Message::Tick,
                    SignalAction::Ignore => continue,
                };
                if !mailbox.send(message) {
                    break;
                }
            }
        })
        .context("Failed to spawn signal handler thread")?;

    Ok(SignalForwarder {
        handle,
        thread: Some(thread),
    })
}
