//! Daemon runner that manages the complete lifecycle of nightshade.
//!
//! Handles resource acquisition, wiring and teardown:
//! - Configuration loading
//! - Lock file management for single-instance enforcement
//! - State store, display backend and foreground context
//! - Coordinator thread, IPC server and signal forwarding
//!
//! ```no_run
//! use nightshade::Nightshade;
//!
//! # fn main() -> anyhow::Result<()> {
//! Nightshade::new(false).run()?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::backend::create_backend;
use crate::common::constants::EXIT_FAILURE;
use crate::common::logger::Log;
use crate::common::utils::private_path;
use crate::config;
use crate::core::{Coordinator, CoordinatorParams};
use crate::io::context::{ForegroundContext, SharedContext};
use crate::io::lock;
use crate::io::signals::setup_signal_handler;
use crate::state::ipc::{IpcNotifier, IpcServer, SocketPaths};
use crate::state::{JsonFileStore, KeyValueStore, MemoryStore, Preferences, get_state_dir};
use crate::time::source::RealTimeSource;

/// Builder for configuring and running the nightshade daemon.
pub struct Nightshade {
    debug_enabled: bool,
    create_lock: bool,
    show_headers: bool,
    log_to_file: bool,
}

impl Nightshade {
    /// Create a new runner with defaults matching a normal run
    pub fn new(debug_enabled: bool) -> Self {
        Self {
            debug_enabled,
            create_lock: true,
            show_headers: true,
            log_to_file: false,
        }
    }

    /// Skip lock file creation
    pub fn without_lock(mut self) -> Self {
        self.create_lock = false;
        self
    }

    /// Skip header display
    pub fn without_headers(mut self) -> Self {
        self.show_headers = false;
        self
    }

    /// Mirror output into a log file in the state directory
    pub fn with_log_file(mut self, enabled: bool) -> Self {
        self.log_to_file = enabled;
        self
    }

    /// Execute the daemon until a shutdown signal arrives.
    pub fn run(self) -> Result<()> {
        let _log_guard = if self.log_to_file {
            let dir = get_state_dir(config::get_custom_config_dir().as_deref())?;
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", private_path(&dir)))?;
            Some(Log::start_file_logging(
                dir.join("nightshade.log").to_string_lossy().into_owned(),
            )?)
        } else {
            None
        };

        if self.show_headers {
            log_version!();
            if self.debug_enabled {
                log_pipe!();
                log_debug!("Debug mode enabled - showing detailed automation decisions");
            }
        }

        let config = match config::load() {
            Ok(config) => config,
            Err(e) => {
                log_error_exit!("Configuration failed");
                eprintln!("{e:?}");
                std::process::exit(EXIT_FAILURE);
            }
        };

        // Hold the lock for the whole run; dropping it removes the file
        let _lock = if self.create_lock {
            match lock::acquire_lock(&lock::lock_path()) {
                Ok(lock) => Some(lock),
                Err(e) => {
                    log_pipe!();
                    log_error!("{e}");
                    log_end!();
                    std::process::exit(EXIT_FAILURE);
                }
            }
        } else {
            None
        };

        config.log_config();

        let prefs = Preferences::new(open_store());
        let display = create_backend(config.backend())?;
        log_block_start!("Display backend: {}", display.backend_name());

        let context = Arc::new(SharedContext::new(ForegroundContext::default()));

        let mut coordinator = Coordinator::new(CoordinatorParams {
            prefs,
            display,
            context,
            solar: config.solar_provider(),
            time_source: Arc::new(RealTimeSource),
            curve: config.curve_config(),
            schedule: config.schedule_mode(),
            circadian_enabled: config.circadian_enabled(),
            media_apps: config.media_apps(),
            update_interval: config.update_interval(),
            debug_enabled: self.debug_enabled,
        });

        let (notifier, events) = IpcNotifier::new();
        coordinator.subscribe(Box::new(move |event| notifier.send(event.clone())));
        let mailbox = coordinator.mailbox();

        let ipc_server = match SocketPaths::runtime()
            .and_then(|paths| IpcServer::start(paths, events, mailbox.clone(), self.debug_enabled))
        {
            Ok(server) => Some(server),
            Err(e) => {
                log_pipe!();
                log_warning!("IPC unavailable: {e:#}");
                log_indented!("Client commands will not reach this instance");
                None
            }
        };

        let _signals = setup_signal_handler(mailbox, self.debug_enabled)?;

        log_block_start!("Starting nightshade...");
        let handle = coordinator.spawn()?;
        handle.wait();

        if let Some(server) = ipc_server
            && let Err(e) = server.shutdown()
        {
            log_warning!("IPC shutdown failed: {e:#}");
        }

        log_block_start!("Automatic behaviour restored");
        log_end!();
        Ok(())
    }
}

/// The file-backed store, or an in-memory one when the state file cannot be
/// used. State then lives only as long as the process.
fn open_store() -> Box<dyn KeyValueStore> {
    match JsonFileStore::open_default() {
        Ok(store) => {
            log_decorated!("State file: {}", private_path(store.path()));
            Box::new(store)
        }
        Err(e) => {
            log_pipe!();
            log_warning!("State file unavailable, settings will not persist: {e:#}");
            Box::new(MemoryStore::new())
        }
    }
}
