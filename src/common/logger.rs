//! Structured logging with box-drawing output.
//!
//! Every line nightshade prints goes through the macros in this module so the
//! daemon output keeps one visual shape:
//!
//! ```text
//! ┏ nightshade v0.4.0 ━━╸
//! ┃
//! ┣ Loading configuration...
//! ┃   Schedule: 21:00-07:00
//! ┣[INFO] Circadian mode enabled
//! ╹
//! ```
//!
//! ## Conventions
//!
//! - `log_block_start!` opens a new conceptual block (adds a `┃` spacer first).
//! - `log_decorated!` continues the current block.
//! - `log_indented!` lists details that belong to the line above it.
//! - `log_pipe!` inserts a spacer before a semantic message that starts a block.
//! - `log_info!`, `log_warning!`, `log_error!`, `log_debug!` and `log_critical!`
//!   carry a colored `[LEVEL]` tag instead of plain box drawing.
//! - `log_version!` and `log_end!` bracket a daemon run.
//!
//! Output goes to stdout unless [`Log::start_file_logging`] installed a file
//! sink, in which case lines are timestamped, stripped of ANSI codes and written
//! by a background thread.

use std::io::Write;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Sender, channel};

static LOGGING_ENABLED: AtomicBool = AtomicBool::new(true);

static LOG_CHANNEL: OnceLock<Sender<LogMessage>> = OnceLock::new();

enum LogMessage {
    Line(String),
    Shutdown,
}

/// Global switches for the logging macros.
pub struct Log;

impl Log {
    /// Enable or disable all log output.
    ///
    /// Client subcommands disable logging so their stdout stays machine readable.
    pub fn set_enabled(enabled: bool) {
        LOGGING_ENABLED.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled() -> bool {
        LOGGING_ENABLED.load(Ordering::SeqCst)
    }

    /// Route all further output into `file_path`.
    ///
    /// The returned guard flushes and joins the writer thread when dropped.
    pub fn start_file_logging(file_path: String) -> anyhow::Result<LoggerGuard> {
        let (tx, rx) = channel();

        LOG_CHANNEL
            .set(tx.clone())
            .map_err(|_| anyhow::anyhow!("Logger channel already initialized"))?;

        let handle = std::thread::spawn(move || {
            let mut file = std::fs::File::create(&file_path)?;
            loop {
                match rx.recv() {
                    Ok(LogMessage::Line(text)) => file.write_all(text.as_bytes())?,
                    Ok(LogMessage::Shutdown) | Err(_) => {
                        file.flush()?;
                        break;
                    }
                }
            }
            Ok::<(), anyhow::Error>(())
        });

        Ok(LoggerGuard {
            tx,
            handle: Some(handle),
        })
    }

    /// Timestamp prefix, only present when writing to a log file.
    pub fn line_prefix() -> String {
        if LOG_CHANNEL.get().is_some() {
            format!("[{}] ", chrono::Local::now().format("%H:%M:%S"))
        } else {
            String::new()
        }
    }
}

/// Keeps the file logging thread alive; flushes on drop.
pub struct LoggerGuard {
    tx: Sender<LogMessage>,
    handle: Option<std::thread::JoinHandle<anyhow::Result<()>>>,
}

impl Drop for LoggerGuard {
    fn drop(&mut self) {
        let _ = self.tx.send(LogMessage::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn strip_ansi_codes(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            for ch in chars.by_ref() {
                if ch == 'm' {
                    break;
                }
            }
        } else {
            result.push(ch);
        }
    }

    result
}

/// Write one already formatted chunk to the active sink.
pub fn write_output(text: &str) {
    if let Some(tx) = LOG_CHANNEL.get() {
        let _ = tx.send(LogMessage::Line(strip_ansi_codes(text)));
    } else {
        print!("{text}");
        let _ = std::io::stdout().flush();
    }
}

/// Shared body of every logging macro: `lead` is the decoration placed before
/// the message on each line.
#[doc(hidden)]
#[macro_export]
macro_rules! __log_line {
    ($lead:expr, $($arg:tt)+) => {{
        use $crate::common::logger::Log;
        if Log::is_enabled() {
            let prefix = Log::line_prefix();
            let message = format!($($arg)+);
            $crate::common::logger::write_output(&format!("{prefix}{}{message}\n", $lead));
        }
    }};
}

/// Continue the current block: `┣ message`.
#[macro_export]
macro_rules! log_decorated {
    ($($arg:tt)+) => { $crate::__log_line!("┣ ", $($arg)+) };
}

/// Nested detail line: `┃   message`.
#[macro_export]
macro_rules! log_indented {
    ($($arg:tt)+) => { $crate::__log_line!("┃   ", $($arg)+) };
}

/// Vertical spacer: `┃`.
#[macro_export]
macro_rules! log_pipe {
    () => {{
        use $crate::common::logger::Log;
        if Log::is_enabled() {
            let prefix = Log::line_prefix();
            $crate::common::logger::write_output(&format!("{prefix}┃\n"));
        }
    }};
}

/// Open a new block: spacer plus `┣ message`.
#[macro_export]
macro_rules! log_block_start {
    ($($arg:tt)+) => {{
        $crate::log_pipe!();
        $crate::__log_line!("┣ ", $($arg)+);
    }};
}

/// Startup header.
#[macro_export]
macro_rules! log_version {
    () => {
        $crate::__log_line!("┏ ", "nightshade v{} ━━╸", env!("CARGO_PKG_VERSION"))
    };
}

/// Final termination marker.
#[macro_export]
macro_rules! log_end {
    () => {{
        use $crate::common::logger::Log;
        if Log::is_enabled() {
            let prefix = Log::line_prefix();
            $crate::common::logger::write_output(&format!("{prefix}╹\n"));
        }
    }};
}

#[macro_export]
macro_rules! log_warning {
    ($($arg:tt)+) => { $crate::__log_line!("┣[\x1b[33mWARNING\x1b[0m] ", $($arg)+) };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)+) => { $crate::__log_line!("┣[\x1b[31mERROR\x1b[0m] ", $($arg)+) };
}

/// Error that terminates the flow: spacer plus `┗[ERROR] message`.
#[macro_export]
macro_rules! log_error_exit {
    ($($arg:tt)+) => {{
        $crate::log_pipe!();
        $crate::__log_line!("┗[\x1b[31mERROR\x1b[0m] ", $($arg)+);
    }};
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)+) => { $crate::__log_line!("┣[\x1b[32mINFO\x1b[0m] ", $($arg)+) };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)+) => { $crate::__log_line!("┣[\x1b[32mDEBUG\x1b[0m] ", $($arg)+) };
}

#[macro_export]
macro_rules! log_critical {
    ($($arg:tt)+) => { $crate::__log_line!("┣[\x1b[31mCRITICAL\x1b[0m] ", $($arg)+) };
}
