//! Status command - display the daemon's automation state via IPC.
//!
//! One-shot mode sends a `query_state` command. Follow mode subscribes to the
//! event socket, which starts with the current state and then streams every
//! change.

use anyhow::{Context, Result};
use chrono::Local;
use std::io::Write;

use crate::common::utils::format_remaining;
use crate::core::activity::SuspendReason;
use crate::core::command::Command;
use crate::core::shift::{DisableTimer, UserOverride};
use crate::rules::{AppScope, SubdomainDisposition, SuppressionRule};
use crate::state::automation::CommandResponse;
use crate::state::ipc::client::{self, EventStream};
use crate::state::ipc::events::AutomationEvent;

/// Handle the status command.
pub fn handle_status_command(json: bool, follow: bool) -> Result<()> {
    if follow {
        return follow_events(json);
    }

    let response = match client::send_command(Command::QueryState) {
        Ok(response) => response,
        Err(e) if !client::is_running() => {
            log_error!("No nightshade process is running");
            log_indented!("Start nightshade first or use 'nightshade --debug' to run");
            log_end!();
            return Err(e);
        }
        Err(e) => return Err(e).context("Failed to query nightshade state"),
    };
    output_status(&response, json)
}

/// Print a response in the requested format.
pub(crate) fn output_status(state: &CommandResponse, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(state)?);
    } else {
        for line in describe(state) {
            println!("{line}");
        }
    }
    Ok(())
}

/// Human-readable lines for a state snapshot.
pub(crate) fn describe(state: &CommandResponse) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push(format!(
        "   Night shift: {}",
        if state.enabled { "on" } else { "off" }
    ));
    lines.push(format!("      Schedule: {}", state.schedule));

    if state.circadian_enabled {
        lines.push(format!("     Circadian: {} ({}K)", state.phase, state.kelvin));
    } else {
        lines.push("     Circadian: disabled".to_string());
    }
    if state.enabled
        && let Some(intensity) = state.intensity
    {
        lines.push(format!("     Intensity: {:.0}%", intensity * 100.0));
    }

    if state.is_suspended {
        let reason = match state.suspend_reason {
            Some(SuspendReason::MediaPlayback) => "media playback".to_string(),
            Some(SuspendReason::UserPause) => match state.suspended_until {
                Some(until) => format!(
                    "paused until {} ({})",
                    until.format("%H:%M"),
                    format_remaining(until - Local::now())
                ),
                None => "paused".to_string(),
            },
            None => "suspended".to_string(),
        };
        lines.push(format!("     Suspended: {reason}"));
    }

    match state.user_override {
        UserOverride::On => lines.push("      Override: manually on".to_string()),
        UserOverride::Off => lines.push("      Override: manually off".to_string()),
        UserOverride::NotSet => {}
    }

    if let Some(ends_at) = state.disable_timer.ends_at() {
        let label = match state.disable_timer {
            DisableTimer::Hour { .. } => "for an hour",
            _ => "for a while",
        };
        lines.push(format!(
            " Disable timer: {label}, ends {} ({})",
            ends_at.format("%H:%M"),
            format_remaining(ends_at - Local::now())
        ));
    }

    if state.suppressed {
        lines.push("    Suppressed: by a rule for the current app or site".to_string());
    }
    if !state.website_control {
        lines.push(" Website rules: off".to_string());
    }
    lines.push(format!("       Backend: {}", state.backend));

    if let Some(error) = &state.error {
        lines.push(format!("         Error: {error}"));
    }
    lines
}

/// Stored rules grouped by kind, one per line.
pub(crate) fn describe_rules(rules: &[SuppressionRule]) -> Vec<String> {
    if rules.is_empty() {
        return vec!["No suppression rules".to_string()];
    }

    let mut focused = Vec::new();
    let mut running = Vec::new();
    let mut websites = Vec::new();
    for rule in rules {
        match rule {
            SuppressionRule::App {
                bundle_id,
                scope: AppScope::CurrentOnly,
            } => focused.push(bundle_id.clone()),
            SuppressionRule::App {
                bundle_id,
                scope: AppScope::WhileRunning,
            } => running.push(bundle_id.clone()),
            SuppressionRule::Domain { host } => websites.push(format!("{host} (domain)")),
            SuppressionRule::Subdomain { host, disposition } => {
                let state = match disposition {
                    SubdomainDisposition::Enabled => "enabled",
                    SubdomainDisposition::Disabled => "disabled",
                    SubdomainDisposition::None => continue,
                };
                websites.push(format!("{host} (subdomain, {state})"));
            }
        }
    }

    let mut lines = Vec::new();
    for (title, entries) in [
        ("Applications", focused),
        ("When running", running),
        ("Websites", websites),
    ] {
        if entries.is_empty() {
            continue;
        }
        lines.push(format!("{title}:"));
        lines.extend(entries.into_iter().map(|entry| format!("  {entry}")));
    }
    lines
}

fn follow_events(json: bool) -> Result<()> {
    let mut stream = EventStream::connect()?;

    if !json {
        println!("Following nightshade state changes (press Ctrl+C to stop)...\n");
    }

    loop {
        let event = match stream.receive() {
            Ok(event) => event,
            Err(e) => {
                if !json {
                    eprintln!("{e}. Exiting follow mode.");
                }
                return Ok(());
            }
        };
        display_event(&event, json)?;
    }
}

/// Display a state change event in the appropriate format.
fn display_event(event: &AutomationEvent, json: bool) -> Result<()> {
    if json {
        // JSON streaming - one JSON object per line
        println!("{}", serde_json::to_string(event)?);
    } else {
        print!("[{}] ", Local::now().format("%H:%M:%S"));
        match event {
            AutomationEvent::StatePublished { state } => {
                print!("{} | {}K", state.phase, state.kelvin_target);
                if state.is_suspended {
                    print!(" | suspended");
                }
            }
            AutomationEvent::EnteredDeepNight => print!("entered deep night"),
            AutomationEvent::OverrideChanged { snapshot } => match snapshot.reason {
                Some(SuspendReason::MediaPlayback) => print!("suspended for media playback"),
                Some(SuspendReason::UserPause) => print!("paused"),
                None => print!("resumed"),
            },
            AutomationEvent::EnablementChanged {
                enabled,
                disable_timer,
                ..
            } => {
                print!("night shift {}", if *enabled { "on" } else { "off" });
                if let Some(ends_at) = disable_timer.ends_at() {
                    print!(" (disabled until {})", ends_at.format("%H:%M"));
                }
            }
        }
        println!();
    }
    std::io::stdout().flush()?;
    Ok(())
}

/// Display help for the status command.
pub fn display_help() {
    log_version!();
    log_block_start!("status - Display the current automation state");
    log_block_start!("Usage: nightshade status [--json] [--follow]");
    log_block_start!("Description:");
    log_indented!("Shows whether night shift is on, the circadian phase and target,");
    log_indented!("pauses, overrides, timers and rule suppression of the running daemon.");
    log_block_start!("Options:");
    log_indented!("--json     Output state information in JSON format");
    log_indented!("--follow   Continuously monitor and display state changes");
    log_block_start!("Examples:");
    log_indented!("# Show current state once");
    log_indented!("nightshade status");
    log_pipe!();
    log_indented!("# Follow mode with JSON output");
    log_indented!("nightshade status --json --follow");
    log_end!();
}
