//! Help command implementation for nightshade.
//!
//! Shows command-specific help or the command overview.

use anyhow::Result;

/// Show brief usage for a command (used for error messages)
pub fn show_command_usage(command: &str) {
    match command {
        "status" | "st" => log_block_start!("Usage: nightshade status [--json] [--follow]"),
        "pause" => log_block_start!("Usage: nightshade pause <minutes>"),
        "disable" => log_block_start!("Usage: nightshade disable <minutes>"),
        "schedule" => log_block_start!("Usage: nightshade schedule <off|solar|HH:MM-HH:MM>"),
        "rule" => {
            log_block_start!("Usage: nightshade rule list");
            log_indented!("       nightshade rule add|remove app|running|domain <id>");
            log_indented!("       nightshade rule subdomain <host> enabled|disabled|none");
        }
        "websites" => log_block_start!("Usage: nightshade websites on|off"),
        "intensity" => log_block_start!("Usage: nightshade intensity <0-100|up|down> [--preview]"),
        "context" => log_block_start!("Usage: nightshade context <app> [domain] [subdomain]"),
        _ => log_block_start!("Usage: nightshade [OPTIONS] [COMMAND]"),
    }
}

/// Run the help command (dispatcher)
pub fn run_help_command(command: Option<&str>) -> Result<()> {
    match command {
        None => display_general_help(),
        Some("status") | Some("st") => super::status::display_help(),
        Some("pause") | Some("resume") => display_pause_help(),
        Some("rule") | Some("websites") => display_rule_help(),
        Some("intensity") => display_intensity_help(),
        Some("help") => display_help_help(),
        Some(other) => {
            log_version!();
            show_command_usage(other);
            log_end!();
        }
    }
    Ok(())
}

/// Display general help focused on commands (for the help command)
fn display_general_help() {
    log_version!();
    log_block_start!("Available Commands:");
    log_indented!("status [--json] [--follow]  Show the daemon's state");
    log_indented!("pause <minutes> | resume    Pause the circadian curve");
    log_indented!("on | off | toggle           Manual on/off");
    log_indented!("disable <minutes> | cancel  Keep night shift off for a while");
    log_indented!("circadian                   Toggle the circadian curve");
    log_indented!("schedule <mode>             Set the schedule");
    log_indented!("rule ...                    List or edit suppression rules");
    log_indented!("websites on|off             Apply or ignore website rules");
    log_indented!("intensity <0-100|up|down>   Set intensity by hand");
    log_indented!("context <app> [domain] ...  Report the foreground context");
    log_pipe!();
    log_info!("Use 'nightshade help <command>' to see detailed help for a specific command.");
    log_indented!("Use 'nightshade --help' to see all options and general usage.");
    log_end!();
}

fn display_pause_help() {
    log_version!();
    log_block_start!("pause - Suspend the circadian curve temporarily");
    log_block_start!("Usage: nightshade pause <minutes>");
    log_indented!("       nightshade resume");
    log_block_start!("Description:");
    log_indented!("Pauses are clamped to 1-30 minutes. A new pause replaces the");
    log_indented!("running one. Media apps in front suspend the curve on their own.");
    log_end!();
}

fn display_rule_help() {
    log_version!();
    log_block_start!("rule - Edit suppression rules");
    show_command_usage("rule");
    log_block_start!("Kinds:");
    log_indented!("app       Suppress while the app is in front");
    log_indented!("running   Suppress while the app is running at all");
    log_indented!("domain    Suppress on a site and all of its subdomains");
    log_block_start!("Subdomains:");
    log_indented!("disabled  Suppress on this subdomain only");
    log_indented!("enabled   Keep night shift on this subdomain despite a domain rule");
    log_indented!("none      Follow the domain rule");
    log_block_start!("Website rules:");
    log_indented!("'nightshade websites off' ignores domain and subdomain rules");
    log_indented!("without deleting them; app rules keep applying.");
    log_end!();
}

fn display_intensity_help() {
    log_version!();
    log_block_start!("intensity - Set night shift strength by hand");
    show_command_usage("intensity");
    log_block_start!("Description:");
    log_indented!("Percent from 0 (no warming) to 100 (warmest). 'up' and 'down'");
    log_indented!("move it by 10. --preview shows a value without storing it.");
    log_indented!("Refused while the circadian curve drives intensity; turn it off");
    log_indented!("with 'nightshade circadian' or pause it first.");
    log_end!();
}

fn display_help_help() {
    log_version!();
    log_block_start!("help - Show help for a command");
    log_block_start!("Usage: nightshade help [COMMAND]");
    log_end!();
}
