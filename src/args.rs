//! Command-line argument parsing and processing.
//!
//! Without a subcommand nightshade runs the daemon. Subcommands talk to a
//! running daemon over IPC and map one-to-one onto coordinator commands.

use crate::common::constants::INTENSITY_STEP;
use crate::core::command::Command;
use crate::core::schedule::ScheduleMode;
use crate::io::context::ForegroundContext;
use crate::rules::{AppScope, SubdomainDisposition, SuppressionRule};

/// Represents the parsed command-line arguments and their intended actions.
#[derive(Debug, PartialEq)]
pub enum CliAction {
    /// Run the daemon with these settings
    Run {
        debug_enabled: bool,
        config_dir: Option<String>,
        log_to_file: bool,
    },
    /// Print the daemon's state, optionally following changes
    Status { json: bool, follow: bool },
    /// Flip the display on or off relative to its current state
    Toggle { json: bool },
    /// Send one command to the daemon and print the resulting state
    Send { command: Command, json: bool },
    /// Detailed help for one command, or the command overview
    Help { command: Option<String> },
    /// Display help information and exit
    ShowHelp,
    /// Display version information and exit
    ShowVersion,
    /// A subcommand was given invalid arguments
    UsageError { command: String, message: String },
    /// Show help due to unknown arguments and exit
    ShowHelpDueToError,
}

/// Result of parsing command-line arguments.
pub struct ParsedArgs {
    pub action: CliAction,
}

impl ParsedArgs {
    /// Parse command-line arguments into a structured result.
    ///
    /// The first element of `args` is the program name and is skipped.
    pub fn parse<I, S>(args: I) -> ParsedArgs
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args_vec: Vec<String> = args
            .into_iter()
            .skip(1)
            .map(|s| s.as_ref().to_string())
            .collect();

        if args_vec
            .iter()
            .any(|arg| arg == "--version" || arg == "-V" || arg == "-v")
        {
            return ParsedArgs {
                action: CliAction::ShowVersion,
            };
        }
        if args_vec.iter().any(|arg| arg == "--help" || arg == "-h") {
            return ParsedArgs {
                action: CliAction::ShowHelp,
            };
        }

        // Find the first non-flag argument, skipping over flag values
        let mut command_idx = None;
        let mut idx = 0;
        while idx < args_vec.len() {
            let arg = &args_vec[idx];
            if matches!(arg.as_str(), "--config" | "-c") {
                idx += 2;
            } else if arg.starts_with('-') {
                idx += 1;
            } else {
                command_idx = Some(idx);
                break;
            }
        }

        let action = match command_idx {
            Some(cmd_idx) => {
                let command = args_vec[cmd_idx].as_str();
                // Everything after the subcommand; flags are collected separately
                let rest = &args_vec[cmd_idx + 1..];
                let json = rest.iter().any(|arg| arg == "--json" || arg == "-j");
                let positional: Vec<&str> = rest
                    .iter()
                    .map(String::as_str)
                    .filter(|arg| !arg.starts_with("--") && *arg != "-j" && *arg != "-f")
                    .collect();
                parse_subcommand(command, rest, &positional, json)
            }
            None => parse_run_flags(&args_vec),
        };

        ParsedArgs { action }
    }

    /// Convenience method to parse from std::env::args()
    pub fn from_env() -> ParsedArgs {
        Self::parse(std::env::args())
    }
}

fn parse_run_flags(args: &[String]) -> CliAction {
    let mut debug_enabled = false;
    let mut log_to_file = false;
    let mut config_dir = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--debug" | "-d" => debug_enabled = true,
            "--log" | "-l" => log_to_file = true,
            "--config" | "-c" => match iter.next() {
                Some(dir) => config_dir = Some(dir.clone()),
                None => {
                    return CliAction::UsageError {
                        command: String::new(),
                        message: "--config requires a directory".to_string(),
                    };
                }
            },
            _ => return CliAction::ShowHelpDueToError,
        }
    }

    CliAction::Run {
        debug_enabled,
        config_dir,
        log_to_file,
    }
}

fn usage_error(command: &str, message: impl Into<String>) -> CliAction {
    CliAction::UsageError {
        command: command.to_string(),
        message: message.into(),
    }
}

fn send(command: Command, json: bool) -> CliAction {
    CliAction::Send { command, json }
}

fn parse_subcommand(command: &str, rest: &[String], positional: &[&str], json: bool) -> CliAction {
    match command {
        "status" | "st" => CliAction::Status {
            json,
            follow: rest.iter().any(|arg| arg == "--follow" || arg == "-f"),
        },
        "pause" => match positional {
            [minutes] => match minutes.parse::<i64>() {
                Ok(minutes) => send(Command::SetTemporaryPause { minutes }, json),
                Err(_) => usage_error(command, format!("Invalid number of minutes: {minutes}")),
            },
            _ => usage_error(command, "Expected the pause length in minutes"),
        },
        "resume" => send(Command::ClearTemporaryPause, json),
        "toggle" => CliAction::Toggle { json },
        "on" => send(Command::SetEnabled { enabled: true }, json),
        "off" => send(Command::SetEnabled { enabled: false }, json),
        "disable" => match positional {
            [minutes] => match minutes.parse::<u64>() {
                Ok(0) | Err(_) => {
                    usage_error(command, format!("Invalid number of minutes: {minutes}"))
                }
                Ok(minutes) => send(Command::DisableFor { minutes }, json),
            },
            _ => usage_error(command, "Expected the disable length in minutes"),
        },
        "cancel" => send(Command::CancelDisableTimer, json),
        "circadian" => send(Command::ToggleEnabled, json),
        "schedule" => match positional {
            [value] => match value.parse::<ScheduleMode>() {
                Ok(schedule) => send(Command::SetSchedule { schedule }, json),
                Err(e) => usage_error(command, format!("{e}")),
            },
            _ => usage_error(command, "Expected off, solar or HH:MM-HH:MM"),
        },
        "rule" => parse_rule(positional, json),
        "websites" => match positional {
            ["on"] => send(Command::SetWebsiteControl { enabled: true }, json),
            ["off"] => send(Command::SetWebsiteControl { enabled: false }, json),
            _ => usage_error(command, "Expected on or off"),
        },
        "intensity" => {
            let preview = rest.iter().any(|arg| arg == "--preview");
            parse_intensity(positional, preview, json)
        }
        "context" => match positional {
            [app, tail @ ..] if tail.len() <= 2 => {
                let mut context = ForegroundContext::with_app(*app);
                if let [domain, subdomain @ ..] = tail {
                    context = context.on_site(*domain, subdomain.first().copied());
                }
                send(Command::SetContext { context }, json)
            }
            _ => usage_error(command, "Expected <app> [domain] [subdomain]"),
        },
        "help" => CliAction::Help {
            command: positional.first().map(|c| c.to_string()),
        },
        "version" => CliAction::ShowVersion,
        _ => CliAction::ShowHelpDueToError,
    }
}

fn parse_intensity(positional: &[&str], preview: bool, json: bool) -> CliAction {
    match positional {
        ["up"] => send(
            Command::AdjustIntensity {
                delta: INTENSITY_STEP,
            },
            json,
        ),
        ["down"] => send(
            Command::AdjustIntensity {
                delta: -INTENSITY_STEP,
            },
            json,
        ),
        [percent] => match percent.parse::<u8>() {
            Ok(percent) if percent <= 100 => send(
                Command::SetIntensity {
                    intensity: f32::from(percent) / 100.0,
                    preview,
                },
                json,
            ),
            _ => usage_error("intensity", format!("Invalid percentage: {percent}")),
        },
        _ => usage_error("intensity", "Expected 0-100, up or down"),
    }
}

fn parse_rule(positional: &[&str], json: bool) -> CliAction {
    match positional {
        ["list"] => send(Command::ListRules, json),
        [action @ ("add" | "remove"), kind, id] => {
            let rule = match *kind {
                "app" => SuppressionRule::App {
                    bundle_id: id.to_string(),
                    scope: AppScope::CurrentOnly,
                },
                "running" => SuppressionRule::App {
                    bundle_id: id.to_string(),
                    scope: AppScope::WhileRunning,
                },
                "domain" => SuppressionRule::Domain {
                    host: id.to_string(),
                },
                other => {
                    return usage_error("rule", format!("Unknown rule kind: {other}"));
                }
            };
            let command = if *action == "add" {
                Command::AddRule { rule }
            } else {
                Command::RemoveRule { rule }
            };
            send(command, json)
        }
        ["subdomain", host, disposition] => {
            let disposition = match *disposition {
                "enabled" => SubdomainDisposition::Enabled,
                "disabled" => SubdomainDisposition::Disabled,
                "none" => SubdomainDisposition::None,
                other => {
                    return usage_error("rule", format!("Unknown disposition: {other}"));
                }
            };
            send(
                Command::SetSubdomainDisposition {
                    host: host.to_string(),
                    disposition,
                },
                json,
            )
        }
        _ => usage_error("rule", "Expected list or add|remove app|running|domain <id>"),
    }
}

/// Displays version information using custom logging style.
pub fn display_version_info() {
    log_version!();
    log_pipe!();
    println!("┗ {}", env!("CARGO_PKG_DESCRIPTION"));
}

/// Displays custom help message using logger methods.
pub fn display_help() {
    log_version!();
    log_block_start!(env!("CARGO_PKG_DESCRIPTION"));
    log_block_start!("Usage:");
    log_indented!("nightshade [OPTIONS] [COMMAND]");
    log_block_start!("Options:");
    log_indented!("-c, --config <dir>     Use custom configuration directory");
    log_indented!("-d, --debug            Enable detailed debug output");
    log_indented!("-l, --log              Also write output to a log file");
    log_indented!("-h, --help             Print help information");
    log_indented!("-V, --version          Print version information");
    log_block_start!("Commands:");
    log_indented!("status [--json] [--follow]  Show the daemon's state");
    log_indented!("pause <minutes>             Pause the circadian curve (1-30 min)");
    log_indented!("resume                      End a pause early");
    log_indented!("on | off | toggle           Turn night shift on or off");
    log_indented!("disable <minutes>           Keep night shift off for a while");
    log_indented!("cancel                      Cancel the disable timer");
    log_indented!("circadian                   Toggle the circadian curve");
    log_indented!("schedule <mode>             Set schedule: off, solar, HH:MM-HH:MM");
    log_indented!("rule ...                    List or edit suppression rules");
    log_indented!("websites on|off             Apply or ignore website rules");
    log_indented!("intensity <0-100|up|down>   Set intensity by hand [--preview]");
    log_indented!("context <app> [domain] [subdomain]  Report the foreground context");
    log_indented!("help [command]              Show detailed help for a command");
    log_end!();
}
