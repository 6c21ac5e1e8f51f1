//! Main application entry point.
//!
//! Parses the command line and hands off either to the daemon runner or to
//! one of the IPC client commands.

use anyhow::Result;

use nightshade::Nightshade;
use nightshade::args::{self, CliAction, ParsedArgs};
use nightshade::commands;
use nightshade::common::constants::EXIT_FAILURE;
use nightshade::config;
use nightshade::{log_end, log_error};

fn main() -> Result<()> {
    let parsed_args = ParsedArgs::from_env();

    match parsed_args.action {
        CliAction::ShowVersion => {
            args::display_version_info();
            Ok(())
        }
        CliAction::ShowHelp => {
            args::display_help();
            Ok(())
        }
        CliAction::ShowHelpDueToError => {
            args::display_help();
            std::process::exit(EXIT_FAILURE);
        }
        CliAction::UsageError { command, message } => {
            log_error!("{}", message);
            commands::help::show_command_usage(&command);
            log_end!();
            std::process::exit(EXIT_FAILURE);
        }
        CliAction::Help { command } => commands::help::run_help_command(command.as_deref()),
        CliAction::Run {
            debug_enabled,
            config_dir,
            log_to_file,
        } => {
            config::set_config_dir(config_dir)?;
            Nightshade::new(debug_enabled)
                .with_log_file(log_to_file)
                .run()
        }
        CliAction::Status { json, follow } => {
            commands::status::handle_status_command(json, follow)
        }
        CliAction::Toggle { json } => commands::control::handle_toggle_command(json),
        CliAction::Send { command, json } => {
            commands::control::handle_send_command(command, json)
        }
    }
}
