//! Control commands - forward one command to the running daemon.

use anyhow::{Context, Result};

use super::status::{describe_rules, output_status};
use crate::core::command::Command;
use crate::state::ipc::client;

/// Send `command` and print the resulting state.
pub fn handle_send_command(command: Command, json: bool) -> Result<()> {
    let label = describe_command(&command);
    let list_rules = command == Command::ListRules;
    let response = client::send_command(command)?;

    if list_rules && !json {
        for line in describe_rules(&response.rules) {
            println!("{line}");
        }
        if !response.website_control {
            println!("Website rules are switched off");
        }
        return Ok(());
    }

    if !json {
        log_block_start!("{label}");
        if let Some(error) = &response.error {
            log_warning!("{error}");
        }
        log_end!();
    }
    output_status(&response, json)
}

/// Flip the display relative to its current state.
pub fn handle_toggle_command(json: bool) -> Result<()> {
    let current = client::send_command(Command::QueryState)
        .context("Failed to query nightshade state")?;
    handle_send_command(
        Command::SetEnabled {
            enabled: !current.enabled,
        },
        json,
    )
}

/// Short confirmation line for a command.
fn describe_command(command: &Command) -> String {
    match command {
        Command::QueryState => "Queried state".to_string(),
        Command::SetTemporaryPause { minutes } => format!("Pausing for {minutes} minutes"),
        Command::ClearTemporaryPause => "Resumed".to_string(),
        Command::ToggleEnabled => "Toggled circadian mode".to_string(),
        Command::SetEnabled { enabled: true } => "Night shift on".to_string(),
        Command::SetEnabled { enabled: false } => "Night shift off".to_string(),
        Command::DisableFor { minutes } => format!("Disabled for {minutes} minutes"),
        Command::CancelDisableTimer => "Disable timer cancelled".to_string(),
        Command::AddRule { rule } => format!("Added rule: {rule}"),
        Command::RemoveRule { rule } => format!("Removed rule: {rule}"),
        Command::SetSubdomainDisposition { host, disposition } => {
            format!("Subdomain {host} set to {disposition:?}")
        }
        Command::ListRules => "Listed rules".to_string(),
        Command::SetWebsiteControl { enabled: true } => "Website rules on".to_string(),
        Command::SetWebsiteControl { enabled: false } => "Website rules off".to_string(),
        Command::SetSchedule { schedule } => format!("Schedule set to {schedule}"),
        Command::SetCurve { curve } => format!("Bedtime set to {}", curve.bedtime),
        Command::SetIntensity {
            intensity,
            preview: true,
        } => format!("Previewing intensity {:.0}%", intensity * 100.0),
        Command::SetIntensity { intensity, .. } => {
            format!("Intensity set to {:.0}%", intensity * 100.0)
        }
        Command::AdjustIntensity { delta } if *delta >= 0.0 => "Intensity raised".to_string(),
        Command::AdjustIntensity { .. } => "Intensity lowered".to_string(),
        Command::SetContext { context } => format!(
            "Context set to {}",
            context.app.as_deref().unwrap_or("no app")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::SuppressionRule;

    #[test]
    fn test_describe_command_labels() {
        assert_eq!(
            describe_command(&Command::SetTemporaryPause { minutes: 20 }),
            "Pausing for 20 minutes"
        );
        let label = describe_command(&Command::AddRule {
            rule: SuppressionRule::Domain {
                host: "example.com".to_string(),
            },
        });
        assert!(label.contains("example.com"));
        assert_eq!(
            describe_command(&Command::SetIntensity {
                intensity: 0.4,
                preview: true
            }),
            "Previewing intensity 40%"
        );
        assert_eq!(
            describe_command(&Command::AdjustIntensity { delta: -0.1 }),
            "Intensity lowered"
        );
    }
}
