//! Default configuration file creation.
//!
//! The default file is rendered through [`ConfigBuilder`] so settings and
//! their trailing comments line up in one column.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::common::constants::*;
use crate::common::utils::private_path;

/// Write a commented default `nightshade.toml` at `path`.
pub fn create_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    fs::write(path, default_config_content())
        .with_context(|| format!("Failed to write default config to {}", private_path(path)))?;

    log_block_start!("Created default configuration");
    log_indented!("{}", private_path(path));
    Ok(())
}

/// Render the default configuration text.
pub fn default_config_content() -> String {
    let media_apps = DEFAULT_MEDIA_APPS
        .iter()
        .map(|app| format!("\"{app}\""))
        .collect::<Vec<_>>()
        .join(", ");

    let mut content = ConfigBuilder::new()
        .add_section("Backend")
        .add_setting(
            "backend",
            &format!("\"{}\"", DEFAULT_BACKEND.as_str()),
            "Display backend: \"auto\" or \"virtual\"",
        )
        .add_section("Schedule")
        .add_setting(
            "schedule",
            &format!("\"{DEFAULT_SCHEDULE}\""),
            "\"off\", \"solar\" or \"HH:MM-HH:MM\"",
        )
        .add_setting(
            "update_interval",
            &DEFAULT_UPDATE_INTERVAL.to_string(),
            &format!(
                "Evaluation interval in seconds ({MINIMUM_UPDATE_INTERVAL}-{MAXIMUM_UPDATE_INTERVAL})"
            ),
        )
        .add_section("Circadian curve")
        .add_setting(
            "circadian_enabled",
            &DEFAULT_CIRCADIAN_ENABLED.to_string(),
            "Follow the bedtime curve instead of the schedule",
        )
        .add_setting(
            "bedtime",
            &format!("\"{DEFAULT_BEDTIME}\""),
            "Target bedtime (HH:MM)",
        )
        .add_setting(
            "daylight_temp",
            &DEFAULT_DAYLIGHT_TEMP.to_string(),
            &format!("Kelvin before the evening phase ({MINIMUM_TEMP}-{MAXIMUM_TEMP})"),
        )
        .add_setting(
            "evening_temp",
            &DEFAULT_EVENING_TEMP.to_string(),
            &format!("Kelvin when deep night begins ({MINIMUM_TEMP}-{MAXIMUM_TEMP})"),
        )
        .add_setting(
            "deep_night_temp",
            &DEFAULT_DEEP_NIGHT_TEMP.to_string(),
            &format!("Kelvin at bedtime ({MINIMUM_TEMP}-{MAXIMUM_TEMP})"),
        )
        .add_setting(
            "evening_lead_minutes",
            &DEFAULT_EVENING_LEAD_MINUTES.to_string(),
            "Evening phase starts this long before bedtime",
        )
        .add_setting(
            "deep_night_lead_minutes",
            &DEFAULT_DEEP_NIGHT_LEAD_MINUTES.to_string(),
            "Deep night starts this long before bedtime",
        )
        .add_section("Media")
        .add_setting(
            "media_apps",
            &format!("[{media_apps}]"),
            "Foreground apps that suspend automation",
        )
        .build();

    content.push_str(
        "\n\n#[Solar schedule]\n\
         # latitude = 52.520008\n\
         # longitude = 13.404954\n",
    );
    content
}

struct ConfigEntry {
    content: String,
    entry_type: EntryType,
}

enum EntryType {
    Section,
    Setting { line: String, comment: String },
}

/// Builder that aligns the trailing comments of all settings.
struct ConfigBuilder {
    entries: Vec<ConfigEntry>,
}

impl ConfigBuilder {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn add_section(mut self, title: &str) -> Self {
        self.entries.push(ConfigEntry {
            content: format!("#[{title}]"),
            entry_type: EntryType::Section,
        });
        self
    }

    fn add_setting(mut self, key: &str, value: &str, comment: &str) -> Self {
        let line = format!("{key} = {value}");
        self.entries.push(ConfigEntry {
            content: line.clone(),
            entry_type: EntryType::Setting {
                line,
                comment: format!("# {comment}"),
            },
        });
        self
    }

    fn build(self) -> String {
        // Long lines (the media list) would push every comment far right,
        // so alignment only considers lines up to 40 columns
        let max_width = self
            .entries
            .iter()
            .filter_map(|entry| match &entry.entry_type {
                EntryType::Setting { line, .. } if line.len() <= 40 => Some(line.len()),
                _ => None,
            })
            .max()
            .unwrap_or(0)
            + 1;

        let mut result = Vec::new();
        let mut first_section = true;

        for entry in self.entries {
            match entry.entry_type {
                EntryType::Section => {
                    if !first_section {
                        result.push(String::new());
                    }
                    result.push(entry.content);
                    first_section = false;
                }
                EntryType::Setting { line, comment } => {
                    let padding = " ".repeat(max_width.saturating_sub(line.len()).max(1));
                    result.push(format!("{line}{padding}{comment}"));
                }
            }
        }

        result.join("\n")
    }
}
