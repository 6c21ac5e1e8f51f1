//! Configuration system for nightshade.
//!
//! Settings live in `nightshade.toml` under `$XDG_CONFIG_HOME/nightshade/`
//! (or the directory passed with `--config`). A commented default file is
//! written on first start.
//!
//! ```toml
//! #[Backend]
//! backend = "auto"              # Display backend: "auto" or "virtual"
//!
//! #[Schedule]
//! schedule = "off"              # "off", "solar" or "HH:MM-HH:MM"
//! update_interval = 60          # Evaluation interval in seconds (10-300)
//!
//! #[Circadian curve]
//! circadian_enabled = false     # Follow the bedtime curve instead of the schedule
//! bedtime = "23:00"             # Target bedtime (HH:MM)
//! daylight_temp = 6500          # Kelvin before the evening phase (1000-20000)
//! evening_temp = 4500           # Kelvin at the start of deep night (1000-20000)
//! deep_night_temp = 3200        # Kelvin at bedtime (1000-20000)
//! evening_lead_minutes = 120    # Evening phase begins this long before bedtime
//! deep_night_lead_minutes = 45  # Deep night begins this long before bedtime
//!
//! #[Media]
//! media_apps = ["org.videolan.vlc"]  # Foreground apps that suspend automation
//!
//! #[Solar schedule]
//! latitude = 52.52
//! longitude = 13.405
//! ```
//!
//! Values stored by the daemon at runtime (schedule, curve, circadian flag)
//! take precedence over this file; the file supplies first-run defaults.

pub mod builder;
pub mod loading;
pub mod validation;

use serde::Deserialize;
use std::time::Duration;

use crate::common::constants::*;
use crate::core::curve::CircadianCurveConfig;
use crate::core::schedule::{ScheduleMode, TimeOfDay};
use crate::geo::{SolarTimeProvider, SunriseProvider};

// Re-export public API
pub use builder::create_default_config;
pub use loading::{get_config_path, get_custom_config_dir, load, load_from_path, set_config_dir};

/// Backend selection for display control.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Use the platform driver when one exists, otherwise the virtual display.
    Auto,
    /// In-process display that only records state.
    Virtual,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Auto => "auto",
            Backend::Virtual => "virtual",
        }
    }
}

/// Settings loaded from `nightshade.toml`.
///
/// Every field is optional; [`loading::load_from_path`] fills in defaults
/// from [`crate::common::constants`] after validation.
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct Config {
    pub backend: Option<Backend>,
    pub schedule: Option<String>, // "off", "solar" or "HH:MM-HH:MM"
    pub circadian_enabled: Option<bool>,
    pub bedtime: Option<String>, // HH:MM
    pub daylight_temp: Option<u32>,
    pub evening_temp: Option<u32>,
    pub deep_night_temp: Option<u32>,
    pub evening_lead_minutes: Option<u64>,
    pub deep_night_lead_minutes: Option<u64>,
    pub update_interval: Option<u64>, // seconds
    pub media_apps: Option<Vec<String>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Config {
    pub fn backend(&self) -> Backend {
        self.backend.unwrap_or(DEFAULT_BACKEND)
    }

    /// Schedule mode; an unparseable value falls back to `Off`.
    ///
    /// Loading validates the string, so the fallback only applies to configs
    /// built by hand.
    pub fn schedule_mode(&self) -> ScheduleMode {
        self.schedule
            .as_deref()
            .unwrap_or(DEFAULT_SCHEDULE)
            .parse()
            .unwrap_or(ScheduleMode::Off)
    }

    pub fn circadian_enabled(&self) -> bool {
        self.circadian_enabled.unwrap_or(DEFAULT_CIRCADIAN_ENABLED)
    }

    pub fn curve_config(&self) -> CircadianCurveConfig {
        let defaults = CircadianCurveConfig::default();
        CircadianCurveConfig {
            bedtime: self
                .bedtime
                .as_deref()
                .and_then(|value| value.parse::<TimeOfDay>().ok())
                .unwrap_or(defaults.bedtime),
            daylight_kelvin: self.daylight_temp.unwrap_or(defaults.daylight_kelvin),
            evening_kelvin: self.evening_temp.unwrap_or(defaults.evening_kelvin),
            deep_night_kelvin: self.deep_night_temp.unwrap_or(defaults.deep_night_kelvin),
            evening_lead: self
                .evening_lead_minutes
                .map_or(defaults.evening_lead, |m| {
                    Duration::from_secs(m.saturating_mul(60))
                }),
            deep_night_lead: self
                .deep_night_lead_minutes
                .map_or(defaults.deep_night_lead, |m| {
                    Duration::from_secs(m.saturating_mul(60))
                }),
        }
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval.unwrap_or(DEFAULT_UPDATE_INTERVAL))
    }

    pub fn media_apps(&self) -> Vec<String> {
        match &self.media_apps {
            Some(apps) => apps.clone(),
            None => DEFAULT_MEDIA_APPS.iter().map(|app| app.to_string()).collect(),
        }
    }

    /// Solar time provider for the configured coordinates, if any.
    pub fn solar_provider(&self) -> Option<Box<dyn SolarTimeProvider>> {
        let (lat, lon) = (self.latitude?, self.longitude?);
        SunriseProvider::new(lat, lon).map(|p| Box::new(p) as Box<dyn SolarTimeProvider>)
    }

    pub fn log_config(&self) {
        log_block_start!("Loaded configuration");
        log_indented!("Backend: {}", self.backend().as_str());
        log_indented!("Schedule: {}", self.schedule_mode());

        if let (Some(lat), Some(lon)) = (self.latitude, self.longitude) {
            let lat_dir = if lat >= 0.0 { "N" } else { "S" };
            let lon_dir = if lon >= 0.0 { "E" } else { "W" };
            log_indented!(
                "Location: {:.3}°{}, {:.3}°{}",
                lat.abs(),
                lat_dir,
                lon.abs(),
                lon_dir
            );
        } else if self.schedule_mode() == ScheduleMode::Solar {
            log_warning!("Solar schedule without coordinates never activates");
        }

        let curve = self.curve_config();
        log_indented!(
            "Circadian: {} (bedtime {})",
            if self.circadian_enabled() { "enabled" } else { "disabled" },
            curve.bedtime
        );
        log_indented!(
            "Curve: {}K → {}K → {}K",
            curve.daylight_kelvin,
            curve.evening_kelvin,
            curve.deep_night_kelvin
        );
        log_indented!(
            "Leads: evening {} min, deep night {} min",
            curve.evening_lead.as_secs() / 60,
            curve.deep_night_lead.as_secs() / 60
        );
        log_indented!(
            "Update interval: {} seconds",
            self.update_interval().as_secs()
        );
        log_indented!("Media apps: {}", self.media_apps().len());
    }
}
