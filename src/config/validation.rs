//! Configuration validation functionality.
//!
//! Hard errors for values nightshade cannot work with; warnings for values
//! that work but are probably not what the user meant.

use anyhow::{Context, Result};

use super::Config;
use crate::common::constants::*;
use crate::core::curve::CircadianCurveConfig;
use crate::core::schedule::{ScheduleMode, TimeOfDay};

/// Reject impossible configurations.
pub fn validate_config(config: &Config) -> Result<()> {
    if let Some(schedule) = config.schedule.as_deref() {
        schedule
            .parse::<ScheduleMode>()
            .with_context(|| format!("Invalid schedule \"{schedule}\""))?;
    }

    if let Some(bedtime) = config.bedtime.as_deref() {
        bedtime
            .parse::<TimeOfDay>()
            .with_context(|| format!("Invalid bedtime \"{bedtime}\". Use HH:MM format"))?;
    }

    validate_curve(&config.curve_config())?;

    if let Some(interval) = config.update_interval
        && !(MINIMUM_UPDATE_INTERVAL..=MAXIMUM_UPDATE_INTERVAL).contains(&interval)
    {
        anyhow::bail!(
            "update_interval ({} seconds) must be between {} and {} seconds",
            interval,
            MINIMUM_UPDATE_INTERVAL,
            MAXIMUM_UPDATE_INTERVAL
        );
    }

    if let Some(lat) = config.latitude
        && !(-90.0..=90.0).contains(&lat)
    {
        anyhow::bail!("latitude must be between -90 and 90 degrees (got {})", lat);
    }
    if let Some(lon) = config.longitude
        && !(-180.0..=180.0).contains(&lon)
    {
        anyhow::bail!(
            "longitude must be between -180 and 180 degrees (got {})",
            lon
        );
    }
    if config.latitude.is_some() != config.longitude.is_some() {
        anyhow::bail!("latitude and longitude must be set together");
    }

    if let Some(apps) = &config.media_apps
        && apps.iter().any(|app| app.trim().is_empty())
    {
        anyhow::bail!("media_apps must not contain empty entries");
    }

    warn_about_curve_shape(config);

    Ok(())
}

/// Reject a curve nightshade cannot evaluate sensibly.
///
/// Applies to the curve built from the config file as well as curves that
/// arrive over IPC or from the state store.
pub fn validate_curve(curve: &CircadianCurveConfig) -> Result<()> {
    if TimeOfDay::new(curve.bedtime.hour, curve.bedtime.minute).is_none() {
        anyhow::bail!("bedtime {} is not a valid time of day", curve.bedtime);
    }

    for (name, temp) in [
        ("daylight_temp", curve.daylight_kelvin),
        ("evening_temp", curve.evening_kelvin),
        ("deep_night_temp", curve.deep_night_kelvin),
    ] {
        if !(MINIMUM_TEMP..=MAXIMUM_TEMP).contains(&temp) {
            anyhow::bail!(
                "{} ({}) must be between {} and {} Kelvin",
                name,
                temp,
                MINIMUM_TEMP,
                MAXIMUM_TEMP
            );
        }
    }

    let evening_lead = curve.evening_lead.as_secs() / 60;
    let deep_night_lead = curve.deep_night_lead.as_secs() / 60;

    if evening_lead > MAXIMUM_LEAD_MINUTES {
        anyhow::bail!(
            "evening_lead_minutes ({}) must be at most {} minutes",
            evening_lead,
            MAXIMUM_LEAD_MINUTES
        );
    }
    if curve.deep_night_lead > curve.evening_lead {
        anyhow::bail!(
            "deep_night_lead_minutes ({}) must not exceed evening_lead_minutes ({})",
            deep_night_lead,
            evening_lead
        );
    }
    Ok(())
}

/// A curve that warms up toward bedtime is allowed but unusual.
fn warn_about_curve_shape(config: &Config) {
    let daylight = config.daylight_temp.unwrap_or(DEFAULT_DAYLIGHT_TEMP);
    let evening = config.evening_temp.unwrap_or(DEFAULT_EVENING_TEMP);
    let deep_night = config.deep_night_temp.unwrap_or(DEFAULT_DEEP_NIGHT_TEMP);

    if daylight < evening || evening < deep_night {
        log_pipe!();
        log_warning!(
            "Curve temperatures increase toward bedtime ({}K → {}K → {}K)",
            daylight,
            evening,
            deep_night
        );
        log_indented!("Usually daylight_temp >= evening_temp >= deep_night_temp");
    }
}
