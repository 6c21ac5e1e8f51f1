//! Defaults and validation limits shared by the config layer and the core.

use crate::config::Backend;

// # Application

pub const EXIT_FAILURE: i32 = 1;

/// How long a client waits for the daemon to answer a command.
pub const COMMAND_TIMEOUT_SECS: u64 = 5;

// # Backend

pub const DEFAULT_BACKEND: Backend = Backend::Auto;

// # Evaluation loop

pub const DEFAULT_UPDATE_INTERVAL: u64 = 60; // seconds
pub const MINIMUM_UPDATE_INTERVAL: u64 = 10; // seconds
pub const MAXIMUM_UPDATE_INTERVAL: u64 = 300; // seconds

// # Schedule

pub const DEFAULT_SCHEDULE: &str = "off";

// # Circadian curve

pub const DEFAULT_CIRCADIAN_ENABLED: bool = false;
pub const DEFAULT_BEDTIME: &str = "23:00";
pub const DEFAULT_DAYLIGHT_TEMP: u32 = 6500;
pub const DEFAULT_EVENING_TEMP: u32 = 4500;
pub const DEFAULT_DEEP_NIGHT_TEMP: u32 = 3200;
pub const DEFAULT_EVENING_LEAD_MINUTES: u64 = 120;
pub const DEFAULT_DEEP_NIGHT_LEAD_MINUTES: u64 = 45;

pub const MINIMUM_TEMP: u32 = 1000;
pub const MAXIMUM_TEMP: u32 = 20000;
pub const MAXIMUM_LEAD_MINUTES: u64 = 12 * 60;

// # Overrides

pub const MINIMUM_PAUSE_MINUTES: i64 = 1;
pub const MAXIMUM_PAUSE_MINUTES: i64 = 30;

/// A disable timer of exactly this length is reported as the "hour" timer.
pub const HOUR_TIMER_SECS: u64 = 3600;
/// Longer disable requests are shortened to a week.
pub const MAXIMUM_DISABLE_MINUTES: u64 = 7 * 24 * 60;

// # Rules

/// Domain and subdomain rules apply unless switched off.
pub const DEFAULT_WEBSITE_CONTROL: bool = true;

// # Intensity

/// Step used by `intensity up` and `intensity down`.
pub const INTENSITY_STEP: f32 = 0.1;

/// Foreground applications that suspend automation while focused.
pub const DEFAULT_MEDIA_APPS: &[&str] = &[
    "org.videolan.vlc",
    "io.mpv.Mpv",
    "com.colliderli.iina",
    "com.apple.TV",
    "com.apple.QuickTimePlayerX",
    "tv.plex.desktop",
    "com.netflix.Netflix",
];
