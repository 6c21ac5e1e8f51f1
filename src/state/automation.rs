//! Published automation state and the payload answered to commands.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::core::activity::SuspendReason;
use crate::core::curve::Phase;
use crate::core::schedule::ScheduleMode;
use crate::core::shift::{DisableTimer, UserOverride};
use crate::rules::SuppressionRule;

/// What the coordinator publishes after each circadian evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationState {
    pub phase: Phase,
    pub kelvin_target: u32,
    pub is_suspended: bool,
}

/// Full state snapshot returned for every command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub enabled: bool,
    pub circadian_enabled: bool,
    pub phase: Phase,
    pub kelvin: u32,
    pub is_suspended: bool,
    pub suspend_reason: Option<SuspendReason>,
    pub suspended_until: Option<DateTime<Local>>,
    pub user_override: UserOverride,
    pub disable_timer: DisableTimer,
    /// A suppression rule applies to the current foreground context.
    pub suppressed: bool,
    /// Domain and subdomain rules are applied.
    pub website_control: bool,
    /// Committed display intensity, when the backend can report it.
    pub intensity: Option<f32>,
    pub schedule: ScheduleMode,
    pub backend: String,
    /// Stored rules; only filled in for `list_rules`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<SuppressionRule>,
    /// Set when the command itself failed; the state fields are still current.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResponse {
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}
