//! Commands accepted by the coordinator from the CLI bridge and signal handlers.

use serde::{Deserialize, Serialize};

use crate::core::curve::CircadianCurveConfig;
use crate::core::schedule::ScheduleMode;
use crate::io::context::ForegroundContext;
use crate::rules::{SubdomainDisposition, SuppressionRule};

/// One request to the running coordinator. Every command is answered with a
/// fresh [`CommandResponse`](crate::state::automation::CommandResponse).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    QueryState,
    /// Suspend the circadian curve for a number of minutes (clamped to 1..=30).
    SetTemporaryPause { minutes: i64 },
    ClearTemporaryPause,
    /// Flip circadian mode on or off.
    ToggleEnabled,
    /// Manual on/off.
    SetEnabled { enabled: bool },
    /// Keep night shift off for a number of minutes.
    DisableFor { minutes: u64 },
    CancelDisableTimer,
    AddRule { rule: SuppressionRule },
    RemoveRule { rule: SuppressionRule },
    SetSubdomainDisposition {
        host: String,
        disposition: SubdomainDisposition,
    },
    /// List every stored suppression rule in the response.
    ListRules,
    /// Apply or ignore domain and subdomain rules as a whole.
    SetWebsiteControl { enabled: bool },
    SetSchedule { schedule: ScheduleMode },
    /// Replace the circadian curve shape.
    SetCurve { curve: CircadianCurveConfig },
    /// Set intensity by hand (`0.0..=1.0`). A preview is shown but not stored.
    SetIntensity { intensity: f32, preview: bool },
    /// Move the committed intensity by `delta`, clamped to `0.0..=1.0`.
    AdjustIntensity { delta: f32 },
    /// Replace the foreground context (fed by compositor hook scripts).
    SetContext { context: ForegroundContext },
}

impl Command {
    /// Commands that only read state.
    pub fn is_query(&self) -> bool {
        matches!(self, Command::QueryState | Command::ListRules)
    }
}
