//! Wire types for the IPC sockets.
//!
//! The events socket broadcasts [`AutomationEvent`]s, one JSON object per
//! line. The command socket takes one [`IpcRequest`] line and answers with one
//! [`IpcResponse`] line.

use serde::{Deserialize, Serialize};

use crate::core::activity::ActivityOverrideSnapshot;
use crate::core::command::Command;
use crate::core::shift::{DisableTimer, UserOverride};
use crate::state::automation::{AutomationState, CommandResponse};

/// Everything the coordinator broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AutomationEvent {
    /// A new `{phase, kelvin, suspended}` triple was published.
    StatePublished {
        #[serde(flatten)]
        state: AutomationState,
    },

    /// The curve crossed from evening (or daylight) into deep night.
    EnteredDeepNight,

    /// Media playback or a user pause started or ended.
    OverrideChanged { snapshot: ActivityOverrideSnapshot },

    /// Night shift was switched on or off.
    EnablementChanged {
        enabled: bool,
        user_override: UserOverride,
        disable_timer: DisableTimer,
    },
}

impl AutomationEvent {
    pub fn state_published(state: AutomationState) -> Self {
        AutomationEvent::StatePublished { state }
    }
}

/// A command line on the command socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpcRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(flatten)]
    pub command: Command,
}

/// The answer to one [`IpcRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpcResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Set when the request could not be delivered or answered at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<CommandResponse>,
}

impl IpcResponse {
    pub fn answered(request_id: Option<String>, state: CommandResponse) -> Self {
        Self {
            request_id,
            failure: None,
            state: Some(state),
        }
    }

    pub fn failed(request_id: Option<String>, failure: impl Into<String>) -> Self {
        Self {
            request_id,
            failure: Some(failure.into()),
            state: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::curve::Phase;

    #[test]
    fn test_state_published_is_flat() {
        let event = AutomationEvent::state_published(AutomationState {
            phase: Phase::Evening,
            kelvin_target: 5700,
            is_suspended: false,
        });
        let json = serde_json::to_string(&event).unwrap();

        assert!(json.contains("\"event_type\":\"state_published\""));
        assert!(json.contains("\"phase\":\"evening\""));
        assert!(json.contains("\"kelvin_target\":5700"));

        let back: AutomationEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_entered_deep_night_serialization() {
        let json = serde_json::to_string(&AutomationEvent::EnteredDeepNight).unwrap();
        assert_eq!(json, r#"{"event_type":"entered_deep_night"}"#);
    }

    #[test]
    fn test_request_flattens_command() {
        let request: IpcRequest =
            serde_json::from_str(r#"{"request_id":"7","command":"set_temporary_pause","minutes":45}"#)
                .unwrap();
        assert_eq!(request.request_id.as_deref(), Some("7"));
        assert_eq!(request.command, Command::SetTemporaryPause { minutes: 45 });

        let bare: IpcRequest = serde_json::from_str(r#"{"command":"query_state"}"#).unwrap();
        assert_eq!(bare.request_id, None);
    }

    #[test]
    fn test_failed_response_omits_state() {
        let json = serde_json::to_string(&IpcResponse::failed(Some("1".into()), "timed out")).unwrap();
        assert_eq!(json, r#"{"request_id":"1","failure":"timed out"}"#);
    }
}
