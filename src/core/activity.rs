//! Activity-based suspension of automation.
//!
//! Two things suspend the circadian curve without touching rules or the
//! manual override: a media player in the foreground, and an explicit
//! temporary pause requested by the user. The tracker keeps one snapshot of
//! the outcome and tells its listeners whenever that snapshot changes.
//!
//! The tracker owns no timer thread. Pause expiry is noticed by `evaluate`,
//! and the coordinator wakes at [`ActivityOverrideTracker::next_deadline`]
//! so expiry is handled on time.

use chrono::{DateTime, Duration, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::common::constants::{MAXIMUM_PAUSE_MINUTES, MINIMUM_PAUSE_MINUTES};

/// Why automation is suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspendReason {
    MediaPlayback,
    UserPause,
}

/// Current override outcome, replaced as a whole on every evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActivityOverrideSnapshot {
    pub is_suspended: bool,
    pub reason: Option<SuspendReason>,
    pub until: Option<DateTime<Local>>,
}

impl ActivityOverrideSnapshot {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn media_playback() -> Self {
        Self {
            is_suspended: true,
            reason: Some(SuspendReason::MediaPlayback),
            until: None,
        }
    }

    pub fn user_pause(until: DateTime<Local>) -> Self {
        Self {
            is_suspended: true,
            reason: Some(SuspendReason::UserPause),
            until: Some(until),
        }
    }
}

pub type OverrideListener = Box<dyn FnMut(&ActivityOverrideSnapshot) + Send>;

/// Clamp a requested pause length into the allowed range.
pub fn clamp_pause_minutes(minutes: i64) -> i64 {
    minutes.clamp(MINIMUM_PAUSE_MINUTES, MAXIMUM_PAUSE_MINUTES)
}

/// Detects media playback and user pauses.
pub struct ActivityOverrideTracker {
    media_apps: BTreeSet<String>,
    pause_until: Option<DateTime<Local>>,
    snapshot: ActivityOverrideSnapshot,
    listeners: Vec<OverrideListener>,
    observing: bool,
}

impl ActivityOverrideTracker {
    pub fn new<I, S>(media_apps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            media_apps: media_apps.into_iter().map(Into::into).collect(),
            pause_until: None,
            snapshot: ActivityOverrideSnapshot::none(),
            listeners: Vec::new(),
            observing: false,
        }
    }

    pub fn subscribe(&mut self, listener: OverrideListener) {
        self.listeners.push(listener);
    }

    pub fn snapshot(&self) -> ActivityOverrideSnapshot {
        self.snapshot
    }

    /// Begin observing and evaluate right away. Returns whether the snapshot
    /// changed.
    pub fn start(&mut self, now: DateTime<Local>, foreground_app: Option<&str>) -> bool {
        self.observing = true;
        self.evaluate(now, foreground_app)
    }

    /// Recompute the snapshot. An unexpired pause beats media detection.
    pub fn evaluate(&mut self, now: DateTime<Local>, foreground_app: Option<&str>) -> bool {
        if !self.observing {
            return false;
        }

        if let Some(until) = self.pause_until
            && now >= until
        {
            self.pause_until = None;
        }

        let next = match self.pause_until {
            Some(until) => ActivityOverrideSnapshot::user_pause(until),
            None if foreground_app.is_some_and(|app| self.media_apps.contains(app)) => {
                ActivityOverrideSnapshot::media_playback()
            }
            None => ActivityOverrideSnapshot::none(),
        };

        self.replace_snapshot(next)
    }

    /// Pause automation for `minutes` (clamped to 1..=30), replacing any
    /// running pause.
    pub fn set_temporary_pause(
        &mut self,
        minutes: i64,
        now: DateTime<Local>,
        foreground_app: Option<&str>,
    ) -> bool {
        let minutes = clamp_pause_minutes(minutes);
        self.pause_until = Some(now + Duration::minutes(minutes));
        self.evaluate(now, foreground_app)
    }

    pub fn clear_temporary_pause(
        &mut self,
        now: DateTime<Local>,
        foreground_app: Option<&str>,
    ) -> bool {
        self.pause_until = None;
        self.evaluate(now, foreground_app)
    }

    /// When the tracker next needs to be evaluated without outside input.
    pub fn next_deadline(&self) -> Option<DateTime<Local>> {
        if self.observing { self.pause_until } else { None }
    }

    /// Stop observing and reset to `none` without notifying listeners.
    pub fn stop(&mut self) {
        self.observing = false;
        self.pause_until = None;
        self.snapshot = ActivityOverrideSnapshot::none();
    }

    fn replace_snapshot(&mut self, next: ActivityOverrideSnapshot) -> bool {
        if next == self.snapshot {
            return false;
        }
        self.snapshot = next;
        for listener in &mut self.listeners {
            listener(&self.snapshot);
        }
        true
    }
}
