//! Enablement state machine.
//!
//! Decides whether night shift is on, reconciling the user's manual override,
//! a temporary disable timer, suppression rules and the schedule:
//!
//! - Suppression rules force the display off.
//! - A manual override or a running disable timer is stickier than the schedule.
//! - The schedule only drives the display when none of the above is in force.
//!
//! The machine owns the display-control port. Port failures never change the
//! logical state: they are logged and the state is pushed again on the next
//! schedule tick.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::backend::DisplayControl;
use crate::common::constants::{HOUR_TIMER_SECS, MAXIMUM_DISABLE_MINUTES};

/// Manual on/off choice made by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserOverride {
    On,
    Off,
    #[default]
    NotSet,
}

/// Temporary "keep night shift off until" timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisableTimer {
    #[default]
    Off,
    /// The one-hour preset.
    Hour { ends_at: DateTime<Local> },
    Custom { ends_at: DateTime<Local> },
}

impl DisableTimer {
    /// Build a timer ending `duration` after `now`, capped at
    /// [`MAXIMUM_DISABLE_MINUTES`].
    pub fn starting(now: DateTime<Local>, duration: Duration) -> Self {
        let capped = duration.min(Duration::from_secs(MAXIMUM_DISABLE_MINUTES * 60));
        let ends_at = chrono::Duration::from_std(capped)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(now);
        if duration.as_secs() == HOUR_TIMER_SECS && duration.subsec_nanos() == 0 {
            DisableTimer::Hour { ends_at }
        } else {
            DisableTimer::Custom { ends_at }
        }
    }

    pub fn ends_at(&self) -> Option<DateTime<Local>> {
        match self {
            DisableTimer::Off => None,
            DisableTimer::Hour { ends_at } | DisableTimer::Custom { ends_at } => Some(*ends_at),
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, DisableTimer::Off)
    }

    pub fn is_expired(&self, now: DateTime<Local>) -> bool {
        self.ends_at().is_some_and(|ends_at| now >= ends_at)
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftEvent {
    UserEnabled,
    UserDisabled,
    DisableTimerSet(Duration),
    /// Timer ran out or was cancelled.
    DisableTimerEnded,
    /// A suppression rule now applies to the current context.
    RuleActivated,
    /// No suppression rule applies to the current context anymore.
    RuleDeactivated,
    ScheduleTick,
    ScheduleChanged,
}

/// Everything a transition may need from the outside world.
#[derive(Debug, Clone, Copy)]
pub struct ShiftInputs {
    pub now: DateTime<Local>,
    /// The schedule's "should be on now" predicate.
    pub scheduled: bool,
}

pub struct ShiftStateMachine {
    display: Box<dyn DisplayControl>,
    user_set: UserOverride,
    disable_timer: DisableTimer,
    suppressed: bool,
    /// Whether the user acted manually since the current suppression started.
    manual_since_suppression: bool,
    enabled: bool,
    needs_resync: bool,
}

impl ShiftStateMachine {
    /// Take ownership of `display`, starting from whatever it currently shows.
    pub fn new(display: Box<dyn DisplayControl>) -> Self {
        let enabled = match display.is_enabled() {
            Ok(enabled) => enabled,
            Err(e) => {
                log_warning!("Could not read night shift state from {}: {e}", display.backend_name());
                false
            }
        };

        Self {
            display,
            user_set: UserOverride::NotSet,
            disable_timer: DisableTimer::Off,
            suppressed: false,
            manual_since_suppression: false,
            enabled,
            needs_resync: false,
        }
    }

    /// Reinstate a persisted override and timer, applying them to the display.
    pub fn restore(&mut self, user_set: UserOverride, disable_timer: DisableTimer) {
        self.user_set = user_set;
        self.disable_timer = disable_timer;

        if self.disable_timer.is_active() {
            self.apply(false);
            return;
        }
        match user_set {
            UserOverride::On => self.apply(true),
            UserOverride::Off => self.apply(false),
            UserOverride::NotSet => {}
        }
    }

    // # Accessors

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn user_override(&self) -> UserOverride {
        self.user_set
    }

    pub fn disable_timer(&self) -> DisableTimer {
        self.disable_timer
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    /// Committed intensity, if the display can report it.
    pub fn intensity(&self) -> Option<f32> {
        self.display.intensity().ok()
    }

    pub fn backend_name(&self) -> &'static str {
        self.display.backend_name()
    }

    pub fn supports_feature(&self) -> bool {
        self.display.supports_feature()
    }

    pub fn display_mut(&mut self) -> &mut dyn DisplayControl {
        self.display.as_mut()
    }

    // # Transitions

    /// Apply one event.
    pub fn handle(&mut self, event: ShiftEvent, inputs: ShiftInputs) {
        match event {
            ShiftEvent::UserEnabled => self.manual(UserOverride::On),
            ShiftEvent::UserDisabled => self.manual(UserOverride::Off),
            ShiftEvent::DisableTimerSet(duration) => {
                self.disable_timer = DisableTimer::starting(inputs.now, duration);
                self.manual_since_suppression = true;
                self.apply(false);
            }
            ShiftEvent::DisableTimerEnded => {
                if !self.disable_timer.is_active() {
                    return;
                }
                self.disable_timer = DisableTimer::Off;
                match self.user_set {
                    UserOverride::Off => {}
                    UserOverride::On => self.apply(!self.suppressed),
                    UserOverride::NotSet => self.apply(!self.suppressed && inputs.scheduled),
                }
            }
            ShiftEvent::RuleActivated => {
                self.suppressed = true;
                self.manual_since_suppression = false;
                self.apply(false);
            }
            ShiftEvent::RuleDeactivated => {
                self.suppressed = false;
                if !self.manual_since_suppression {
                    self.user_set = UserOverride::NotSet;
                }
                if self.user_set == UserOverride::NotSet && !self.disable_timer.is_active() {
                    self.apply(inputs.scheduled);
                }
            }
            ShiftEvent::ScheduleTick | ShiftEvent::ScheduleChanged => {
                if self.needs_resync {
                    let enabled = self.enabled;
                    self.apply(enabled);
                }
                if self.schedule_in_control() && inputs.scheduled != self.enabled {
                    self.apply(inputs.scheduled);
                }
            }
        }
    }

    /// Adopt an out-of-band change of the display as a manual override.
    ///
    /// While a timer or a suppression is in force the logical state stands and
    /// is pushed again on the next tick instead. Returns whether the logical
    /// state changed.
    pub fn observe_external_status(&mut self) -> bool {
        let observed = match self.display.is_enabled() {
            Ok(observed) => observed,
            Err(e) => {
                log_warning!("Could not read night shift state: {e}");
                return false;
            }
        };
        if observed == self.enabled {
            return false;
        }

        if self.disable_timer.is_active() || self.suppressed {
            self.needs_resync = true;
            return false;
        }

        self.user_set = if observed {
            UserOverride::On
        } else {
            UserOverride::Off
        };
        self.enabled = observed;
        self.needs_resync = false;
        true
    }

    /// Set committed intensity. A no-op returning `false` while disabled.
    pub fn set_intensity(&mut self, intensity: f32) -> bool {
        if !self.enabled {
            return false;
        }
        if let Err(e) = self.display.set_intensity(intensity) {
            log_warning!("Failed to set intensity on {}: {e}", self.display.backend_name());
        }
        true
    }

    /// Preview intensity without committing it. A no-op returning `false`
    /// while disabled.
    pub fn preview_intensity(&mut self, intensity: f32) -> bool {
        if !self.enabled {
            return false;
        }
        if let Err(e) = self.display.preview_intensity(intensity) {
            log_warning!("Failed to preview intensity on {}: {e}", self.display.backend_name());
        }
        true
    }

    fn schedule_in_control(&self) -> bool {
        self.user_set == UserOverride::NotSet && !self.disable_timer.is_active() && !self.suppressed
    }

    // A manual choice applies even while a rule suppresses, like the menu bar
    // power switch that flips the display unconditionally (`power()` in
    // StatusMenuController.swift). The suppression resumes forcing off on the
    // next rule activation.
    fn manual(&mut self, choice: UserOverride) {
        self.user_set = choice;
        self.disable_timer = DisableTimer::Off;
        self.manual_since_suppression = true;
        self.apply(choice == UserOverride::On);
    }

    fn apply(&mut self, enabled: bool) {
        self.enabled = enabled;
        match self.display.set_enabled(enabled) {
            Ok(()) => self.needs_resync = false,
            Err(e) => {
                log_warning!(
                    "Failed to turn night shift {} on {}: {e}",
                    if enabled { "on" } else { "off" },
                    self.display.backend_name()
                );
                self.needs_resync = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockDisplayControl;
    use crate::time::source::local_time;
    use mockall::Sequence;
    use mockall::predicate::eq;

    fn inputs(scheduled: bool) -> ShiftInputs {
        ShiftInputs {
            now: local_time(2024, 3, 12, 21, 0),
            scheduled,
        }
    }

    fn mock_display(initially_enabled: bool) -> MockDisplayControl {
        let mut mock = MockDisplayControl::new();
        mock.expect_is_enabled()
            .times(1)
            .returning(move || Ok(initially_enabled));
        mock.expect_backend_name().return_const("Mock");
        mock
    }

    #[test]
    fn test_manual_on_then_rule_forces_off() {
        let mut mock = mock_display(false);
        let mut seq = Sequence::new();
        mock.expect_set_enabled()
            .with(eq(true))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock.expect_set_enabled()
            .with(eq(false))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let mut machine = ShiftStateMachine::new(Box::new(mock));
        machine.handle(ShiftEvent::UserEnabled, inputs(false));
        machine.handle(ShiftEvent::RuleActivated, inputs(false));

        assert!(!machine.is_enabled());
        assert_eq!(machine.user_override(), UserOverride::On);
    }

    #[test]
    fn test_rule_deactivation_reapplies_schedule() {
        let mut mock = mock_display(true);
        let mut seq = Sequence::new();
        mock.expect_set_enabled()
            .with(eq(false))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock.expect_set_enabled()
            .with(eq(true))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let mut machine = ShiftStateMachine::new(Box::new(mock));
        machine.handle(ShiftEvent::RuleActivated, inputs(true));
        machine.handle(ShiftEvent::RuleDeactivated, inputs(true));

        assert!(machine.is_enabled());
    }

    #[test]
    fn test_rule_deactivation_resets_untouched_override() {
        let mut mock = mock_display(false);
        mock.expect_set_enabled().returning(|_| Ok(()));

        let mut machine = ShiftStateMachine::new(Box::new(mock));
        machine.handle(ShiftEvent::UserEnabled, inputs(false));
        machine.handle(ShiftEvent::RuleActivated, inputs(false));
        machine.handle(ShiftEvent::RuleDeactivated, inputs(false));

        assert_eq!(machine.user_override(), UserOverride::NotSet);
        assert!(!machine.is_enabled());
    }

    #[test]
    fn test_manual_action_during_suppression_survives_deactivation() {
        let mut mock = mock_display(false);
        mock.expect_set_enabled().returning(|_| Ok(()));

        let mut machine = ShiftStateMachine::new(Box::new(mock));
        machine.handle(ShiftEvent::RuleActivated, inputs(true));
        machine.handle(ShiftEvent::UserDisabled, inputs(true));
        machine.handle(ShiftEvent::RuleDeactivated, inputs(true));

        assert_eq!(machine.user_override(), UserOverride::Off);
        assert!(!machine.is_enabled());
    }

    #[test]
    fn test_schedule_tick_ignored_under_manual_override() {
        let mut mock = mock_display(false);
        mock.expect_set_enabled()
            .with(eq(false))
            .times(1)
            .returning(|_| Ok(()));

        let mut machine = ShiftStateMachine::new(Box::new(mock));
        machine.handle(ShiftEvent::UserDisabled, inputs(true));
        machine.handle(ShiftEvent::ScheduleTick, inputs(true));

        assert!(!machine.is_enabled());
    }

    #[test]
    fn test_schedule_tick_applies_only_on_change() {
        let mut mock = mock_display(false);
        mock.expect_set_enabled()
            .with(eq(true))
            .times(1)
            .returning(|_| Ok(()));

        let mut machine = ShiftStateMachine::new(Box::new(mock));
        machine.handle(ShiftEvent::ScheduleTick, inputs(true));
        machine.handle(ShiftEvent::ScheduleTick, inputs(true));
        assert!(machine.is_enabled());
    }

    #[test]
    fn test_disable_timer_kinds() {
        let now = local_time(2024, 3, 12, 21, 0);
        assert!(matches!(
            DisableTimer::starting(now, Duration::from_secs(3600)),
            DisableTimer::Hour { .. }
        ));
        let custom = DisableTimer::starting(now, Duration::from_secs(25 * 60));
        assert!(matches!(custom, DisableTimer::Custom { .. }));
        assert_eq!(custom.ends_at(), Some(now + chrono::Duration::minutes(25)));
        assert!(!custom.is_expired(now));
        assert!(custom.is_expired(now + chrono::Duration::minutes(25)));
    }

    #[test]
    fn test_overlong_disable_timer_is_capped_not_dropped() {
        let now = local_time(2024, 3, 12, 21, 0);
        let timer = DisableTimer::starting(now, Duration::from_secs(u64::MAX));
        assert!(matches!(timer, DisableTimer::Custom { .. }));
        assert_eq!(
            timer.ends_at(),
            Some(now + chrono::Duration::minutes(MAXIMUM_DISABLE_MINUTES as i64))
        );
        assert!(!timer.is_expired(now));
    }

    #[test]
    fn test_disable_timer_blocks_schedule_until_ended() {
        let mut mock = mock_display(true);
        let mut seq = Sequence::new();
        mock.expect_set_enabled()
            .with(eq(false))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock.expect_set_enabled()
            .with(eq(true))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let mut machine = ShiftStateMachine::new(Box::new(mock));
        machine.handle(
            ShiftEvent::DisableTimerSet(Duration::from_secs(3600)),
            inputs(true),
        );
        machine.handle(ShiftEvent::ScheduleTick, inputs(true));
        assert!(!machine.is_enabled());

        machine.handle(ShiftEvent::DisableTimerEnded, inputs(true));
        assert!(machine.is_enabled());
        assert_eq!(machine.disable_timer(), DisableTimer::Off);
    }

    #[test]
    fn test_timer_end_keeps_manual_off() {
        let mut mock = mock_display(false);
        mock.expect_set_enabled()
            .with(eq(false))
            .times(2)
            .returning(|_| Ok(()));

        let mut machine = ShiftStateMachine::new(Box::new(mock));
        machine.handle(ShiftEvent::UserDisabled, inputs(true));
        machine.handle(
            ShiftEvent::DisableTimerSet(Duration::from_secs(600)),
            inputs(true),
        );
        machine.handle(ShiftEvent::DisableTimerEnded, inputs(true));
        assert!(!machine.is_enabled());
    }

    #[test]
    fn test_port_failure_keeps_logical_state_and_retries() {
        let mut mock = mock_display(false);
        let mut seq = Sequence::new();
        mock.expect_set_enabled()
            .with(eq(true))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(anyhow::anyhow!("driver unavailable")));
        mock.expect_set_enabled()
            .with(eq(true))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let mut machine = ShiftStateMachine::new(Box::new(mock));
        machine.handle(ShiftEvent::UserEnabled, inputs(false));
        assert!(machine.is_enabled());

        machine.handle(ShiftEvent::ScheduleTick, inputs(false));
        assert!(machine.is_enabled());
    }

    #[test]
    fn test_intensity_rejected_while_disabled() {
        let mut mock = mock_display(false);
        mock.expect_set_intensity().never();
        mock.expect_preview_intensity().never();

        let mut machine = ShiftStateMachine::new(Box::new(mock));
        assert!(!machine.set_intensity(0.5));
        assert!(!machine.preview_intensity(0.5));
    }

    #[test]
    fn test_intensity_forwarded_while_enabled() {
        let mut mock = mock_display(true);
        mock.expect_set_intensity()
            .with(eq(0.25_f32))
            .times(1)
            .returning(|_| Ok(()));

        let mut machine = ShiftStateMachine::new(Box::new(mock));
        assert!(machine.set_intensity(0.25));
    }

    #[test]
    fn test_external_change_becomes_manual_override() {
        let mut mock = MockDisplayControl::new();
        let mut seq = Sequence::new();
        mock.expect_is_enabled()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(false));
        mock.expect_is_enabled()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(true));

        let mut machine = ShiftStateMachine::new(Box::new(mock));
        assert!(machine.observe_external_status());
        assert!(machine.is_enabled());
        assert_eq!(machine.user_override(), UserOverride::On);
    }

    #[test]
    fn test_external_change_ignored_while_suppressed() {
        let mut mock = MockDisplayControl::new();
        let mut seq = Sequence::new();
        mock.expect_is_enabled()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(false));
        mock.expect_set_enabled()
            .with(eq(false))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock.expect_is_enabled()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(true));
        mock.expect_set_enabled()
            .with(eq(false))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let mut machine = ShiftStateMachine::new(Box::new(mock));
        machine.handle(ShiftEvent::RuleActivated, inputs(true));
        assert!(!machine.observe_external_status());
        assert_eq!(machine.user_override(), UserOverride::NotSet);

        // Next tick pushes the logical state again
        machine.handle(ShiftEvent::ScheduleTick, inputs(true));
        assert!(!machine.is_enabled());
    }

    #[test]
    fn test_restore_applies_persisted_timer() {
        let mut mock = mock_display(true);
        mock.expect_set_enabled()
            .with(eq(false))
            .times(1)
            .returning(|_| Ok(()));

        let mut machine = ShiftStateMachine::new(Box::new(mock));
        let timer = DisableTimer::starting(local_time(2024, 3, 12, 21, 0), Duration::from_secs(900));
        machine.restore(UserOverride::On, timer);
        assert!(!machine.is_enabled());
        assert_eq!(machine.disable_timer(), timer);
    }
}
