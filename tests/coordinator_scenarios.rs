//! End-to-end scenarios for the coordinator thread, driven through its
//! mailbox with a manual clock, an in-memory store and the virtual display.

use chrono::Duration;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use nightshade::backend::virtual_display::{DisplayCall, VirtualDisplay, VirtualDisplayHandle};
use nightshade::core::activity::SuspendReason;
use nightshade::core::command::Command;
use nightshade::core::curve::{CircadianCurveConfig, Phase, intensity_for_kelvin};
use nightshade::core::schedule::{ScheduleMode, TimeOfDay};
use nightshade::core::shift::{DisableTimer, UserOverride};
use nightshade::core::{Coordinator, CoordinatorHandle, CoordinatorParams};
use nightshade::io::context::{ForegroundContext, SharedContext};
use nightshade::rules::{AppScope, SubdomainDisposition, SuppressionRule};
use nightshade::state::{Preferences, keys};
use nightshade::state::ipc::events::AutomationEvent;
use nightshade::time::source::{ManualTimeSource, TimeSource, local_time};

const VLC: &str = "org.videolan.vlc";

struct Harness {
    clock: Arc<ManualTimeSource>,
    display: VirtualDisplayHandle,
    prefs: Preferences,
    events: Arc<Mutex<Vec<AutomationEvent>>>,
    handle: CoordinatorHandle,
}

impl Harness {
    /// Start at `hour:minute` on a winter day, with a 21:00-07:00 schedule
    /// and the circadian curve on (bedtime 23:00).
    fn start(hour: u32, minute: u32) -> Self {
        Self::start_with(hour, minute, Preferences::in_memory())
    }

    fn start_with(hour: u32, minute: u32, prefs: Preferences) -> Self {
        let clock = Arc::new(ManualTimeSource::new(local_time(2025, 1, 15, hour, minute)));
        let display = VirtualDisplay::new();
        let display_handle = display.handle();
        let events = Arc::new(Mutex::new(Vec::new()));

        let mut coordinator = Coordinator::new(CoordinatorParams {
            prefs: prefs.clone(),
            display: Box::new(display),
            context: Arc::new(SharedContext::new(ForegroundContext::default())),
            solar: None,
            time_source: clock.clone(),
            curve: CircadianCurveConfig::default(),
            schedule: ScheduleMode::Custom {
                start: TimeOfDay::new(21, 0).unwrap(),
                end: TimeOfDay::new(7, 0).unwrap(),
            },
            circadian_enabled: true,
            media_apps: vec![VLC.to_string()],
            update_interval: StdDuration::from_secs(60),
            debug_enabled: false,
        });

        let sink = Arc::clone(&events);
        coordinator.subscribe(Box::new(move |event| {
            sink.lock().unwrap().push(event.clone());
        }));

        Self {
            clock,
            display: display_handle,
            prefs,
            events,
            handle: coordinator.spawn().unwrap(),
        }
    }

    fn send(&self, command: Command) -> nightshade::state::automation::CommandResponse {
        self.handle.send_command(command).unwrap()
    }

    fn query(&self) -> nightshade::state::automation::CommandResponse {
        self.send(Command::QueryState)
    }

    fn advance(&self, minutes: i64) {
        self.clock.advance(Duration::minutes(minutes));
    }

    fn context(&self, context: ForegroundContext) -> nightshade::state::automation::CommandResponse {
        self.send(Command::SetContext { context })
    }

    fn events(&self) -> Vec<AutomationEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[test]
fn test_schedule_and_curve_follow_the_clock() {
    let harness = Harness::start(20, 30);

    let state = harness.query();
    assert!(!state.enabled);
    assert_eq!(state.phase, Phase::Daylight);
    assert_eq!(state.kelvin, 6500);

    harness.advance(60);
    let state = harness.query();
    assert!(state.enabled);
    assert!(harness.display.is_enabled());
    assert_eq!(state.phase, Phase::Evening);
    assert_eq!(state.kelvin, 5700);

    let expected = intensity_for_kelvin(5700, &CircadianCurveConfig::default());
    assert!((harness.display.intensity() - expected).abs() < 1e-6);
}

#[test]
fn test_entering_deep_night_is_announced_once() {
    let harness = Harness::start(21, 30);
    harness.query();

    harness.advance(50);
    let state = harness.query();
    assert_eq!(state.phase, Phase::DeepNight);
    harness.advance(5);
    harness.query();

    let entered = harness
        .events()
        .iter()
        .filter(|event| matches!(event, AutomationEvent::EnteredDeepNight))
        .count();
    assert_eq!(entered, 1);
}

#[test]
fn test_media_playback_suspends_intensity_updates() {
    let harness = Harness::start(21, 30);
    harness.query();

    let state = harness.context(ForegroundContext::with_app(VLC));
    assert!(state.is_suspended);
    assert_eq!(state.suspend_reason, Some(SuspendReason::MediaPlayback));
    // Suspension freezes the curve but leaves night shift itself on
    assert!(state.enabled);

    harness.display.clear_calls();
    harness.advance(10);
    harness.query();
    assert!(
        !harness
            .display
            .calls()
            .iter()
            .any(|call| matches!(call, DisplayCall::SetIntensity(_)))
    );

    let state = harness.context(ForegroundContext::with_app("org.gnome.TextEditor"));
    assert!(!state.is_suspended);
    assert!(
        harness
            .display
            .calls()
            .iter()
            .any(|call| matches!(call, DisplayCall::SetIntensity(_)))
    );
}

#[test]
fn test_pause_is_clamped_and_expires() {
    let harness = Harness::start(21, 30);
    let started = harness.clock.now();

    let state = harness.send(Command::SetTemporaryPause { minutes: 45 });
    assert!(state.is_suspended);
    assert_eq!(state.suspend_reason, Some(SuspendReason::UserPause));
    assert_eq!(state.suspended_until, Some(started + Duration::minutes(30)));

    harness.advance(29);
    assert!(harness.query().is_suspended);

    harness.advance(1);
    let state = harness.query();
    assert!(!state.is_suspended);
    assert_eq!(state.suspend_reason, None);
}

#[test]
fn test_domain_rule_with_subdomain_exception() {
    let harness = Harness::start(21, 30);
    assert!(harness.query().enabled);

    harness.send(Command::AddRule {
        rule: SuppressionRule::Domain {
            host: "example.com".to_string(),
        },
    });
    let browser = ForegroundContext::with_app("org.mozilla.firefox");

    let state = harness.context(browser.clone().on_site("example.com", Some("www.example.com")));
    assert!(state.suppressed);
    assert!(!state.enabled);
    assert!(!harness.display.is_enabled());

    harness.send(Command::SetSubdomainDisposition {
        host: "docs.example.com".to_string(),
        disposition: SubdomainDisposition::Enabled,
    });
    let state = harness.context(browser.on_site("example.com", Some("docs.example.com")));
    assert!(!state.suppressed);
    assert!(state.enabled);
}

#[test]
fn test_app_rule_beats_subdomain_exception() {
    let harness = Harness::start(21, 30);

    harness.send(Command::AddRule {
        rule: SuppressionRule::App {
            bundle_id: "com.figma.Desktop".to_string(),
            scope: AppScope::CurrentOnly,
        },
    });
    harness.send(Command::SetSubdomainDisposition {
        host: "docs.example.com".to_string(),
        disposition: SubdomainDisposition::Enabled,
    });

    let state = harness.context(
        ForegroundContext::with_app("com.figma.Desktop")
            .on_site("example.com", Some("docs.example.com")),
    );
    assert!(state.suppressed);
    assert!(!state.enabled);
}

#[test]
fn test_disable_timer_runs_out() {
    let harness = Harness::start(21, 30);

    let state = harness.send(Command::DisableFor { minutes: 60 });
    assert!(!state.enabled);
    assert!(matches!(state.disable_timer, DisableTimer::Hour { .. }));

    // The schedule wants night shift on, but the timer holds it off
    harness.advance(30);
    assert!(!harness.query().enabled);

    harness.advance(30);
    let state = harness.query();
    assert_eq!(state.disable_timer, DisableTimer::Off);
    assert!(state.enabled);

    let state = harness.send(Command::DisableFor { minutes: 20 });
    assert!(matches!(state.disable_timer, DisableTimer::Custom { .. }));
    let state = harness.send(Command::CancelDisableTimer);
    assert!(state.enabled);
}

#[test]
fn test_manual_choice_survives_schedule_ticks() {
    let harness = Harness::start(21, 30);

    let state = harness.send(Command::SetEnabled { enabled: false });
    assert_eq!(state.user_override, UserOverride::Off);
    assert!(!state.enabled);

    harness.advance(60);
    assert!(!harness.query().enabled);
}

#[test]
fn test_external_change_is_adopted_as_manual_choice() {
    let harness = Harness::start(21, 30);
    assert!(harness.query().enabled);

    harness.display.simulate_external_change(false);
    let state = harness.query();
    assert!(!state.enabled);
    assert_eq!(state.user_override, UserOverride::Off);
}

#[test]
fn test_circadian_toggle_stops_publishing() {
    let harness = Harness::start(21, 30);
    harness.query();

    let state = harness.send(Command::ToggleEnabled);
    assert!(!state.circadian_enabled);
    let published_before = harness
        .events()
        .iter()
        .filter(|event| matches!(event, AutomationEvent::StatePublished { .. }))
        .count();

    harness.advance(20);
    harness.query();
    let published_after = harness
        .events()
        .iter()
        .filter(|event| matches!(event, AutomationEvent::StatePublished { .. }))
        .count();
    assert_eq!(published_before, published_after);
}

#[test]
fn test_state_survives_restart() {
    let prefs = Preferences::in_memory();

    {
        let mut harness = Harness::start_with(21, 30, prefs.clone());
        harness.send(Command::AddRule {
            rule: SuppressionRule::App {
                bundle_id: VLC.to_string(),
                scope: AppScope::WhileRunning,
            },
        });
        harness.send(Command::SetSchedule {
            schedule: ScheduleMode::Solar,
        });
        harness.send(Command::DisableFor { minutes: 120 });
        harness.handle.stop();
    }

    let harness = Harness::start_with(21, 45, prefs);
    let state = harness.query();
    assert_eq!(state.schedule, ScheduleMode::Solar);
    assert!(state.disable_timer.is_active());
    assert!(!state.enabled);

    let mut running = ForegroundContext::with_app("org.gnome.Nautilus");
    running.running_apps.insert(VLC.to_string());
    let state = harness.context(running);
    assert!(state.suppressed);
    assert!(harness.prefs.load::<DisableTimer>("disable_timer").is_some());
}

#[test]
fn test_shutdown_restores_automatic_behaviour() {
    let mut harness = Harness::start(21, 30);
    harness.send(Command::DisableFor { minutes: 60 });
    assert!(!harness.display.is_enabled());

    harness.handle.stop();
    assert!(!harness.handle.is_running());
    // Schedule says on at 21:30
    assert!(harness.display.is_enabled());
    // The persisted timer is left for the next start
    assert!(
        harness
            .prefs
            .load::<DisableTimer>("disable_timer")
            .is_some_and(|timer| timer.is_active())
    );
}

#[test]
fn test_store_failure_is_reported_but_state_stays_live() {
    let harness = Harness::start_with(21, 30, Preferences::new(Box::new(
        nightshade::state::MemoryStore::failing(),
    )));

    let state = harness.send(Command::AddRule {
        rule: SuppressionRule::Domain {
            host: "example.com".to_string(),
        },
    });
    assert!(state.error.is_some());

    // The rule was rolled back, so the site stays unsuppressed
    let state = harness.context(
        ForegroundContext::with_app("org.mozilla.firefox").on_site("example.com", None),
    );
    assert!(!state.suppressed);
}

#[test]
fn test_malformed_stored_schedule_and_curve_fall_back_to_defaults() {
    let prefs = Preferences::in_memory();
    prefs
        .save(
            keys::SCHEDULE,
            &serde_json::json!({
                "mode": "custom",
                "start": {"hour": 25, "minute": 99},
                "end": {"hour": 7, "minute": 0}
            }),
        )
        .unwrap();
    let mut inverted = serde_json::to_value(CircadianCurveConfig::default()).unwrap();
    inverted["evening_lead"] = serde_json::json!(30);
    inverted["deep_night_lead"] = serde_json::json!(45);
    prefs.save(keys::CIRCADIAN, &inverted).unwrap();

    let harness = Harness::start_with(21, 30, prefs);
    let state = harness.query();
    assert_eq!(
        state.schedule,
        ScheduleMode::Custom {
            start: TimeOfDay::new(21, 0).unwrap(),
            end: TimeOfDay::new(7, 0).unwrap(),
        }
    );
    // Default curve: 90 minutes before a 23:00 bedtime
    assert_eq!(state.phase, Phase::Evening);
    assert_eq!(state.kelvin, 5700);
}

#[test]
fn test_invalid_curve_is_rejected_and_not_stored() {
    let harness = Harness::start(21, 30);
    let before = harness.query();

    let state = harness.send(Command::SetCurve {
        curve: CircadianCurveConfig {
            evening_lead: StdDuration::from_secs(30 * 60),
            deep_night_lead: StdDuration::from_secs(45 * 60),
            ..CircadianCurveConfig::default()
        },
    });
    assert!(state.error.is_some());
    assert_eq!(state.kelvin, before.kelvin);
    assert_eq!(state.phase, before.phase);
    assert!(
        harness
            .prefs
            .load::<CircadianCurveConfig>(keys::CIRCADIAN)
            .is_none()
    );

    let state = harness.send(Command::SetCurve {
        curve: CircadianCurveConfig {
            bedtime: TimeOfDay::new(22, 0).unwrap(),
            ..CircadianCurveConfig::default()
        },
    });
    assert!(state.error.is_none());
    assert_eq!(state.phase, Phase::DeepNight);
}

#[test]
fn test_overlong_disable_is_capped_to_a_week() {
    let harness = Harness::start(21, 30);
    let now = harness.clock.now();

    let state = harness.send(Command::DisableFor {
        minutes: u64::MAX / 60,
    });
    assert!(!state.enabled);
    assert_eq!(
        state.disable_timer,
        DisableTimer::Custom {
            ends_at: now + Duration::days(7)
        }
    );

    harness.advance(24 * 60);
    assert!(!harness.query().enabled);
}

#[test]
fn test_manual_on_wins_over_active_suppression() {
    let harness = Harness::start(21, 30);
    harness.send(Command::AddRule {
        rule: SuppressionRule::Domain {
            host: "example.com".to_string(),
        },
    });
    let state = harness.context(
        ForegroundContext::with_app("org.mozilla.firefox").on_site("example.com", None),
    );
    assert!(state.suppressed);
    assert!(!state.enabled);

    // The manual choice turns the display on while the rule still matches
    let state = harness.send(Command::SetEnabled { enabled: true });
    assert!(state.enabled);
    assert!(state.suppressed);
    assert_eq!(state.user_override, UserOverride::On);
    assert!(harness.display.is_enabled());

    harness.advance(5);
    assert!(harness.query().enabled);

    // Leaving the site keeps the choice the user made during the suppression
    let state = harness.context(ForegroundContext::with_app("org.gnome.Terminal"));
    assert!(!state.suppressed);
    assert!(state.enabled);
    assert_eq!(state.user_override, UserOverride::On);
}

#[test]
fn test_list_rules_reports_every_rule() {
    let harness = Harness::start(21, 30);
    harness.send(Command::AddRule {
        rule: SuppressionRule::Domain {
            host: "example.com".to_string(),
        },
    });
    harness.send(Command::AddRule {
        rule: SuppressionRule::App {
            bundle_id: VLC.to_string(),
            scope: AppScope::WhileRunning,
        },
    });

    let state = harness.send(Command::ListRules);
    assert_eq!(
        state.rules,
        vec![
            SuppressionRule::App {
                bundle_id: VLC.to_string(),
                scope: AppScope::WhileRunning,
            },
            SuppressionRule::Domain {
                host: "example.com".to_string(),
            },
        ]
    );
    assert!(harness.query().rules.is_empty());
}

#[test]
fn test_website_control_switch() {
    let harness = Harness::start(21, 30);
    harness.send(Command::AddRule {
        rule: SuppressionRule::Domain {
            host: "example.com".to_string(),
        },
    });
    let site = ForegroundContext::with_app("org.mozilla.firefox").on_site("example.com", None);
    let state = harness.context(site.clone());
    assert!(state.website_control);
    assert!(state.suppressed);

    let state = harness.send(Command::SetWebsiteControl { enabled: false });
    assert!(!state.website_control);
    assert!(!state.suppressed);
    assert!(state.enabled);

    let state = harness.send(Command::SetWebsiteControl { enabled: true });
    assert!(state.suppressed);
    assert!(!state.enabled);
    assert_eq!(harness.prefs.load::<bool>(keys::WEBSITE_CONTROL), Some(true));
}

#[test]
fn test_manual_intensity_only_when_the_curve_is_idle() {
    let harness = Harness::start(21, 30);
    harness.query();

    // Circadian mode drives intensity
    let state = harness.send(Command::SetIntensity {
        intensity: 0.5,
        preview: false,
    });
    assert!(state.error.is_some());

    harness.send(Command::ToggleEnabled);
    let state = harness.send(Command::SetIntensity {
        intensity: 0.5,
        preview: false,
    });
    assert!(state.error.is_none());
    assert_eq!(state.intensity, Some(0.5));

    let state = harness.send(Command::AdjustIntensity { delta: 0.1 });
    assert!((harness.display.intensity() - 0.6).abs() < 1e-6);
    assert!(state.intensity.is_some_and(|i| (i - 0.6).abs() < 1e-6));

    harness.send(Command::SetIntensity {
        intensity: 0.9,
        preview: true,
    });
    assert!(
        harness
            .display
            .calls()
            .contains(&DisplayCall::PreviewIntensity(0.9))
    );
    assert!((harness.display.intensity() - 0.6).abs() < 1e-6);

    harness.advance(10);
    harness.query();
    assert!((harness.display.intensity() - 0.6).abs() < 1e-6);

    harness.send(Command::SetEnabled { enabled: false });
    let state = harness.send(Command::AdjustIntensity { delta: 0.1 });
    assert!(state.error.is_some());
}

#[test]
fn test_manual_intensity_allowed_while_paused() {
    let harness = Harness::start(21, 30);
    harness.send(Command::SetTemporaryPause { minutes: 10 });

    let state = harness.send(Command::SetIntensity {
        intensity: 0.2,
        preview: false,
    });
    assert!(state.error.is_none());
    assert!((harness.display.intensity() - 0.2).abs() < 1e-6);
}
