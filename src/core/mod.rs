//! Core automation logic.
//!
//! The [`Coordinator`] owns every piece of mutable state: the rule store, the
//! activity tracker and the enablement state machine. It runs on one thread
//! and consumes a mailbox, so the periodic tick, rule and context changes,
//! external display changes and commands are all serialized:
//!
//! - The tick is the mailbox `recv_timeout` deadline, the earliest of the
//!   update interval, a pause expiry and a disable-timer expiry. Ticks never
//!   queue up; a late tick recomputes everything from the current time.
//! - Commands carry a reply channel and are always answered.
//!
//! Each evaluation syncs suppression for the current context, expires the
//! disable timer, re-evaluates activity overrides, runs the schedule and,
//! when circadian mode is on, publishes the curve target and drives intensity.

pub mod activity;
pub mod command;
pub mod curve;
pub mod schedule;
pub mod shift;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::backend::DisplayControl;
use crate::common::constants::{
    COMMAND_TIMEOUT_SECS, MAXIMUM_DISABLE_MINUTES, MINIMUM_PAUSE_MINUTES,
};
use crate::config::validation::validate_curve;
use crate::core::activity::{ActivityOverrideSnapshot, ActivityOverrideTracker};
use crate::core::command::Command;
use crate::core::curve::{CircadianCurveConfig, Phase, intensity_for_kelvin};
use crate::core::schedule::{ScheduleMode, scheduled_state};
use crate::core::shift::{DisableTimer, ShiftEvent, ShiftInputs, ShiftStateMachine, UserOverride};
use crate::geo::SolarTimeProvider;
use crate::io::context::ContextProvider;
use crate::rules::{RuleEvent, RuleStore};
use crate::state::automation::{AutomationState, CommandResponse};
use crate::state::ipc::events::AutomationEvent;
use crate::state::{Preferences, keys};
use crate::time::source::TimeSource;

/// Everything the coordinator thread reacts to.
pub enum Message {
    Tick,
    Rule(RuleEvent),
    /// The display reported an out-of-band change.
    ExternalStatusChanged,
    OverrideChanged(ActivityOverrideSnapshot),
    Command {
        command: Command,
        reply: Sender<CommandResponse>,
    },
    Shutdown,
}

/// Cloneable sender into a coordinator's mailbox.
#[derive(Clone)]
pub struct Mailbox(Sender<Message>);

impl Mailbox {
    /// A mailbox with no coordinator behind it, plus its receiving end.
    pub fn detached() -> (Self, Receiver<Message>) {
        let (sender, receiver) = mpsc::channel();
        (Self(sender), receiver)
    }

    /// Deliver a message. Returns `false` once the coordinator is gone.
    pub fn send(&self, message: Message) -> bool {
        self.0.send(message).is_ok()
    }

    /// Send a command and wait for its response.
    pub fn request(&self, command: Command, timeout: Duration) -> Result<CommandResponse> {
        let (reply, response) = mpsc::channel();
        if !self.send(Message::Command { command, reply }) {
            anyhow::bail!("Coordinator is not running");
        }
        response
            .recv_timeout(timeout)
            .context("Timed out waiting for the coordinator to answer")
    }
}

pub type AutomationListener = Box<dyn Fn(&AutomationEvent) + Send>;

/// Parameters for creating a Coordinator.
///
/// Bundles all the collaborators so construction stays explicit.
pub struct CoordinatorParams {
    pub prefs: Preferences,
    pub display: Box<dyn DisplayControl>,
    pub context: Arc<dyn ContextProvider>,
    pub solar: Option<Box<dyn SolarTimeProvider>>,
    pub time_source: Arc<dyn TimeSource>,
    /// Defaults from the config file; persisted values take precedence.
    pub curve: CircadianCurveConfig,
    pub schedule: ScheduleMode,
    pub circadian_enabled: bool,
    pub media_apps: Vec<String>,
    pub update_interval: Duration,
    pub debug_enabled: bool,
}

/// Single owner of the automation state.
pub struct Coordinator {
    rules: RuleStore,
    tracker: ActivityOverrideTracker,
    machine: ShiftStateMachine,
    prefs: Preferences,
    context: Arc<dyn ContextProvider>,
    solar: Option<Box<dyn SolarTimeProvider>>,
    time_source: Arc<dyn TimeSource>,
    curve: CircadianCurveConfig,
    schedule: ScheduleMode,
    circadian_enabled: bool,
    update_interval: Duration,
    debug_enabled: bool,
    // Edge detection only, never authoritative
    last_published: Option<AutomationState>,
    last_suppressed: bool,
    last_enabled: Option<bool>,
    persisted: (UserOverride, DisableTimer),
    listeners: Vec<AutomationListener>,
    sender: Sender<Message>,
    receiver: Receiver<Message>,
}

impl Coordinator {
    pub fn new(params: CoordinatorParams) -> Self {
        let (sender, receiver) = mpsc::channel();
        let prefs = params.prefs;
        let now = params.time_source.now();

        let mut rules = RuleStore::load(prefs.clone());
        let rule_tx = sender.clone();
        rules.subscribe(Box::new(move |event| {
            let _ = rule_tx.send(Message::Rule(event.clone()));
        }));

        let mut tracker = ActivityOverrideTracker::new(params.media_apps);
        let override_tx = sender.clone();
        tracker.subscribe(Box::new(move |snapshot| {
            let _ = override_tx.send(Message::OverrideChanged(*snapshot));
        }));

        let mut machine = ShiftStateMachine::new(params.display);
        let status_tx = sender.clone();
        machine
            .display_mut()
            .on_external_status_change(Box::new(move || {
                let _ = status_tx.send(Message::ExternalStatusChanged);
            }));

        let user_override = prefs
            .load::<UserOverride>(keys::USER_OVERRIDE)
            .unwrap_or_default();
        let disable_timer = rules.persisted_disable_timer(now);
        machine.restore(user_override, disable_timer);

        let schedule = prefs
            .load::<ScheduleMode>(keys::SCHEDULE)
            .unwrap_or(params.schedule);
        let curve = match prefs.load::<CircadianCurveConfig>(keys::CIRCADIAN) {
            Some(stored) => match validate_curve(&stored) {
                Ok(()) => stored,
                Err(e) => {
                    log_warning!("Discarding stored circadian curve: {e}");
                    params.curve
                }
            },
            None => params.curve,
        };
        let circadian_enabled = prefs
            .load::<bool>(keys::CIRCADIAN_ENABLED)
            .unwrap_or(params.circadian_enabled);

        Self {
            rules,
            tracker,
            machine,
            prefs,
            context: params.context,
            solar: params.solar,
            time_source: params.time_source,
            curve,
            schedule,
            circadian_enabled,
            update_interval: params.update_interval,
            debug_enabled: params.debug_enabled,
            last_published: None,
            last_suppressed: false,
            last_enabled: None,
            persisted: (user_override, disable_timer),
            listeners: Vec::new(),
            sender,
            receiver,
        }
    }

    /// Register a listener for published events.
    pub fn subscribe(&mut self, listener: AutomationListener) {
        self.listeners.push(listener);
    }

    pub fn mailbox(&self) -> Mailbox {
        Mailbox(self.sender.clone())
    }

    /// Run the coordinator on its own thread.
    pub fn spawn(self) -> Result<CoordinatorHandle> {
        let mailbox = self.mailbox();
        let thread = std::thread::Builder::new()
            .name("coordinator".to_string())
            .spawn(move || self.run())
            .context("Failed to spawn coordinator thread")?;

        Ok(CoordinatorHandle {
            mailbox,
            thread: Some(thread),
        })
    }

    /// Main loop: runs until a `Shutdown` message arrives.
    pub fn run(mut self) {
        self.start();

        loop {
            let timeout = self.next_wakeup();
            match self.receiver.recv_timeout(timeout) {
                Ok(Message::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(message) => self.process(message),
                Err(RecvTimeoutError::Timeout) => self.process(Message::Tick),
            }
        }

        self.shutdown();
    }

    /// Begin observing and evaluate once.
    pub fn start(&mut self) {
        let now = self.time_source.now();
        let app = self.context.snapshot().app;

        log_block_start!("Automation started");
        log_indented!("Backend: {}", self.machine.backend_name());
        log_indented!("Schedule: {}", self.schedule);
        log_indented!(
            "Circadian mode: {}",
            if self.circadian_enabled { "on" } else { "off" }
        );
        if !self.machine.supports_feature() {
            log_warning!("{} reports no night shift support", self.machine.backend_name());
        }

        self.tracker.start(now, app.as_deref());
        self.evaluate();
    }

    /// Handle one mailbox message.
    pub fn process(&mut self, message: Message) {
        match message {
            Message::Tick => self.evaluate(),
            Message::Rule(event) => {
                if self.debug_enabled {
                    log_debug!("Rule change: {event:?}");
                }
                self.evaluate();
            }
            Message::ExternalStatusChanged => {
                if self.machine.observe_external_status() {
                    log_decorated!(
                        "Night shift turned {} outside nightshade, keeping it as a manual choice",
                        if self.machine.is_enabled() { "on" } else { "off" }
                    );
                }
                self.evaluate();
            }
            Message::OverrideChanged(snapshot) => {
                self.emit(&AutomationEvent::OverrideChanged { snapshot });
                self.evaluate();
            }
            Message::Command { command, reply } => {
                let response = self.handle_command(command);
                // A requester that gave up waiting is not an error
                let _ = reply.send(response);
            }
            Message::Shutdown => {}
        }
    }

    /// Restore automatic behaviour before exiting.
    ///
    /// The display gets the state the schedule wants; persisted override and
    /// timer stay untouched so they are picked up again on the next start.
    pub fn shutdown(&mut self) {
        let inputs = self.inputs(self.time_source.now());
        self.machine.handle(ShiftEvent::DisableTimerEnded, inputs);
        if self.last_suppressed {
            self.machine.handle(ShiftEvent::RuleDeactivated, inputs);
            self.last_suppressed = false;
        }
        self.tracker.stop();
        log_block_start!("Automation stopped");
    }

    // # Evaluation

    fn inputs(&self, now: chrono::DateTime<chrono::Local>) -> ShiftInputs {
        ShiftInputs {
            now,
            scheduled: scheduled_state(&self.schedule, now, self.solar.as_deref()),
        }
    }

    fn evaluate(&mut self) {
        let now = self.time_source.now();
        let context = self.context.snapshot();

        let suppressed = self.rules.effective_suppression(&context);
        if suppressed != self.last_suppressed {
            self.last_suppressed = suppressed;
            let event = if suppressed {
                log_decorated!("Suppression rule applies, night shift held off");
                ShiftEvent::RuleActivated
            } else {
                log_decorated!("Suppression lifted");
                ShiftEvent::RuleDeactivated
            };
            let inputs = self.inputs(now);
            self.machine.handle(event, inputs);
        }

        if self.machine.disable_timer().is_expired(now) {
            log_decorated!("Disable timer ended");
            let inputs = self.inputs(now);
            self.machine.handle(ShiftEvent::DisableTimerEnded, inputs);
        }

        self.tracker.evaluate(now, context.app.as_deref());
        let inputs = self.inputs(now);
        self.machine.handle(ShiftEvent::ScheduleTick, inputs);

        self.persist_override();
        self.publish_enablement();

        if !self.circadian_enabled {
            return;
        }

        let target = curve::target(now, &self.curve);
        let snapshot = self.tracker.snapshot();
        self.publish_state(AutomationState {
            phase: target.phase,
            kelvin_target: target.kelvin,
            is_suspended: snapshot.is_suspended,
        });

        if snapshot.is_suspended || !self.machine.is_enabled() {
            return;
        }

        self.machine
            .set_intensity(intensity_for_kelvin(target.kelvin, &self.curve));
    }

    fn publish_state(&mut self, state: AutomationState) {
        let previous = self.last_published.replace(state);
        if previous == Some(state) {
            return;
        }

        if previous.map(|p| p.phase) != Some(state.phase) {
            log_block_start!("{} phase, target {}K", state.phase, state.kelvin_target);
        } else if self.debug_enabled {
            log_debug!("Target {}K", state.kelvin_target);
        }

        self.emit(&AutomationEvent::state_published(state));

        if state.phase == Phase::DeepNight
            && previous.is_some_and(|p| p.phase != Phase::DeepNight)
        {
            self.emit(&AutomationEvent::EnteredDeepNight);
        }
    }

    fn publish_enablement(&mut self) {
        let enabled = self.machine.is_enabled();
        if self.last_enabled == Some(enabled) {
            return;
        }
        self.last_enabled = Some(enabled);
        self.emit(&AutomationEvent::EnablementChanged {
            enabled,
            user_override: self.machine.user_override(),
            disable_timer: self.machine.disable_timer(),
        });
    }

    fn persist_override(&mut self) {
        let current = (self.machine.user_override(), self.machine.disable_timer());
        if current == self.persisted {
            return;
        }
        if let Err(e) = self.prefs.save(keys::USER_OVERRIDE, &current.0) {
            log_warning!("{e:#}");
        }
        if let Err(e) = self.rules.persist_disable_timer(&current.1) {
            log_warning!("{e:#}");
        }
        self.persisted = current;
    }

    fn emit(&self, event: &AutomationEvent) {
        for listener in &self.listeners {
            listener(event);
        }
    }

    fn next_wakeup(&self) -> Duration {
        let now = self.time_source.now();
        [self.tracker.next_deadline(), self.machine.disable_timer().ends_at()]
            .into_iter()
            .flatten()
            .map(|deadline| (deadline - now).to_std().unwrap_or(Duration::ZERO))
            .fold(self.update_interval, Duration::min)
    }

    // # Commands

    fn handle_command(&mut self, command: Command) -> CommandResponse {
        let now = self.time_source.now();
        let context = self.context.snapshot();
        let app = context.app.as_deref();
        let inputs = self.inputs(now);
        let mut error = None;
        let list_rules = command == Command::ListRules;

        if self.debug_enabled && !command.is_query() {
            log_debug!("Command: {command:?}");
        }

        match command {
            Command::QueryState => {}
            Command::SetTemporaryPause { minutes } => {
                self.tracker.set_temporary_pause(minutes, now, app);
            }
            Command::ClearTemporaryPause => {
                self.tracker.clear_temporary_pause(now, app);
            }
            Command::ToggleEnabled => {
                self.circadian_enabled = !self.circadian_enabled;
                log_decorated!(
                    "Circadian mode {}",
                    if self.circadian_enabled { "enabled" } else { "disabled" }
                );
                if !self.circadian_enabled {
                    self.last_published = None;
                }
                if let Err(e) = self
                    .prefs
                    .save(keys::CIRCADIAN_ENABLED, &self.circadian_enabled)
                {
                    error = Some(format!("{e:#}"));
                }
            }
            Command::SetEnabled { enabled } => {
                let event = if enabled {
                    ShiftEvent::UserEnabled
                } else {
                    ShiftEvent::UserDisabled
                };
                self.machine.handle(event, inputs);
            }
            Command::DisableFor { minutes } => {
                let minutes =
                    minutes.clamp(MINIMUM_PAUSE_MINUTES.unsigned_abs(), MAXIMUM_DISABLE_MINUTES);
                self.machine.handle(
                    ShiftEvent::DisableTimerSet(Duration::from_secs(minutes.saturating_mul(60))),
                    inputs,
                );
            }
            Command::CancelDisableTimer => {
                self.machine.handle(ShiftEvent::DisableTimerEnded, inputs);
            }
            Command::AddRule { rule } => {
                if let Err(e) = self.rules.add_rule(&rule) {
                    error = Some(format!("{e:#}"));
                }
            }
            Command::RemoveRule { rule } => {
                if let Err(e) = self.rules.remove_rule(&rule) {
                    error = Some(format!("{e:#}"));
                }
            }
            Command::SetSubdomainDisposition { host, disposition } => {
                if let Err(e) = self.rules.set_subdomain_disposition(&host, disposition) {
                    error = Some(format!("{e:#}"));
                }
            }
            Command::ListRules => {}
            Command::SetWebsiteControl { enabled } => {
                match self.rules.set_website_control(enabled) {
                    Ok(true) => log_decorated!(
                        "Website rules {}",
                        if enabled { "enabled" } else { "disabled" }
                    ),
                    Ok(false) => {}
                    Err(e) => error = Some(format!("{e:#}")),
                }
            }
            Command::SetSchedule { schedule } => {
                self.schedule = schedule;
                log_decorated!("Schedule set to {schedule}");
                if let Err(e) = self.prefs.save(keys::SCHEDULE, &schedule) {
                    error = Some(format!("{e:#}"));
                }
                let inputs = self.inputs(now);
                self.machine.handle(ShiftEvent::ScheduleChanged, inputs);
            }
            Command::SetCurve { curve } => match validate_curve(&curve) {
                Ok(()) => {
                    self.curve = curve;
                    self.last_published = None;
                    log_decorated!("Bedtime set to {}", curve.bedtime);
                    if let Err(e) = self.prefs.save(keys::CIRCADIAN, &curve) {
                        error = Some(format!("{e:#}"));
                    }
                }
                Err(e) => error = Some(format!("Curve rejected: {e:#}")),
            },
            Command::SetIntensity { intensity, preview } => {
                if let Err(e) = self.apply_manual_intensity(intensity, preview) {
                    error = Some(format!("{e:#}"));
                }
            }
            Command::AdjustIntensity { delta } => {
                let current = self.machine.intensity().unwrap_or(0.0);
                if let Err(e) = self.apply_manual_intensity(current + delta, false) {
                    error = Some(format!("{e:#}"));
                }
            }
            Command::SetContext { context } => {
                if let Err(e) = self.context.replace(context) {
                    error = Some(format!("{e:#}"));
                }
            }
        }

        self.evaluate();

        let mut response = self.response();
        if list_rules {
            response.rules = self.rules.rules();
        }
        match error {
            Some(error) => {
                log_warning!("Command failed: {error}");
                response.with_error(error)
            }
            None => response,
        }
    }

    /// Apply a hand-set intensity. Refused while the curve drives intensity,
    /// which is whenever circadian mode is on and not suspended.
    fn apply_manual_intensity(&mut self, intensity: f32, preview: bool) -> Result<()> {
        if !intensity.is_finite() {
            anyhow::bail!("Intensity must be a number between 0 and 1");
        }
        if self.circadian_enabled && !self.tracker.snapshot().is_suspended {
            anyhow::bail!("Circadian mode controls intensity; turn it off or pause it first");
        }

        let intensity = intensity.clamp(0.0, 1.0);
        let applied = if preview {
            self.machine.preview_intensity(intensity)
        } else {
            self.machine.set_intensity(intensity)
        };
        if !applied {
            anyhow::bail!("Night shift is off; intensity unchanged");
        }
        if !preview {
            log_decorated!("Intensity set to {:.0}%", intensity * 100.0);
        }
        Ok(())
    }

    /// Current state as answered to commands.
    pub fn response(&self) -> CommandResponse {
        let now = self.time_source.now();
        let target = curve::target(now, &self.curve);
        let snapshot = self.tracker.snapshot();

        CommandResponse {
            enabled: self.machine.is_enabled(),
            circadian_enabled: self.circadian_enabled,
            phase: target.phase,
            kelvin: target.kelvin,
            is_suspended: snapshot.is_suspended,
            suspend_reason: snapshot.reason,
            suspended_until: snapshot.until,
            user_override: self.machine.user_override(),
            disable_timer: self.machine.disable_timer(),
            suppressed: self.machine.is_suppressed(),
            website_control: self.rules.website_control_enabled(),
            intensity: self.machine.intensity(),
            schedule: self.schedule,
            backend: self.machine.backend_name().to_string(),
            rules: Vec::new(),
            error: None,
        }
    }
}

/// Owner-side handle of a running coordinator thread.
pub struct CoordinatorHandle {
    mailbox: Mailbox,
    thread: Option<JoinHandle<()>>,
}

impl CoordinatorHandle {
    pub fn mailbox(&self) -> Mailbox {
        self.mailbox.clone()
    }

    pub fn send_command(&self, command: Command) -> Result<CommandResponse> {
        self.mailbox
            .request(command, Duration::from_secs(COMMAND_TIMEOUT_SECS))
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the coordinator and wait for it. Safe to call more than once.
    pub fn stop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.mailbox.send(Message::Shutdown);
            if thread.join().is_err() {
                log_critical!("Coordinator thread panicked");
            }
        }
    }

    /// Block until the coordinator exits on its own (after a `Shutdown`
    /// delivered through a [`Mailbox`]).
    pub fn wait(mut self) {
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            log_critical!("Coordinator thread panicked");
        }
    }
}

impl Drop for CoordinatorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
