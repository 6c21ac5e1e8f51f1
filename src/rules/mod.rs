//! Standing suppression rules and their precedence.
//!
//! A rule says "night shift must be off here": while a given application is
//! focused, while it is running at all, on a browser domain, or on one exact
//! subdomain. A subdomain can also be explicitly *enabled*, which punches a
//! hole into a suppressed domain.
//!
//! Precedence for the current foreground context:
//!
//! 1. An app rule matching the focused or a running application always wins.
//! 2. A subdomain disposition decides next (`Enabled` → not suppressed,
//!    `Disabled` → suppressed).
//! 3. Otherwise the domain rule decides.
//!
//! Website control switches steps 2 and 3 off as a whole; the browser rules
//! stay stored and apply again once it is switched back on.
//!
//! Every mutation persists immediately and notifies listeners only when the
//! rule set actually changed.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::common::constants::DEFAULT_WEBSITE_CONTROL;
use crate::core::shift::DisableTimer;
use crate::io::context::ForegroundContext;
use crate::state::{Preferences, keys};


/// When an application rule applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppScope {
    /// Only while the application is focused.
    CurrentOnly,
    /// As long as the application is running.
    WhileRunning,
}

/// Explicit setting for one exact subdomain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubdomainDisposition {
    Enabled,
    Disabled,
    #[default]
    None,
}

/// One suppression rule, keyed by its kind and identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SuppressionRule {
    App { bundle_id: String, scope: AppScope },
    Domain { host: String },
    Subdomain { host: String, disposition: SubdomainDisposition },
}

impl fmt::Display for SuppressionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuppressionRule::App {
                bundle_id,
                scope: AppScope::CurrentOnly,
            } => write!(f, "app {bundle_id}"),
            SuppressionRule::App {
                bundle_id,
                scope: AppScope::WhileRunning,
            } => write!(f, "running app {bundle_id}"),
            SuppressionRule::Domain { host } => write!(f, "domain {host}"),
            SuppressionRule::Subdomain { host, disposition } => {
                let state = match disposition {
                    SubdomainDisposition::Enabled => "enabled",
                    SubdomainDisposition::Disabled => "disabled",
                    SubdomainDisposition::None => "cleared",
                };
                write!(f, "subdomain {host} ({state})")
            }
        }
    }
}

/// Notification emitted when the rule set changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleEvent {
    /// A rule that suppresses shifting was added (or a subdomain disabled).
    Activated(SuppressionRule),
    /// A suppressing rule was removed (or a subdomain enabled or cleared).
    Deactivated(SuppressionRule),
}

pub type RuleListener = Box<dyn Fn(&RuleEvent) + Send>;

/// Persisted shape of a browser rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct BrowserRule {
    host: String,
    #[serde(rename = "type")]
    rule_type: BrowserRuleType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum BrowserRuleType {
    Domain,
    SubdomainEnabled,
    SubdomainDisabled,
}

/// Normalize a host for storage and lookup: trimmed, lowercase, no trailing dot.
pub fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Combine the three suppression sources.
///
/// App suppression is absolute; an explicit subdomain disposition overrides the
/// domain result in either direction.
pub fn resolve_precedence(
    app_suppressed: bool,
    domain_suppressed: bool,
    subdomain: SubdomainDisposition,
) -> bool {
    if app_suppressed {
        return true;
    }
    match subdomain {
        SubdomainDisposition::Enabled => false,
        SubdomainDisposition::Disabled => true,
        SubdomainDisposition::None => domain_suppressed,
    }
}

/// Owner of every suppression rule.
pub struct RuleStore {
    prefs: Preferences,
    current_only: BTreeSet<String>,
    while_running: BTreeSet<String>,
    domains: BTreeSet<String>,
    subdomains: BTreeMap<String, SubdomainDisposition>,
    website_control: bool,
    listeners: Vec<RuleListener>,
}

impl RuleStore {
    /// Load all rules from `prefs`. Malformed entries are dropped with a warning.
    pub fn load(prefs: Preferences) -> Self {
        let current_only = load_app_set(&prefs, keys::DISABLED_APPS);
        let while_running = load_app_set(&prefs, keys::DISABLED_RUNNING_APPS);

        let mut domains = BTreeSet::new();
        let mut subdomains = BTreeMap::new();
        for entry in prefs.load::<Vec<Value>>(keys::BROWSER_RULES).unwrap_or_default() {
            let rule = match serde_json::from_value::<BrowserRule>(entry) {
                Ok(rule) => rule,
                Err(e) => {
                    log_warning!("Discarding malformed browser rule: {e}");
                    continue;
                }
            };
            let host = normalize_host(&rule.host);
            if host.is_empty() {
                continue;
            }
            match rule.rule_type {
                BrowserRuleType::Domain => {
                    domains.insert(host);
                }
                BrowserRuleType::SubdomainEnabled => {
                    subdomains.insert(host, SubdomainDisposition::Enabled);
                }
                BrowserRuleType::SubdomainDisabled => {
                    subdomains.insert(host, SubdomainDisposition::Disabled);
                }
            }
        }

        let website_control = prefs
            .load::<bool>(keys::WEBSITE_CONTROL)
            .unwrap_or(DEFAULT_WEBSITE_CONTROL);

        Self {
            prefs,
            current_only,
            while_running,
            domains,
            subdomains,
            website_control,
            listeners: Vec::new(),
        }
    }

    /// Register a listener for rule changes.
    pub fn subscribe(&mut self, listener: RuleListener) {
        self.listeners.push(listener);
    }

    fn emit(&self, event: RuleEvent) {
        for listener in &self.listeners {
            listener(&event);
        }
    }

    // # Mutations

    /// Add an application rule. Returns whether the rule set changed.
    pub fn add_app_rule(&mut self, bundle_id: &str, scope: AppScope) -> Result<bool> {
        let bundle_id = bundle_id.trim();
        if bundle_id.is_empty() {
            bail!("Application identifier cannot be empty");
        }
        if !self.app_set_mut(scope).insert(bundle_id.to_string()) {
            return Ok(false);
        }
        if let Err(e) = self.persist_apps(scope) {
            self.app_set_mut(scope).remove(bundle_id);
            return Err(e);
        }
        self.emit(RuleEvent::Activated(SuppressionRule::App {
            bundle_id: bundle_id.to_string(),
            scope,
        }));
        Ok(true)
    }

    pub fn remove_app_rule(&mut self, bundle_id: &str, scope: AppScope) -> Result<bool> {
        let bundle_id = bundle_id.trim();
        if !self.app_set_mut(scope).remove(bundle_id) {
            return Ok(false);
        }
        if let Err(e) = self.persist_apps(scope) {
            self.app_set_mut(scope).insert(bundle_id.to_string());
            return Err(e);
        }
        self.emit(RuleEvent::Deactivated(SuppressionRule::App {
            bundle_id: bundle_id.to_string(),
            scope,
        }));
        Ok(true)
    }

    pub fn add_domain_rule(&mut self, host: &str) -> Result<bool> {
        let host = normalize_host(host);
        if host.is_empty() {
            bail!("Domain cannot be empty");
        }
        if !self.domains.insert(host.clone()) {
            return Ok(false);
        }
        if let Err(e) = self.persist_browser_rules() {
            self.domains.remove(&host);
            return Err(e);
        }
        self.emit(RuleEvent::Activated(SuppressionRule::Domain { host }));
        Ok(true)
    }

    /// Remove a domain rule; removing an unknown host is a no-op.
    pub fn remove_domain_rule(&mut self, host: &str) -> Result<bool> {
        let host = normalize_host(host);
        if !self.domains.remove(&host) {
            return Ok(false);
        }
        if let Err(e) = self.persist_browser_rules() {
            self.domains.insert(host);
            return Err(e);
        }
        self.emit(RuleEvent::Deactivated(SuppressionRule::Domain { host }));
        Ok(true)
    }

    /// Set or clear (`None`) the disposition of one subdomain.
    pub fn set_subdomain_disposition(
        &mut self,
        host: &str,
        disposition: SubdomainDisposition,
    ) -> Result<bool> {
        let host = normalize_host(host);
        if host.is_empty() {
            bail!("Subdomain cannot be empty");
        }

        let previous = self.subdomain_disposition(&host);
        if previous == disposition {
            return Ok(false);
        }

        match disposition {
            SubdomainDisposition::None => self.subdomains.remove(&host),
            other => self.subdomains.insert(host.clone(), other),
        };
        if let Err(e) = self.persist_browser_rules() {
            match previous {
                SubdomainDisposition::None => self.subdomains.remove(&host),
                other => self.subdomains.insert(host.clone(), other),
            };
            return Err(e);
        }

        let rule = SuppressionRule::Subdomain { host, disposition };
        // Moving towards Disabled adds suppression, every other move lifts it
        let event = match (previous, disposition) {
            (_, SubdomainDisposition::Disabled)
            | (SubdomainDisposition::Enabled, SubdomainDisposition::None) => {
                RuleEvent::Activated(rule)
            }
            _ => RuleEvent::Deactivated(rule),
        };
        self.emit(event);
        Ok(true)
    }

    /// Switch domain and subdomain rules on or off as a whole. Returns whether
    /// the setting changed.
    ///
    /// No rule event is emitted; the stored rules themselves are unchanged.
    pub fn set_website_control(&mut self, enabled: bool) -> Result<bool> {
        if self.website_control == enabled {
            return Ok(false);
        }
        self.prefs.save(keys::WEBSITE_CONTROL, &enabled)?;
        self.website_control = enabled;
        Ok(true)
    }

    /// Add any kind of rule. A subdomain rule sets its disposition.
    pub fn add_rule(&mut self, rule: &SuppressionRule) -> Result<bool> {
        match rule {
            SuppressionRule::App { bundle_id, scope } => self.add_app_rule(bundle_id, *scope),
            SuppressionRule::Domain { host } => self.add_domain_rule(host),
            SuppressionRule::Subdomain { host, disposition } => {
                self.set_subdomain_disposition(host, *disposition)
            }
        }
    }

    /// Remove any kind of rule. A subdomain rule is cleared regardless of its
    /// disposition.
    pub fn remove_rule(&mut self, rule: &SuppressionRule) -> Result<bool> {
        match rule {
            SuppressionRule::App { bundle_id, scope } => self.remove_app_rule(bundle_id, *scope),
            SuppressionRule::Domain { host } => self.remove_domain_rule(host),
            SuppressionRule::Subdomain { host, .. } => {
                self.set_subdomain_disposition(host, SubdomainDisposition::None)
            }
        }
    }

    // # Queries

    /// True when the focused app has a current-only rule, or any running app
    /// has a while-running rule.
    pub fn is_suppressed_for_app(&self, context: &ForegroundContext) -> bool {
        let focused = context
            .app
            .as_deref()
            .is_some_and(|app| self.current_only.contains(app));
        focused
            || context
                .running_apps
                .iter()
                .any(|app| self.while_running.contains(app))
    }

    pub fn is_suppressed_for_domain(&self, host: &str) -> bool {
        self.domains.contains(&normalize_host(host))
    }

    pub fn subdomain_disposition(&self, host: &str) -> SubdomainDisposition {
        self.subdomains
            .get(&normalize_host(host))
            .copied()
            .unwrap_or_default()
    }

    pub fn website_control_enabled(&self) -> bool {
        self.website_control
    }

    /// Whether shifting must be off for `context`.
    pub fn effective_suppression(&self, context: &ForegroundContext) -> bool {
        let app = self.is_suppressed_for_app(context);
        if !self.website_control {
            return app;
        }
        let domain = context
            .domain
            .as_deref()
            .is_some_and(|host| self.is_suppressed_for_domain(host));
        let subdomain = context
            .subdomain
            .as_deref()
            .map(|host| self.subdomain_disposition(host))
            .unwrap_or_default();
        resolve_precedence(app, domain, subdomain)
    }

    /// Every stored rule, apps first.
    pub fn rules(&self) -> Vec<SuppressionRule> {
        let apps = self
            .current_only
            .iter()
            .map(|id| (id, AppScope::CurrentOnly))
            .chain(self.while_running.iter().map(|id| (id, AppScope::WhileRunning)))
            .map(|(id, scope)| SuppressionRule::App {
                bundle_id: id.clone(),
                scope,
            });
        let domains = self
            .domains
            .iter()
            .map(|host| SuppressionRule::Domain { host: host.clone() });
        let subdomains = self
            .subdomains
            .iter()
            .map(|(host, disposition)| SuppressionRule::Subdomain {
                host: host.clone(),
                disposition: *disposition,
            });
        apps.chain(domains).chain(subdomains).collect()
    }

    // # Disable timer projection

    /// Persist the live disable timer so it survives a restart.
    pub fn persist_disable_timer(&self, timer: &DisableTimer) -> Result<()> {
        self.prefs.save(keys::DISABLE_TIMER, timer)
    }

    /// Load the persisted disable timer, dropping one that already expired.
    pub fn persisted_disable_timer(&self, now: chrono::DateTime<chrono::Local>) -> DisableTimer {
        match self.prefs.load::<DisableTimer>(keys::DISABLE_TIMER) {
            Some(timer) if !timer.is_expired(now) => timer,
            _ => DisableTimer::Off,
        }
    }

    // # Persistence

    fn app_set_mut(&mut self, scope: AppScope) -> &mut BTreeSet<String> {
        match scope {
            AppScope::CurrentOnly => &mut self.current_only,
            AppScope::WhileRunning => &mut self.while_running,
        }
    }

    fn persist_apps(&self, scope: AppScope) -> Result<()> {
        match scope {
            AppScope::CurrentOnly => self.prefs.save(keys::DISABLED_APPS, &self.current_only),
            AppScope::WhileRunning => self
                .prefs
                .save(keys::DISABLED_RUNNING_APPS, &self.while_running),
        }
    }

    fn persist_browser_rules(&self) -> Result<()> {
        let domains = self.domains.iter().map(|host| BrowserRule {
            host: host.clone(),
            rule_type: BrowserRuleType::Domain,
        });
        let subdomains = self.subdomains.iter().filter_map(|(host, disposition)| {
            let rule_type = match disposition {
                SubdomainDisposition::Enabled => BrowserRuleType::SubdomainEnabled,
                SubdomainDisposition::Disabled => BrowserRuleType::SubdomainDisabled,
                SubdomainDisposition::None => return None,
            };
            Some(BrowserRule {
                host: host.clone(),
                rule_type,
            })
        });
        let all: Vec<BrowserRule> = domains.chain(subdomains).collect();
        self.prefs.save(keys::BROWSER_RULES, &all)
    }
}

fn load_app_set(prefs: &Preferences, key: &str) -> BTreeSet<String> {
    prefs
        .load::<Vec<Value>>(key)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|entry| match entry {
            Value::String(id) if !id.trim().is_empty() => Some(id.trim().to_string()),
            other => {
                log_warning!("Discarding malformed application rule in '{key}': {other}");
                None
            }
        })
        .collect()
}
