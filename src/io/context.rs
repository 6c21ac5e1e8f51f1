//! Foreground context: which application is focused, which browser site it
//! shows and which applications are running.
//!
//! The daemon has no portable way to watch the desktop, so context is pushed
//! in from outside (a compositor hook script calling `nightshade context ...`)
//! and held in a [`SharedContext`] that the coordinator reads on every
//! evaluation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

/// Snapshot of what the user is looking at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForegroundContext {
    /// Bundle identifier of the focused application.
    #[serde(default)]
    pub app: Option<String>,
    /// Registrable domain shown in the focused browser tab, e.g. `example.com`.
    #[serde(default)]
    pub domain: Option<String>,
    /// Full host of the focused tab, e.g. `docs.example.com`.
    #[serde(default)]
    pub subdomain: Option<String>,
    #[serde(default)]
    pub running_apps: BTreeSet<String>,
}

impl ForegroundContext {
    pub fn with_app(app: &str) -> Self {
        let mut running_apps = BTreeSet::new();
        running_apps.insert(app.to_string());
        Self {
            app: Some(app.to_string()),
            running_apps,
            ..Self::default()
        }
    }

    pub fn on_site(mut self, domain: &str, subdomain: Option<&str>) -> Self {
        self.domain = Some(domain.to_string());
        self.subdomain = subdomain.map(str::to_string);
        self
    }
}

/// Port the coordinator reads foreground context from.
pub trait ContextProvider: Send + Sync {
    fn snapshot(&self) -> ForegroundContext;

    /// Push a new context from outside. Providers that watch the desktop
    /// themselves reject this.
    fn replace(&self, context: ForegroundContext) -> anyhow::Result<bool> {
        let _ = context;
        anyhow::bail!("This context provider does not accept external updates")
    }
}

/// Context holder updated from IPC and read by the coordinator.
#[derive(Debug, Clone, Default)]
pub struct SharedContext(Arc<RwLock<ForegroundContext>>);

impl SharedContext {
    pub fn new(initial: ForegroundContext) -> Self {
        Self(Arc::new(RwLock::new(initial)))
    }

    /// Replace the context. Returns whether it actually changed.
    pub fn update(&self, context: ForegroundContext) -> bool {
        let mut guard = self
            .0
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *guard == context {
            return false;
        }
        *guard = context;
        true
    }
}

impl ContextProvider for SharedContext {
    fn snapshot(&self) -> ForegroundContext {
        self.0
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn replace(&self, context: ForegroundContext) -> anyhow::Result<bool> {
        Ok(self.update(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_reports_change_only_once() {
        let shared = SharedContext::default();
        let ctx = ForegroundContext::with_app("org.mozilla.firefox").on_site("example.com", None);
        assert!(shared.update(ctx.clone()));
        assert!(!shared.update(ctx.clone()));
        assert_eq!(shared.snapshot(), ctx);
    }

    #[test]
    fn test_context_deserializes_with_missing_fields() {
        let ctx: ForegroundContext = serde_json::from_str(r#"{"app":"io.mpv.Mpv"}"#).unwrap();
        assert_eq!(ctx.app.as_deref(), Some("io.mpv.Mpv"));
        assert!(ctx.domain.is_none());
        assert!(ctx.running_apps.is_empty());
    }
}
