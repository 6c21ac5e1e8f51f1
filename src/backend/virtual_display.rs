//! In-process display that remembers what it was told.
//!
//! Every port call is appended to a shared log so integration tests can
//! assert exact call sequences, and [`VirtualDisplayHandle::simulate_external_change`]
//! plays the role of another process flipping the feature.

use anyhow::{Result, bail};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{DisplayControl, StatusCallback};

/// One recorded port call.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayCall {
    SetEnabled(bool),
    SetIntensity(f32),
    PreviewIntensity(f32),
}

#[derive(Default)]
struct Inner {
    enabled: bool,
    intensity: f32,
    calls: Vec<DisplayCall>,
    fail_writes: bool,
    callback: Option<Arc<dyn Fn() + Send + Sync>>,
}

/// Virtual night shift display.
pub struct VirtualDisplay {
    inner: Arc<Mutex<Inner>>,
}

/// Shared view onto a [`VirtualDisplay`] that stays usable after the display
/// itself was moved into the state machine.
#[derive(Clone)]
pub struct VirtualDisplayHandle {
    inner: Arc<Mutex<Inner>>,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl VirtualDisplay {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn handle(&self) -> VirtualDisplayHandle {
        VirtualDisplayHandle {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for VirtualDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualDisplayHandle {
    pub fn is_enabled(&self) -> bool {
        lock(&self.inner).enabled
    }

    pub fn intensity(&self) -> f32 {
        lock(&self.inner).intensity
    }

    pub fn calls(&self) -> Vec<DisplayCall> {
        lock(&self.inner).calls.clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.inner).calls.clear();
    }

    /// Make writes fail until switched back, like a driver that went away.
    pub fn set_failing(&self, failing: bool) {
        lock(&self.inner).fail_writes = failing;
    }

    /// Flip the enabled flag as another process would and fire the callback.
    pub fn simulate_external_change(&self, enabled: bool) {
        let callback = {
            let mut inner = lock(&self.inner);
            inner.enabled = enabled;
            inner.callback.clone()
        };
        if let Some(callback) = callback {
            callback();
        }
    }
}

impl DisplayControl for VirtualDisplay {
    fn backend_name(&self) -> &'static str {
        "Virtual"
    }

    fn supports_feature(&self) -> bool {
        true
    }

    fn is_enabled(&self) -> Result<bool> {
        Ok(lock(&self.inner).enabled)
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        let mut inner = lock(&self.inner);
        inner.calls.push(DisplayCall::SetEnabled(enabled));
        if inner.fail_writes {
            bail!("virtual display rejected set_enabled");
        }
        inner.enabled = enabled;
        Ok(())
    }

    fn intensity(&self) -> Result<f32> {
        Ok(lock(&self.inner).intensity)
    }

    fn set_intensity(&mut self, intensity: f32) -> Result<()> {
        let mut inner = lock(&self.inner);
        inner.calls.push(DisplayCall::SetIntensity(intensity));
        if inner.fail_writes {
            bail!("virtual display rejected set_intensity");
        }
        inner.intensity = intensity.clamp(0.0, 1.0);
        Ok(())
    }

    fn preview_intensity(&mut self, intensity: f32) -> Result<()> {
        lock(&self.inner)
            .calls
            .push(DisplayCall::PreviewIntensity(intensity));
        Ok(())
    }

    fn on_external_status_change(&mut self, callback: StatusCallback) {
        lock(&self.inner).callback = Some(Arc::from(callback));
    }
}
