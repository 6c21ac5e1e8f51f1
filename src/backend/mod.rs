//! Display-control abstraction.
//!
//! The core never talks to a color-temperature driver directly. Every backend
//! implements [`DisplayControl`], and the state machine only ever holds a
//! `Box<dyn DisplayControl>`.
//!
//! ## Backend Selection
//!
//! - **Auto**: pick the best backend available in this environment.
//! - **Virtual**: in-process display that records every call, used when no
//!   driver is reachable and by the test suites.

use anyhow::Result;

use crate::config::Backend;

pub mod virtual_display;

pub use virtual_display::VirtualDisplay;

/// Callback fired when the display state changed outside of our control.
pub type StatusCallback = Box<dyn Fn() + Send + Sync>;

/// Port onto the operating system's night shift feature.
///
/// Intensity is normalized: `0.0` is no warm shift, `1.0` the warmest
/// setting the driver supports.
#[cfg_attr(test, mockall::automock)]
pub trait DisplayControl: Send {
    /// Human-readable name for logs and status output.
    fn backend_name(&self) -> &'static str;

    /// Whether the hardware supports warm shifting at all.
    fn supports_feature(&self) -> bool;

    fn is_enabled(&self) -> Result<bool>;

    fn set_enabled(&mut self, enabled: bool) -> Result<()>;

    fn intensity(&self) -> Result<f32>;

    fn set_intensity(&mut self, intensity: f32) -> Result<()>;

    /// Show `intensity` without committing it as the stored value.
    fn preview_intensity(&mut self, intensity: f32) -> Result<()>;

    /// Register a callback for out-of-band changes (another process toggled
    /// the feature). Replaces any earlier callback.
    fn on_external_status_change(&mut self, callback: StatusCallback);
}

/// Create the display-control backend for `backend`.
pub fn create_backend(backend: Backend) -> Result<Box<dyn DisplayControl>> {
    match backend {
        Backend::Auto => {
            log_decorated!("No hardware night shift driver found, using virtual display");
            Ok(Box::new(VirtualDisplay::new()))
        }
        Backend::Virtual => Ok(Box::new(VirtualDisplay::new())),
    }
}
