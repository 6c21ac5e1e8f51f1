//! Time source abstraction for real and manually driven clocks.
//!
//! The coordinator never calls `Local::now()` directly. It receives an
//! `Arc<dyn TimeSource>` at construction so the circadian curve, the
//! temporary pause and the disable timer can all be exercised against a clock
//! that tests move by hand.

use chrono::{DateTime, Local};

/// Trait for abstracting "what time is it".
pub trait TimeSource: Send + Sync {
    /// Get the current wall-clock time.
    fn now(&self) -> DateTime<Local>;
}

/// Real-time implementation backed by the system clock.
pub struct RealTimeSource;

impl TimeSource for RealTimeSource {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Clock that only moves when told to.
#[cfg(any(test, feature = "testing-support"))]
pub struct ManualTimeSource {
    current: std::sync::Mutex<DateTime<Local>>,
}

#[cfg(any(test, feature = "testing-support"))]
impl ManualTimeSource {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            current: std::sync::Mutex::new(start),
        }
    }

    /// Build a clock at `HH:MM` on an arbitrary fixed date.
    pub fn at(hour: u32, minute: u32) -> Self {
        Self::new(local_time(2024, 3, 12, hour, minute))
    }

    pub fn set(&self, time: DateTime<Local>) {
        *self.lock() = time;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self.lock();
        *guard += by;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Local>> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(any(test, feature = "testing-support"))]
impl TimeSource for ManualTimeSource {
    fn now(&self) -> DateTime<Local> {
        *self.lock()
    }
}

/// Resolve a local wall-clock time, taking the earliest instant for ambiguous
/// (DST fold) times and the next valid minute for skipped ones.
pub fn local_time(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Local> {
    use chrono::NaiveDate;

    let naive = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, 0))
        .unwrap_or_default();
    resolve_local(naive, &Local)
}

/// Map a naive local time onto a concrete instant in `tz`.
pub fn resolve_local<Tz: chrono::TimeZone>(
    naive: chrono::NaiveDateTime,
    tz: &Tz,
) -> DateTime<Tz> {
    use chrono::LocalResult;

    let mut candidate = naive;
    // A DST gap is at most a few hours wide; step forward until we leave it.
    for _ in 0..=(4 * 60) {
        match tz.from_local_datetime(&candidate) {
            LocalResult::Single(dt) => return dt,
            LocalResult::Ambiguous(earliest, _) => return earliest,
            LocalResult::None => candidate += chrono::Duration::minutes(1),
        }
    }
    tz.from_utc_datetime(&naive)
}
