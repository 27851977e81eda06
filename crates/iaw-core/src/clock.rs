//! Time sources and lenient timestamp parsing
//!
//! Window and expiry logic (new-assets flag, shared-link expiry, Telegram
//! cache TTL) reads time through [`Clock`] so tests can drive it with
//! [`MockClock`] instead of sleeping.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use std::sync::{Arc, PoisonError, RwLock};

/// A source of the current time
pub trait Clock: Send + Sync {
    /// Current UTC time
    fn now(&self) -> DateTime<Utc>;
}

/// Shared handle to a clock
pub type SharedClock = Arc<dyn Clock>;

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A controllable time source for testing
#[derive(Debug, Clone)]
pub struct MockClock {
    current: Arc<RwLock<DateTime<Utc>>>,
}

impl MockClock {
    /// Create a new mock clock starting at the current time
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Create a new mock clock starting at a specific time
    pub fn at(time: DateTime<Utc>) -> Self {
        Self {
            current: Arc::new(RwLock::new(time)),
        }
    }

    /// Set the current mock time
    pub fn set(&self, time: DateTime<Utc>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = time;
    }

    /// Advance time by a duration
    pub fn advance(&self, duration: Duration) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = *current + duration;
    }

    /// Advance time by seconds
    pub fn advance_seconds(&self, seconds: i64) {
        self.advance(Duration::seconds(seconds));
    }

    /// Advance time by hours
    pub fn advance_hours(&self, hours: i64) {
        self.advance(Duration::hours(hours));
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Parse an upstream timestamp, returning `None` instead of failing
///
/// Accepts RFC 3339 (`2024-05-01T10:00:00.000Z`, `+02:00` offsets), naive
/// date-times (treated as UTC) and bare dates (midnight UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
