//! Wall-clock abstraction for the retention sweep.
//!
//! The sweep never reads the system clock directly: it asks a [`TimeProvider`],
//! so tests can pin "now" with a [`MockProvider`] and place object timestamps
//! precisely around the retention cutoff.

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr,
    clippy::future_not_send
)]

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::RwLock;
use std::time::Duration;

/// A UTC timestamp returned by a [`TimeProvider`] or reported by the object store
/// as an object's last-modified time.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct Time(DateTime<Utc>);

impl std::fmt::Debug for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl std::fmt::Display for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_rfc3339())
    }
}

impl Time {
    pub const MAX: Self = Self(DateTime::<Utc>::MAX_UTC);
    pub const MIN: Self = Self(DateTime::<Utc>::MIN_UTC);

    /// Makes a new `Time` from the provided [`DateTime<Utc>`]
    pub fn from_date_time(time: DateTime<Utc>) -> Self {
        Self(time)
    }

    /// Makes a new `Time` from the number of non-leap seconds since the UNIX epoch
    /// and the nanoseconds since the last whole second.
    ///
    /// Returns `None` if out of range
    pub fn from_timestamp(secs: i64, nanos: u32) -> Option<Self> {
        DateTime::from_timestamp(secs, nanos).map(Self)
    }

    /// Parses an RFC 3339 timestamp such as `2024-01-31T08:15:00Z`.
    pub fn from_rfc3339(s: &str) -> Result<Self, chrono::ParseError> {
        Ok(Self(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc)))
    }

    /// RFC 3339 representation with second precision, e.g. `2024-01-31T08:15:00Z`
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }

    /// Returns the number of non-leap seconds since January 1, 1970 UTC
    pub fn timestamp(&self) -> i64 {
        self.0.timestamp()
    }

    /// Returns the duration since the provided time or None if it would be negative
    pub fn checked_duration_since(&self, other: Self) -> Option<Duration> {
        self.0.signed_duration_since(other.0).to_std().ok()
    }

    /// Adds the given [`Duration`].
    ///
    /// Returns `None` if it would result in overflow
    pub fn checked_add(&self, duration: Duration) -> Option<Self> {
        let duration = chrono::Duration::from_std(duration).ok()?;
        Some(Self(self.0.checked_add_signed(duration)?))
    }

    /// Subtracts the given [`Duration`].
    ///
    /// Returns `None` if it would result in overflow
    pub fn checked_sub(&self, duration: Duration) -> Option<Self> {
        let duration = chrono::Duration::from_std(duration).ok()?;
        Some(Self(self.0.checked_sub_signed(duration)?))
    }

    /// Returns `Time` as a [`DateTime<Utc>`]
    pub fn date_time(&self) -> DateTime<Utc> {
        self.0
    }
}

impl From<DateTime<Utc>> for Time {
    fn from(time: DateTime<Utc>) -> Self {
        Self(time)
    }
}

pub trait TimeProvider: std::fmt::Debug + Send + Sync + 'static {
    /// Returns the current `Time`. No guarantees are made about monotonicity
    fn now(&self) -> Time;
}

/// A [`TimeProvider`] that uses [`Utc::now`] as a clock source
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProvider {}

impl SystemProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TimeProvider for SystemProvider {
    fn now(&self) -> Time {
        Time(Utc::now())
    }
}

/// A [`TimeProvider`] that returns a fixed `Time` that can be set by [`MockProvider::set`]
/// or advanced with [`MockProvider::inc`]
#[derive(Debug)]
pub struct MockProvider {
    now: RwLock<Time>,
}

impl MockProvider {
    pub fn new(start: Time) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    pub fn set(&self, time: Time) {
        *self.now.write() = time
    }

    /// Advances the clock, saturating at [`Time::MAX`].
    pub fn inc(&self, duration: Duration) -> Time {
        let mut now = self.now.write();
        *now = now.checked_add(duration).unwrap_or(Time::MAX);
        *now
    }
}

impl TimeProvider for MockProvider {
    fn now(&self) -> Time {
        *self.now.read()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    #[test]
    fn test_system_provider() {
        let provider = SystemProvider::new();
        let a = provider.now();
        std::thread::sleep(Duration::from_millis(20));
        let b = provider.now();

        let delta = b.checked_duration_since(a).unwrap();
        assert!(delta >= Duration::from_millis(10));
        assert!(delta < Duration::from_secs(5));
    }

    #[test]
    fn test_mock_provider() {
        let start = Time::from_rfc3339("2024-03-01T00:00:00Z").unwrap();
        let provider = MockProvider::new(start);
        assert_eq!(provider.now(), start);
        assert_eq!(provider.now(), start);

        let later = provider.inc(DAY);
        assert_eq!(later.to_rfc3339(), "2024-03-02T00:00:00Z");
        assert_eq!(provider.now(), later);

        provider.set(start);
        assert_eq!(provider.now(), start);

        provider.set(Time::MAX);
        assert_eq!(provider.inc(DAY), Time::MAX);
    }

    #[test]
    fn test_rfc3339() {
        let time = Time::from_rfc3339("2024-01-31T10:15:00+02:00").unwrap();
        assert_eq!(time.to_rfc3339(), "2024-01-31T08:15:00Z");
        assert_eq!(time.to_string(), "2024-01-31T08:15:00Z");
        assert_eq!(format!("{time:?}"), "2024-01-31T08:15:00Z");

        assert!(Time::from_rfc3339("yesterday").is_err());
    }

    #[test]
    fn test_checked_arithmetic() {
        let time = Time::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(
            time.checked_sub(90 * DAY).unwrap().timestamp(),
            1_700_000_000 - 90 * 24 * 60 * 60
        );
        assert_eq!(time.checked_add(DAY).unwrap().timestamp(), 1_700_086_400);

        assert!(Time::MAX.checked_add(Duration::from_secs(1)).is_none());
        assert!(Time::MIN.checked_sub(Duration::from_secs(1)).is_none());
        assert!(Time::MIN.checked_add(Duration::from_secs(1)).is_some());

        let huge = Duration::from_secs(u64::MAX);
        assert!(time.checked_sub(huge).is_none());
    }

    #[test]
    fn test_duration_since() {
        let earlier = Time::from_timestamp(100, 0).unwrap();
        let later = Time::from_timestamp(105, 500).unwrap();

        assert_eq!(
            later.checked_duration_since(earlier).unwrap(),
            Duration::new(5, 500)
        );
        assert!(earlier.checked_duration_since(later).is_none());
        assert!(Time::MAX.checked_duration_since(Time::MIN).is_some());
    }
}
