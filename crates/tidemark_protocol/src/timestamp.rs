//! Nanosecond-precision timestamps.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const NANOS_PER_SECOND: u32 = 1_000_000_000;

/// A point in time as seconds plus nanoseconds since the Unix epoch.
///
/// Ordering is lexicographic on `(seconds, nanos)`, so two timestamps that
/// fall within the same second still compare correctly. Nanoseconds are
/// always kept in `0..1_000_000_000`, including for values decoded from
/// untrusted input.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(from = "RawTimestamp")]
pub struct Timestamp {
    seconds: i64,
    nanos: u32,
}

/// Wire shape of a [`Timestamp`] before normalization.
#[derive(Deserialize)]
struct RawTimestamp {
    seconds: i64,
    #[serde(default)]
    nanos: u32,
}

impl From<RawTimestamp> for Timestamp {
    fn from(raw: RawTimestamp) -> Self {
        Self::new(raw.seconds, raw.nanos)
    }
}

impl Timestamp {
    /// The Unix epoch, the floor for every cursor computation.
    pub const EPOCH: Timestamp = Timestamp {
        seconds: 0,
        nanos: 0,
    };

    /// Creates a timestamp, carrying excess nanoseconds into seconds.
    pub fn new(seconds: i64, nanos: u32) -> Self {
        let carry = i64::from(nanos / NANOS_PER_SECOND);
        Self {
            seconds: seconds.saturating_add(carry),
            nanos: nanos % NANOS_PER_SECOND,
        }
    }

    /// Creates a timestamp from whole seconds.
    pub fn from_secs(seconds: i64) -> Self {
        Self::new(seconds, 0)
    }

    /// Seconds since the epoch.
    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    /// Sub-second nanoseconds.
    pub fn nanos(&self) -> u32 {
        self.nanos
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        Self::from(SystemTime::now())
    }

    /// Subtracts a duration, flooring the result at [`Timestamp::EPOCH`].
    pub fn saturating_sub(self, duration: Duration) -> Self {
        let total = self.as_nanos_i128() - duration.as_nanos() as i128;
        if total <= 0 {
            return Self::EPOCH;
        }
        Self::from_nanos_i128(total)
    }

    /// Adds a duration, saturating at the largest representable instant.
    pub fn saturating_add(self, duration: Duration) -> Self {
        Self::from_nanos_i128(self.as_nanos_i128() + duration.as_nanos() as i128)
    }

    /// Returns the elapsed time from `earlier` to `self`, or zero if
    /// `earlier` is not actually earlier.
    pub fn duration_since(&self, earlier: Timestamp) -> Duration {
        let delta = self.as_nanos_i128() - earlier.as_nanos_i128();
        if delta <= 0 {
            return Duration::ZERO;
        }
        let delta = u128::try_from(delta).unwrap_or(0);
        let secs = u64::try_from(delta / u128::from(NANOS_PER_SECOND)).unwrap_or(u64::MAX);
        let nanos = (delta % u128::from(NANOS_PER_SECOND)) as u32;
        Duration::new(secs, nanos)
    }

    /// Converts to a `chrono` UTC datetime, if representable.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.seconds, self.nanos)
    }

    fn as_nanos_i128(&self) -> i128 {
        i128::from(self.seconds) * i128::from(NANOS_PER_SECOND) + i128::from(self.nanos)
    }

    fn from_nanos_i128(total: i128) -> Self {
        let per_sec = i128::from(NANOS_PER_SECOND);
        let seconds = total.div_euclid(per_sec);
        let nanos = total.rem_euclid(per_sec) as u32;
        match i64::try_from(seconds) {
            Ok(seconds) => Self { seconds, nanos },
            Err(_) if seconds > 0 => Self {
                seconds: i64::MAX,
                nanos: NANOS_PER_SECOND - 1,
            },
            Err(_) => Self {
                seconds: i64::MIN,
                nanos: 0,
            },
        }
    }
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(elapsed) => Self::EPOCH.saturating_add(elapsed),
            Err(err) => {
                let before = err.duration();
                Self::from_nanos_i128(-(before.as_nanos() as i128))
            }
        }
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self::new(value.timestamp(), value.timestamp_subsec_nanos())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(datetime) => f.write_str(&datetime.to_rfc3339_opts(SecondsFormat::Nanos, true)),
            None => write!(f, "{}.{:09}s", self.seconds, self.nanos),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_normalizes_nanos() {
        let ts = Timestamp::new(10, 2_500_000_000);
        assert_eq!(ts.seconds(), 12);
        assert_eq!(ts.nanos(), 500_000_000);
    }

    #[test]
    fn ordering_uses_sub_second_precision() {
        let a = Timestamp::new(100, 1);
        let b = Timestamp::new(100, 2);
        assert!(a < b);
        assert!(Timestamp::new(99, 999_999_999) < a);
    }

    #[test]
    fn saturating_sub_floors_at_epoch() {
        let ts = Timestamp::from_secs(60);
        assert_eq!(ts.saturating_sub(Duration::from_secs(3600)), Timestamp::EPOCH);
        assert_eq!(
            ts.saturating_sub(Duration::from_millis(500)),
            Timestamp::new(59, 500_000_000)
        );
    }

    #[test]
    fn add_and_duration_since() {
        let start = Timestamp::new(1_000, 900_000_000);
        let later = start.saturating_add(Duration::from_millis(250));
        assert_eq!(later, Timestamp::new(1_001, 150_000_000));
        assert_eq!(later.duration_since(start), Duration::from_millis(250));
        assert_eq!(start.duration_since(later), Duration::ZERO);
    }

    #[test]
    fn display_is_rfc3339() {
        let ts = Timestamp::new(0, 5);
        assert_eq!(ts.to_string(), "1970-01-01T00:00:00.000000005Z");
    }

    #[test]
    fn decoding_carries_excess_nanos() {
        let ts: Timestamp =
            serde_json::from_str(r#"{"seconds":10,"nanos":2000000000}"#).unwrap();
        assert_eq!(ts, Timestamp::from_secs(12));
        assert!(ts > Timestamp::from_secs(11));

        let encoded = serde_json::to_string(&Timestamp::new(5, 7)).unwrap();
        assert_eq!(encoded, r#"{"seconds":5,"nanos":7}"#);
        assert_eq!(
            serde_json::from_str::<Timestamp>(&encoded).unwrap(),
            Timestamp::new(5, 7)
        );
    }

    #[test]
    fn system_time_round_trip_precision() {
        let time = UNIX_EPOCH + Duration::new(1_700_000_000, 123_456_789);
        let ts = Timestamp::from(time);
        assert_eq!(ts.seconds(), 1_700_000_000);
        assert_eq!(ts.nanos(), 123_456_789);
    }
}
