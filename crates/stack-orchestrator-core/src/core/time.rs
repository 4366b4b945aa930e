// stack-orchestrator-core/src/core/time.rs
// ============================================================================
// Module: Time
// Description: RFC3339Nano timestamps and an injectable clock.
// Purpose: Keep the scheduler and run identifier generation testable without
//          depending on the wall clock directly.
// Dependencies: time
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use std::fmt;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// A UTC timestamp with nanosecond precision, serialized as RFC3339Nano.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(#[serde(with = "timestamp_serde")] OffsetDateTime);

impl Timestamp {
    /// Wraps an existing [`OffsetDateTime`], normalizing to UTC.
    #[must_use]
    pub fn from_offset(dt: OffsetDateTime) -> Self {
        Self(dt.to_offset(time::UtcOffset::UTC))
    }

    /// Returns the underlying [`OffsetDateTime`].
    #[must_use]
    pub const fn as_offset(&self) -> OffsetDateTime {
        self.0
    }

    /// Formats the timestamp using the run identifier convention:
    /// `YYYY-MM-DDTHH-MM-SS.NNNNNNNNNZ`.
    #[must_use]
    pub fn as_run_id_format(&self) -> String {
        let dt = self.0;
        format!(
            "{:04}-{:02}-{:02}T{:02}-{:02}-{:02}.{:09}Z",
            dt.year(),
            u8::from(dt.month()),
            dt.day(),
            dt.hour(),
            dt.minute(),
            dt.second(),
            dt.nanosecond(),
        )
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.0.format(&Rfc3339).unwrap_or_else(|_| self.0.to_string())
        )
    }
}

mod timestamp_serde {
    use serde::Deserialize;
    use serde::Deserializer;
    use serde::Serializer;
    use time::OffsetDateTime;
    use time::format_description::well_known::Rfc3339;

    pub fn serialize<S: Serializer>(dt: &OffsetDateTime, ser: S) -> Result<S::Ok, S::Error> {
        let text = dt.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
        ser.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<OffsetDateTime, D::Error> {
        let text = String::deserialize(de)?;
        OffsetDateTime::parse(&text, &Rfc3339).map_err(serde::de::Error::custom)
    }
}

/// Injectable source of the current time, so the scheduler and run id
/// generation can be driven deterministically in tests.
pub trait Clock: Send + Sync {
    /// Returns the current UTC time.
    fn now(&self) -> Timestamp;
}

/// A [`Clock`] backed by the operating system's wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_offset(OffsetDateTime::now_utc())
    }
}

/// A [`Clock`] that always returns a fixed instant, for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Timestamp);

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use super::*;
    use time::macros::datetime;

    #[test]
    fn run_id_format_matches_convention() {
        let ts = Timestamp::from_offset(datetime!(2026-07-27 10:30:00.123456789 UTC));
        assert_eq!(ts.as_run_id_format(), "2026-07-27T10-30-00.123456789Z");
    }

    #[test]
    fn timestamp_round_trips_through_json() {
        let ts = Timestamp::from_offset(datetime!(2026-01-02 03:04:05.6 UTC));
        let json = serde_json::to_string(&ts).expect("serialize timestamp");
        let back: Timestamp = serde_json::from_str(&json).expect("deserialize timestamp");
        assert_eq!(back, ts);
    }

    #[test]
    fn fixed_clock_is_stable() {
        let ts = Timestamp::from_offset(datetime!(2026-01-01 00:00:00 UTC));
        let clock = FixedClock(ts);
        assert_eq!(clock.now(), clock.now());
    }
}
