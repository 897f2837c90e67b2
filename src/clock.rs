//! Monotonic "now" and `PnYnMnDTnHnMnS` duration parsing.
//!
//! Durations are pinned to fixed-length units rather than calendar ones:
//! a "month" is always 2629800 seconds and a "year" is always 31536000
//! seconds. Key lifetimes are compared in seconds, not calendar dates, so a
//! calendar-relative conversion (which would need a reference date) is not
//! appropriate here -- see DESIGN.md's note on `spec.md` §9.

use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use domain::base::Ttl;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// Seconds in a pinned, non-calendar month.
pub const SECONDS_PER_MONTH: u64 = 2_629_800;
/// Seconds in a pinned, non-calendar year.
pub const SECONDS_PER_YEAR: u64 = 31_536_000;

/// The due-date sentinel meaning "do not wake me for this task".
pub const WHENEVER: i64 = i64::MAX;

/// Source of wall-clock "now", in whole seconds since the Unix epoch.
///
/// Production code uses [`SystemClock`]; tests drive [`FakeClock`] directly
/// to exercise the admissibility windows of the enforcer and the
/// due-time ordering of the scheduler without sleeping in real time.
pub trait Clock: fmt::Debug + Send + Sync {
    fn now(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        jiff::Timestamp::now().as_second()
    }
}

/// A clock under explicit test control.
#[derive(Debug)]
pub struct FakeClock(AtomicI64);

impl FakeClock {
    pub fn new(now: i64) -> Self {
        Self(AtomicI64::new(now))
    }

    pub fn set(&self, now: i64) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) -> i64 {
        self.0.fetch_add(secs, Ordering::SeqCst) + secs
    }
}

impl Clock for FakeClock {
    fn now(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// A wrapper around [`Ttl`] with the same TOML-friendly (de)serialization as
/// [`TimeSpan`].
#[derive(Clone, Copy, Debug)]
pub struct TtlSpec {
    ttl: Ttl,
}

impl TtlSpec {
    pub fn from_secs(secs: u32) -> Self {
        Self {
            ttl: Ttl::from_secs(secs),
        }
    }

    pub fn ttl(&self) -> Ttl {
        self.ttl
    }
}

impl From<Ttl> for TtlSpec {
    fn from(value: Ttl) -> Self {
        Self { ttl: value }
    }
}

impl From<TtlSpec> for Ttl {
    fn from(value: TtlSpec) -> Self {
        value.ttl
    }
}

impl Serialize for TtlSpec {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        TimeSpan::from_secs(self.ttl.as_secs().into()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TtlSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let span = TimeSpan::deserialize(deserializer)?;
        match u32::try_from(span.as_secs()) {
            Ok(secs) => Ok(Self {
                ttl: Ttl::from_secs(secs),
            }),
            Err(_) => Err(<D::Error as de::Error>::custom(
                "value is too large for a TTL",
            )),
        }
    }
}

/// A wrapper around [`Duration`] with fancier (de)serialization: accepts a
/// bare integer of seconds, a "friendly" span ("10m", "2h 3m 4s"), or a full
/// `PnYnMnDTnHnMnS` ISO-8601 duration, with `Y` and `M` pinned to the fixed
/// constants above rather than resolved against a calendar.
#[derive(Copy, Clone, Debug)]
pub struct TimeSpan {
    duration: Duration,
}

impl Deref for TimeSpan {
    type Target = Duration;

    fn deref(&self) -> &Self::Target {
        &self.duration
    }
}

impl TimeSpan {
    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn from_secs(secs: u64) -> Self {
        Self {
            duration: Duration::from_secs(secs),
        }
    }
}

impl From<Duration> for TimeSpan {
    fn from(value: Duration) -> Self {
        TimeSpan { duration: value }
    }
}

impl PartialEq for TimeSpan {
    fn eq(&self, other: &Self) -> bool {
        self.duration == other.duration
    }
}

impl Eq for TimeSpan {}

impl PartialOrd for TimeSpan {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeSpan {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.duration.cmp(&other.duration)
    }
}

impl FromStr for TimeSpan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(secs) = s.parse::<u64>() {
            return Ok(Self::from_secs(secs));
        }

        if let Some(rest) = s.strip_prefix('P') {
            return parse_iso8601_duration(rest).map(Self::from_secs);
        }

        // "Friendly" short forms, e.g. "10m" or "2h 3m 4s".
        let span: jiff::Span = s
            .parse()
            .map_err(|e| format!("unable to parse {s} as timespan: {e}"))?;
        let signeddur = span
            .to_duration(jiff::SpanRelativeTo::days_are_24_hours())
            .map_err(|e| format!("unable to convert duration: {e}"))?;
        let duration = Duration::try_from(signeddur)
            .map_err(|e| format!("unable to convert duration: {e}"))?;
        Ok(Self { duration })
    }
}

/// Hand-rolled `PnYnMnDTnHnMnS` parser (the `P` prefix already stripped).
///
/// `Y` and `M` use the pinned [`SECONDS_PER_YEAR`]/[`SECONDS_PER_MONTH`]
/// constants rather than a calendar, so this never needs a reference date
/// and never errors on ambiguity the way a calendar-aware parser would.
fn parse_iso8601_duration(rest: &str) -> Result<u64, String> {
    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (rest, None),
    };

    let mut secs: u64 = 0;
    secs += scan_units(date_part, &[('Y', SECONDS_PER_YEAR), ('M', SECONDS_PER_MONTH), ('W', 604_800), ('D', 86_400)])?;
    if let Some(time_part) = time_part {
        secs += scan_units(time_part, &[('H', 3_600), ('M', 60), ('S', 1)])?;
    }
    Ok(secs)
}

fn scan_units(s: &str, units: &[(char, u64)]) -> Result<u64, String> {
    let mut total = 0u64;
    let mut num = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            num.push(c);
            continue;
        }
        let Some(&(_, factor)) = units.iter().find(|(unit, _)| *unit == c) else {
            return Err(format!("unexpected unit '{c}' in duration"));
        };
        let n: u64 = num
            .parse()
            .map_err(|_| format!("missing numeral before '{c}' in duration"))?;
        total += n
            .checked_mul(factor)
            .ok_or_else(|| "duration overflows seconds".to_string())?;
        num.clear();
    }
    if !num.is_empty() {
        return Err(format!("trailing numeral '{num}' with no unit in duration"));
    }
    Ok(total)
}

struct TimeSpanVisitor;

impl<'de> Visitor<'de> for TimeSpanVisitor {
    type Value = TimeSpan;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("string or int")
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        FromStr::from_str(value).map_err(E::custom)
    }

    fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(TimeSpan::from_secs(value.try_into().map_err(|_| {
            E::custom("duration value must be non-negative")
        })?))
    }

    fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(TimeSpan::from_secs(value))
    }
}

impl<'de> Deserialize<'de> for TimeSpan {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(TimeSpanVisitor)
    }
}

impl Serialize for TimeSpan {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.as_secs().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_short_forms() {
        #[derive(Debug, Deserialize)]
        struct Foo {
            val: Vec<TimeSpan>,
        }

        let foo: Foo = toml::from_str(
            r#"
            val = [10, "10", "10s", "10m", "10h", "10d", "10w", "2h 3m 4s"]
            "#,
        )
        .unwrap();
        assert_eq!(
            foo.val,
            vec![
                TimeSpan::from_secs(10),
                TimeSpan::from_secs(10),
                TimeSpan::from_secs(10),
                TimeSpan::from_secs(10 * 60),
                TimeSpan::from_secs(10 * 60 * 60),
                TimeSpan::from_secs(10 * 60 * 60 * 24),
                TimeSpan::from_secs(10 * 60 * 60 * 24 * 7),
                TimeSpan::from_secs((2 * 60 * 60) + (3 * 60) + 4),
            ]
        );
    }

    #[test]
    fn parse_iso8601_pins_month_and_year() {
        assert_eq!(
            TimeSpan::from_str("P1Y").unwrap(),
            TimeSpan::from_secs(SECONDS_PER_YEAR)
        );
        assert_eq!(
            TimeSpan::from_str("P1M").unwrap(),
            TimeSpan::from_secs(SECONDS_PER_MONTH)
        );
        assert_eq!(
            TimeSpan::from_str("P35DT2H30M").unwrap(),
            TimeSpan::from_secs((35 * 86_400) + (2 * 3_600) + (30 * 60))
        );
    }

    #[test]
    fn fake_clock_advances() {
        let clock = FakeClock::new(1_000);
        assert_eq!(clock.now(), 1_000);
        assert_eq!(clock.advance(3_900), 4_900);
        assert_eq!(clock.now(), 4_900);
    }
}
