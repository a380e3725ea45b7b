// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2026 Vallés Puig, Ramon

//! Calendar instants.
//!
//! A [`CalendarInstant`] is a civil date-time plus UTC offset, kept in sync
//! with three derived values: seconds since the Unix epoch, the ISO weekday
//! and the UTC ISO-8601 string.  The derived values are recomputed together
//! every time the instant is built or updated; they are never set directly.
//!
//! # Construction
//!
//! [`CalendarInstant::new`] accepts any [`Input`]:
//!
//! | Input | Result |
//! |-------|--------|
//! | [`Input::Now`] | the clock's current time |
//! | [`Input::DateTime`] | that absolute time |
//! | [`Input::Iso`] | the parsed ISO-8601 time |
//! | [`Input::Fields`] | cascading reset, then the clock for anything left |
//! | [`Input::Json`] | dispatched on the JSON type; numbers and arrays are rejected |
//! | [`Input::Instant`] | rejected, pass [`CalendarInstant::get`] instead |
//!
//! Civil fields have second resolution: sub-second parts of an absolute
//! input are dropped.

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::fields::{Fields, Snapshot};
use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, TimeDelta, TimeZone,
    Timelike, Utc,
};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// Every argument shape accepted by construction, [`set`](CalendarInstant::set)
/// and [`compare`](CalendarInstant::compare).
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// No argument.
    Now,
    DateTime(DateTime<FixedOffset>),
    Iso(String),
    Fields(Fields),
    /// An existing instant.  Only `set` and `compare` accept it.
    Instant(Box<CalendarInstant>),
    /// Loosely typed input: `null`, a string, or an object of fields.
    Json(Value),
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Input {
    fn from(when: DateTime<Tz>) -> Self {
        Input::DateTime(when.fixed_offset())
    }
}

impl From<&str> for Input {
    fn from(iso: &str) -> Self {
        Input::Iso(iso.to_owned())
    }
}

impl From<String> for Input {
    fn from(iso: String) -> Self {
        Input::Iso(iso)
    }
}

impl From<Fields> for Input {
    fn from(fields: Fields) -> Self {
        Input::Fields(fields)
    }
}

impl From<Snapshot> for Input {
    fn from(snapshot: Snapshot) -> Self {
        Input::Fields(snapshot.into())
    }
}

impl From<CalendarInstant> for Input {
    fn from(instant: CalendarInstant) -> Self {
        Input::Instant(Box::new(instant))
    }
}

impl From<&CalendarInstant> for Input {
    fn from(instant: &CalendarInstant) -> Self {
        Input::Instant(Box::new(instant.clone()))
    }
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        Input::Json(value)
    }
}

impl From<Option<Value>> for Input {
    fn from(value: Option<Value>) -> Self {
        value.map_or(Input::Now, Input::Json)
    }
}

/// A civil date-time with UTC offset and its derived absolute instant.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarInstant {
    when: DateTime<FixedOffset>,
    fields: Snapshot,
}

impl CalendarInstant {
    /// Builds an instant from any accepted input.
    ///
    /// `clock` supplies "now" for [`Input::Now`], for fields not forced by
    /// the cascading reset, and for ISO strings without an offset.
    ///
    /// ```
    /// use chrono::DateTime;
    /// use suntimer::{AmbientClock, CalendarInstant, Fields};
    ///
    /// let clock = AmbientClock::fixed(
    ///     DateTime::parse_from_rfc3339("2013-12-15T09:30:01-05:00").unwrap(),
    /// );
    /// let dt = CalendarInstant::new(Fields::new().month(3), &clock).unwrap();
    /// let f = dt.get();
    /// assert_eq!((f.year, f.month, f.day, f.hour), (2013, 3, 1, 0));
    /// ```
    pub fn new(input: impl Into<Input>, clock: &dyn Clock) -> Result<Self> {
        match input.into() {
            Input::Now => Ok(Self::now(clock)),
            Input::DateTime(when) => Ok(Self::from_datetime(when)),
            Input::Iso(iso) => Self::parse(&iso, clock),
            Input::Fields(fields) => Self::from_fields(fields, clock),
            Input::Instant(_) => Err(Error::InvalidShape(
                "a CalendarInstant cannot be re-wrapped; pass its field mapping instead".into(),
            )),
            Input::Json(value) => match value {
                Value::Null => Ok(Self::now(clock)),
                Value::String(iso) => Self::parse(&iso, clock),
                Value::Object(map) => Self::from_fields(Fields::from_json(&map)?, clock),
                other => Err(Error::InvalidShape(describe(&other))),
            },
        }
    }

    /// The clock's current time.
    pub fn now(clock: &dyn Clock) -> Self {
        Self::from_datetime(clock.now())
    }

    /// Wraps an absolute time, keeping its offset.
    pub fn from_datetime<Tz: TimeZone>(when: DateTime<Tz>) -> Self {
        let when = when.fixed_offset();
        let when = when.with_nanosecond(0).unwrap_or(when);
        Self {
            fields: snapshot_of(&when),
            when,
        }
    }

    /// Parses an ISO-8601 string.
    ///
    /// Accepts RFC 3339, `YYYY-MM-DDThh:mm:ss±HHMM`, a local date-time
    /// without offset (read in the clock's current offset) and a bare date
    /// (midnight UTC).
    pub fn parse(iso: &str, clock: &dyn Clock) -> Result<Self> {
        parse_iso(iso, clock).map(Self::from_datetime)
    }

    /// Builds an instant from a partial field mapping.
    ///
    /// The cascading reset runs first against the raw mapping; whatever is
    /// still absent afterwards comes from the clock.
    pub fn from_fields(fields: Fields, clock: &dyn Clock) -> Result<Self> {
        let ambient = Fields::from_datetime(&clock.now());
        resolve(&fields.cascade().merge_over(&ambient))
    }

    /// Updates the instant in place.
    ///
    /// The incoming fields are merged flat over the current mapping, without
    /// a cascading reset, and everything is re-derived.  [`Input::Now`] (or
    /// JSON `null`) re-derives from the unchanged fields.  On error `self` is
    /// left untouched.
    pub fn set(&mut self, input: impl Into<Input>, clock: &dyn Clock) -> Result<()> {
        let incoming = match input.into() {
            Input::Now => Fields::new(),
            Input::DateTime(when) => Fields::from(Self::from_datetime(when).fields),
            Input::Iso(iso) => Fields::from(Self::parse(&iso, clock)?.fields),
            Input::Fields(fields) => fields,
            Input::Instant(other) => Fields::from(&other.fields),
            Input::Json(value) => match value {
                Value::Null => Fields::new(),
                Value::String(iso) => Fields::from(Self::parse(&iso, clock)?.fields),
                Value::Object(map) => Fields::from_json(&map)?,
                other => return Err(Error::InvalidShape(describe(&other))),
            },
        };

        *self = resolve(&incoming.merge_over(&Fields::from(&self.fields)))?;
        Ok(())
    }

    /// A detached copy of the full field mapping, derived entries included.
    #[inline]
    pub fn get(&self) -> Snapshot {
        self.fields.clone()
    }

    /// Borrowed view of the field mapping.
    #[inline]
    pub fn fields(&self) -> &Snapshot {
        &self.fields
    }

    /// The absolute time, in UTC.
    #[inline]
    pub fn date(&self) -> DateTime<Utc> {
        self.when.with_timezone(&Utc)
    }

    /// The absolute time in the instant's own offset.
    #[inline]
    pub fn to_datetime(&self) -> DateTime<FixedOffset> {
        self.when
    }

    #[inline]
    pub fn epoch_seconds(&self) -> f64 {
        self.fields.epoch_seconds
    }

    #[inline]
    pub fn iso_weekday(&self) -> u32 {
        self.fields.iso_weekday
    }

    #[inline]
    pub fn iso8601(&self) -> &str {
        &self.fields.iso8601
    }

    /// Signed difference in seconds, `self − other`.
    ///
    /// [`Input::Now`] compares against the clock (sub-second precision).
    /// Any other input is read the way [`new`](Self::new) reads it, except
    /// that an existing instant is accepted.
    ///
    /// ```
    /// use chrono::DateTime;
    /// use suntimer::{CalendarInstant, SystemClock};
    ///
    /// let a = CalendarInstant::from_datetime(DateTime::from_timestamp(100, 0).unwrap());
    /// let b = CalendarInstant::from_datetime(DateTime::from_timestamp(150, 0).unwrap());
    /// assert_eq!(a.compare(&b, &SystemClock).unwrap(), -50.0);
    /// ```
    pub fn compare(&self, other: impl Into<Input>, clock: &dyn Clock) -> Result<f64> {
        let theirs = match other.into() {
            Input::Now | Input::Json(Value::Null) => epoch_of(&clock.now()),
            Input::Instant(other) => other.epoch_seconds(),
            input => Self::new(input, clock)?.epoch_seconds(),
        };
        Ok(self.epoch_seconds() - theirs)
    }
}

impl fmt::Display for CalendarInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fields.iso8601)
    }
}

impl PartialOrd for CalendarInstant {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.epoch_seconds().partial_cmp(&other.epoch_seconds())
    }
}

impl Serialize for CalendarInstant {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.fields.serialize(serializer)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Derivation
// ═══════════════════════════════════════════════════════════════════════════

/// Zero-padded two-digit component.
fn format2(d: i64) -> String {
    format!("{d:02}")
}

/// Rejects components that do not fit their two-digit slot in the canonical
/// form, which would otherwise be truncated into a different date.
fn two_digits(value: i64, what: &str) -> Result<i64> {
    if (0..100).contains(&value) {
        Ok(value)
    } else {
        Err(Error::InvalidDate(format!("{what} {value} out of range")))
    }
}

/// Canonical `YYYY-MM-DDThh:mm:ss±HHMM` form of a complete mapping.
fn canonical(
    year: i64,
    month: i64,
    day: i64,
    hour: i64,
    minute: i64,
    second: i64,
    tz: i64,
) -> String {
    format!(
        "{}-{}-{}T{}:{}:{}{}{}{}",
        year,
        format2(month),
        format2(day),
        format2(hour),
        format2(minute),
        format2(second),
        if tz < 0 { '-' } else { '+' },
        format2(tz.abs() / 60),
        format2(tz.abs() % 60),
    )
}

fn required(value: Option<i64>, field: &'static str) -> Result<i64> {
    value.ok_or(Error::InvalidField { field })
}

/// Resolves a complete mapping: canonical string, parse, apply deltas, and
/// fold the result back into civil fields.
fn resolve(fields: &Fields) -> Result<CalendarInstant> {
    let year = required(fields.year, "year")?;
    let month = required(fields.month, "month")?;
    let day = required(fields.day, "day")?;
    let hour = required(fields.hour, "hour")?;
    let minute = required(fields.minute, "minute")?;
    let second = required(fields.second, "second")?;
    let tz = fields.tz_offset_minutes.unwrap_or(0);

    for (value, what) in [
        (month, "month"),
        (day, "day"),
        (hour, "hour"),
        (minute, "minute"),
        (second, "second"),
    ] {
        two_digits(value, what)?;
    }
    if tz.abs() >= 24 * 60 {
        return Err(Error::InvalidDate(format!("utc offset {tz} min out of range")));
    }

    let text = canonical(year, month, day, hour, minute, second, tz);
    let mut when = DateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%z")
        .map_err(|e| Error::InvalidDate(format!("{text}: {e}")))?;

    let delta = fields
        .second_delta
        .unwrap_or(0)
        .checked_add(fields.minute_delta.unwrap_or(0).saturating_mul(60))
        .and_then(|d| d.checked_add(fields.hour_delta.unwrap_or(0).saturating_mul(3600)))
        .ok_or_else(|| Error::InvalidDate("delta overflow".into()))?;
    if delta != 0 {
        when = TimeDelta::try_seconds(delta)
            .and_then(|d| when.checked_add_signed(d))
            .ok_or_else(|| Error::InvalidDate(format!("{text} shifted by {delta}s")))?;
    }

    Ok(CalendarInstant::from_datetime(when))
}

fn snapshot_of(when: &DateTime<FixedOffset>) -> Snapshot {
    Snapshot {
        year: when.year(),
        month: when.month(),
        day: when.day(),
        hour: when.hour(),
        minute: when.minute(),
        second: when.second(),
        tz_offset_minutes: when.offset().local_minus_utc() / 60,
        second_delta: 0,
        minute_delta: 0,
        hour_delta: 0,
        epoch_seconds: epoch_of(when),
        iso_weekday: when.weekday().number_from_monday(),
        iso8601: when
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}

fn epoch_of<Tz: TimeZone>(when: &DateTime<Tz>) -> f64 {
    when.timestamp() as f64 + when.timestamp_subsec_nanos() as f64 / 1e9
}

fn parse_iso(iso: &str, clock: &dyn Clock) -> Result<DateTime<FixedOffset>> {
    let iso = iso.trim();
    if let Ok(when) = DateTime::parse_from_rfc3339(iso) {
        return Ok(when);
    }
    if let Ok(when) = DateTime::parse_from_str(iso, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Ok(when);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(iso, "%Y-%m-%dT%H:%M:%S%.f") {
        let offset = *clock.now().offset();
        return offset
            .from_local_datetime(&naive)
            .single()
            .ok_or_else(|| Error::InvalidDate(iso.to_owned()));
    }
    if let Ok(date) = NaiveDate::parse_from_str(iso, "%Y-%m-%d") {
        return Ok(date.and_time(chrono::NaiveTime::MIN).and_utc().fixed_offset());
    }
    Err(Error::InvalidDate(iso.to_owned()))
}

fn describe(value: &Value) -> String {
    let kind = match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    format!("CalendarInstant does not accept a {kind}")
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════
