// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2026 Vallés Puig, Ramon

//! Field mappings for [`CalendarInstant`](crate::CalendarInstant).
//!
//! - [`Fields`] is the *input* side: every entry is optional, and missing
//!   entries are filled either by the cascading reset, by the ambient clock
//!   (construction), or by the previous state (update).
//! - [`Snapshot`] is the *output* side: the complete mapping including the
//!   derived `epoch`, `isoweekday` and `isodatetime` entries.
//!
//! Both serialize with the short key names used on the wire
//! (`tz`, `epoch`, `isoweekday`, `isodatetime`), so a serialized snapshot can
//! be fed back as input.

use crate::error::{Error, Result};
use chrono::{DateTime, Datelike, FixedOffset, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A possibly-partial set of civil fields plus adjustment deltas.
///
/// ```
/// use suntimer::Fields;
///
/// let f = Fields::new().year(2015).cascade();
/// assert_eq!(f.month, Some(1));
/// assert_eq!(f.second, Some(0));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hour: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minute: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second: Option<i64>,
    /// Minutes east of UTC.
    #[serde(rename = "tz", default, skip_serializing_if = "Option::is_none")]
    pub tz_offset_minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second_delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minute_delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hour_delta: Option<i64>,
}

impl Fields {
    /// An empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn year(mut self, year: i64) -> Self {
        self.year = Some(year);
        self
    }

    pub fn month(mut self, month: i64) -> Self {
        self.month = Some(month);
        self
    }

    pub fn day(mut self, day: i64) -> Self {
        self.day = Some(day);
        self
    }

    pub fn hour(mut self, hour: i64) -> Self {
        self.hour = Some(hour);
        self
    }

    pub fn minute(mut self, minute: i64) -> Self {
        self.minute = Some(minute);
        self
    }

    pub fn second(mut self, second: i64) -> Self {
        self.second = Some(second);
        self
    }

    pub fn tz_offset_minutes(mut self, minutes: i64) -> Self {
        self.tz_offset_minutes = Some(minutes);
        self
    }

    pub fn second_delta(mut self, delta: i64) -> Self {
        self.second_delta = Some(delta);
        self
    }

    pub fn minute_delta(mut self, delta: i64) -> Self {
        self.minute_delta = Some(delta);
        self
    }

    pub fn hour_delta(mut self, delta: i64) -> Self {
        self.hour_delta = Some(delta);
        self
    }

    /// Applies the cascading reset: a field that is present forces the next
    /// more granular field to the start of its unit when that field is
    /// absent.  The chain runs year → month → day → hour → minute → second,
    /// so a forced field forces the next one in turn.
    pub fn cascade(mut self) -> Self {
        if self.year.is_some() && self.month.is_none() {
            self.month = Some(1);
        }
        if self.month.is_some() && self.day.is_none() {
            self.day = Some(1);
        }
        if self.day.is_some() && self.hour.is_none() {
            self.hour = Some(0);
        }
        if self.hour.is_some() && self.minute.is_none() {
            self.minute = Some(0);
        }
        if self.minute.is_some() && self.second.is_none() {
            self.second = Some(0);
        }
        self
    }

    /// Fills every absent entry of `self` from `base`.
    pub fn merge_over(self, base: &Fields) -> Self {
        Self {
            year: self.year.or(base.year),
            month: self.month.or(base.month),
            day: self.day.or(base.day),
            hour: self.hour.or(base.hour),
            minute: self.minute.or(base.minute),
            second: self.second.or(base.second),
            tz_offset_minutes: self.tz_offset_minutes.or(base.tz_offset_minutes),
            second_delta: self.second_delta.or(base.second_delta),
            minute_delta: self.minute_delta.or(base.minute_delta),
            hour_delta: self.hour_delta.or(base.hour_delta),
        }
    }

    /// The civil fields and offset of `when`, with zero deltas.
    pub fn from_datetime(when: &DateTime<FixedOffset>) -> Self {
        Self {
            year: Some(when.year() as i64),
            month: Some(when.month() as i64),
            day: Some(when.day() as i64),
            hour: Some(when.hour() as i64),
            minute: Some(when.minute() as i64),
            second: Some(when.second() as i64),
            tz_offset_minutes: Some((when.offset().local_minus_utc() / 60) as i64),
            second_delta: Some(0),
            minute_delta: Some(0),
            hour_delta: Some(0),
        }
    }

    /// Reads a loosely typed JSON object.
    ///
    /// Every recognised entry must be a whole number (`2015` or `2015.0`);
    /// a string, fraction, boolean or nested value is an
    /// [`Error::InvalidField`].  `null` counts as absent.  Derived entries
    /// (`epoch`, `isoweekday`, `isodatetime`) and unknown keys are ignored.
    pub fn from_json(map: &Map<String, Value>) -> Result<Self> {
        Ok(Self {
            year: whole(map, "year")?,
            month: whole(map, "month")?,
            day: whole(map, "day")?,
            hour: whole(map, "hour")?,
            minute: whole(map, "minute")?,
            second: whole(map, "second")?,
            tz_offset_minutes: whole(map, "tz")?,
            second_delta: whole(map, "second_delta")?,
            minute_delta: whole(map, "minute_delta")?,
            hour_delta: whole(map, "hour_delta")?,
        })
    }
}

fn whole(map: &Map<String, Value>, field: &'static str) -> Result<Option<i64>> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            if let Some(v) = n.as_i64() {
                return Ok(Some(v));
            }
            match n.as_f64() {
                Some(v) if v.fract() == 0.0 && v.abs() < i64::MAX as f64 => Ok(Some(v as i64)),
                _ => Err(Error::InvalidField { field }),
            }
        }
        Some(_) => Err(Error::InvalidField { field }),
    }
}

/// The complete field mapping of a calendar instant.
///
/// Deltas are always zero here: they are folded into the civil fields as
/// soon as the instant is derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    #[serde(rename = "tz")]
    pub tz_offset_minutes: i32,
    pub second_delta: i64,
    pub minute_delta: i64,
    pub hour_delta: i64,
    /// Seconds since the Unix epoch.
    #[serde(rename = "epoch")]
    pub epoch_seconds: f64,
    /// 1 = Monday … 7 = Sunday.
    #[serde(rename = "isoweekday")]
    pub iso_weekday: u32,
    /// UTC form with millisecond precision, e.g. `2013-12-15T14:30:01.000Z`.
    #[serde(rename = "isodatetime")]
    pub iso8601: String,
}

impl From<&Snapshot> for Fields {
    fn from(s: &Snapshot) -> Self {
        Self {
            year: Some(s.year as i64),
            month: Some(s.month as i64),
            day: Some(s.day as i64),
            hour: Some(s.hour as i64),
            minute: Some(s.minute as i64),
            second: Some(s.second as i64),
            tz_offset_minutes: Some(s.tz_offset_minutes as i64),
            second_delta: Some(s.second_delta),
            minute_delta: Some(s.minute_delta),
            hour_delta: Some(s.hour_delta),
        }
    }
}

impl From<Snapshot> for Fields {
    fn from(s: Snapshot) -> Self {
        Self::from(&s)
    }
}
