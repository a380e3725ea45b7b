// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2026 Vallés Puig, Ramon

//! Solar events and the calculator that places them in time.
//!
//! # Events
//!
//! | Kind | Sun altitude | Name |
//! |------|--------------|------|
//! | [`SolarEvent::SolarNoon`] | highest | `solarNoon` |
//! | [`SolarEvent::Nadir`] | lowest | `nadir` |
//! | [`SolarEvent::Sunrise`] / [`SolarEvent::Sunset`] | −0.833° | `sunrise` / `sunset` |
//! | [`SolarEvent::SunriseEnd`] / [`SolarEvent::SunsetStart`] | −0.3° | `sunriseEnd` / `sunsetStart` |
//! | [`SolarEvent::Dawn`] / [`SolarEvent::Dusk`] | −6° | `dawn` / `dusk` |
//! | [`SolarEvent::NauticalDawn`] / [`SolarEvent::NauticalDusk`] | −12° | `nauticalDawn` / `nauticalDusk` |
//! | [`SolarEvent::NightEnd`] / [`SolarEvent::Night`] | −18° | `nightEnd` / `night` |
//! | [`SolarEvent::GoldenHourEnd`] / [`SolarEvent::GoldenHour`] | +6° | `goldenHourEnd` / `goldenHour` |
//!
//! # Calculator
//!
//! [`SunCalc`] runs the NREL solar position algorithm (`solar_positioning`)
//! once per altitude threshold.  Solar noon is the transit and nadir lies
//! twelve hours before it.  Altitude crossings that do not happen on a given
//! day (polar day, polar night) are left out of [`SolarTimes`].

use crate::error::Error;
use crate::julian::JulianDay;
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeDelta, Utc};
use qtty::{Days, Second};
use serde::{Deserialize, Serialize};
use solar_positioning::{spa, SunriseResult};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One of the fourteen named solar events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SolarEvent {
    SolarNoon,
    Nadir,
    Sunrise,
    Sunset,
    SunriseEnd,
    SunsetStart,
    Dawn,
    Dusk,
    NauticalDawn,
    NauticalDusk,
    NightEnd,
    Night,
    GoldenHourEnd,
    GoldenHour,
}

impl SolarEvent {
    pub const ALL: [SolarEvent; 14] = [
        SolarEvent::SolarNoon,
        SolarEvent::Nadir,
        SolarEvent::Sunrise,
        SolarEvent::Sunset,
        SolarEvent::SunriseEnd,
        SolarEvent::SunsetStart,
        SolarEvent::Dawn,
        SolarEvent::Dusk,
        SolarEvent::NauticalDawn,
        SolarEvent::NauticalDusk,
        SolarEvent::NightEnd,
        SolarEvent::Night,
        SolarEvent::GoldenHourEnd,
        SolarEvent::GoldenHour,
    ];

    /// The key under which the calculator reports this event.
    pub const fn name(self) -> &'static str {
        match self {
            SolarEvent::SolarNoon => "solarNoon",
            SolarEvent::Nadir => "nadir",
            SolarEvent::Sunrise => "sunrise",
            SolarEvent::Sunset => "sunset",
            SolarEvent::SunriseEnd => "sunriseEnd",
            SolarEvent::SunsetStart => "sunsetStart",
            SolarEvent::Dawn => "dawn",
            SolarEvent::Dusk => "dusk",
            SolarEvent::NauticalDawn => "nauticalDawn",
            SolarEvent::NauticalDusk => "nauticalDusk",
            SolarEvent::NightEnd => "nightEnd",
            SolarEvent::Night => "night",
            SolarEvent::GoldenHourEnd => "goldenHourEnd",
            SolarEvent::GoldenHour => "goldenHour",
        }
    }
}

impl fmt::Display for SolarEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SolarEvent {
    type Err = Error;

    /// Accepts the camelCase name (`sunriseEnd`) or its snake_case
    /// spelling (`sunrise_end`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.chars().filter(|c| *c != '_').collect();
        SolarEvent::ALL
            .into_iter()
            .find(|event| event.name().eq_ignore_ascii_case(&compact))
            .ok_or_else(|| Error::UnknownEvent(s.to_owned()))
    }
}

/// A geographic position in degrees (north and east positive).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// The instants of every solar event the calculator could place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolarTimes {
    times: BTreeMap<SolarEvent, DateTime<Utc>>,
}

impl SolarTimes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, event: SolarEvent, when: DateTime<Utc>) {
        self.times.insert(event, when);
    }

    /// `None` when the event does not occur on that day.
    pub fn get(&self, event: SolarEvent) -> Option<DateTime<Utc>> {
        self.times.get(&event).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SolarEvent, DateTime<Utc>)> + '_ {
        self.times.iter().map(|(event, when)| (*event, *when))
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

/// Converts a date and a position into solar event instants.
pub trait SolarCalculator: Send + Sync {
    /// Solar events for the solar day containing `date`.
    fn times(&self, date: DateTime<Utc>, at: Coordinates) -> SolarTimes;
}

// ═══════════════════════════════════════════════════════════════════════════
// SunCalc
// ═══════════════════════════════════════════════════════════════════════════

/// ΔT (TT − UT) in seconds, fixed for every date.  An error of a few
/// seconds here shifts the events by far less than a second.
const DELTA_T: f64 = 69.0;

/// Altitude thresholds (degrees) with their morning and evening events.
const ALTITUDES: [(f64, SolarEvent, SolarEvent); 6] = [
    (-0.833, SolarEvent::Sunrise, SolarEvent::Sunset),
    (-0.3, SolarEvent::SunriseEnd, SolarEvent::SunsetStart),
    (-6.0, SolarEvent::Dawn, SolarEvent::Dusk),
    (-12.0, SolarEvent::NauticalDawn, SolarEvent::NauticalDusk),
    (-18.0, SolarEvent::NightEnd, SolarEvent::Night),
    (6.0, SolarEvent::GoldenHourEnd, SolarEvent::GoldenHour),
];

/// Solar event calculator on the NREL solar position algorithm.
#[derive(Debug, Default, Clone, Copy)]
pub struct SunCalc;

impl SunCalc {
    /// UTC calendar date of the solar day that contains `date` at `longitude`.
    fn solar_date(date: DateTime<Utc>, longitude: f64) -> NaiveDate {
        let shift = Days::new(longitude / 360.0).to::<Second>().value().round() as i64;
        date.checked_add_signed(TimeDelta::seconds(shift))
            .unwrap_or(date)
            .date_naive()
    }

    /// Records `event` at `hours` after `midnight`; the algorithm reports
    /// hours outside `0..24` for events on the neighbouring UTC dates.
    fn place(times: &mut SolarTimes, event: SolarEvent, midnight: JulianDay, hours: f64) {
        if let Some(when) = (midnight + Days::new(hours / 24.0)).to_utc() {
            times.insert(event, when);
        }
    }
}

impl SolarCalculator for SunCalc {
    fn times(&self, date: DateTime<Utc>, at: Coordinates) -> SolarTimes {
        let day = Self::solar_date(date, at.longitude);
        let midnight = JulianDay::from_utc(day.and_time(NaiveTime::MIN).and_utc());
        let mut times = SolarTimes::new();

        for (index, (altitude, rise, set)) in ALTITUDES.into_iter().enumerate() {
            let result = match spa::sunrise_sunset_utc(
                day.year(),
                day.month(),
                day.day(),
                at.latitude,
                at.longitude,
                DELTA_T,
                altitude,
            ) {
                Ok(result) => result,
                Err(err) => {
                    tracing::warn!(
                        latitude = at.latitude,
                        longitude = at.longitude,
                        %day,
                        error = %err,
                        "solar position failed"
                    );
                    break;
                }
            };

            let transit = match result {
                SunriseResult::RegularDay {
                    sunrise,
                    transit,
                    sunset,
                } => {
                    Self::place(&mut times, rise, midnight, sunrise.hours());
                    Self::place(&mut times, set, midnight, sunset.hours());
                    transit.hours()
                }
                SunriseResult::AllDay { transit } | SunriseResult::AllNight { transit } => {
                    transit.hours()
                }
            };

            if index == 0 {
                Self::place(&mut times, SolarEvent::SolarNoon, midnight, transit);
                Self::place(&mut times, SolarEvent::Nadir, midnight, transit - 12.0);
            }
        }

        times
    }
}
