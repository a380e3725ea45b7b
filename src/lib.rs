// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2026 Vallés Puig, Ramon

//! Calendar instants and solar event scheduling.
//!
//! # Core types
//!
//! - [`CalendarInstant`]: civil date-time plus UTC offset, kept consistent
//!   with its epoch seconds, ISO weekday and ISO-8601 form.
//! - [`Fields`] / [`Snapshot`]: partial input mapping and full output mapping.
//! - [`Clock`] / [`AmbientClock`]: injected source of "now" with a swappable
//!   reference for reproducible runs.
//! - [`SolarScheduler`]: keeps a trigger armed for the next [`SolarEvent`]
//!   and re-arms it daily.
//! - [`Timer`] / [`ManualTimer`]: trigger registration and dispatch.
//! - [`SolarCalculator`] / [`SunCalc`]: solar event instants for a date and
//!   a [`Coordinates`].
//!
//! # Quick example
//!
//! ```
//! use std::sync::Arc;
//! use chrono::{DateTime, TimeDelta};
//! use suntimer::{AmbientClock, ManualTimer, SchedulerContext, SolarEvent};
//!
//! let start = DateTime::parse_from_rfc3339("2015-06-01T10:00:00-04:00").unwrap();
//! let clock = AmbientClock::fixed(start);
//! let timer = Arc::new(ManualTimer::new(clock.clone()));
//! let sunset = SolarEvent::Sunset
//!     .schedule()
//!     .start(SchedulerContext::new(timer.clone(), Arc::new(clock)))
//!     .unwrap();
//!
//! assert_eq!(sunset.next_instant().day, 1);
//! timer.advance_by(TimeDelta::days(1));
//! assert_eq!(sunset.next_instant().day, 2);
//! ```

mod clock;
mod config;
mod datetime;
mod error;
mod fields;
mod julian;
mod scheduler;
mod solar;
mod timer;

// ── Re-exports ────────────────────────────────────────────────────────────

pub use clock::{AmbientClock, Clock, SystemClock};
pub use config::Config;
pub use datetime::{CalendarInstant, Input};
pub use error::{Error, Result};
pub use fields::{Fields, Snapshot};
pub use julian::JulianDay;
pub use scheduler::{
    Delta, SchedulerContext, SolarSchedule, SolarScheduler, HEARTBEAT_ID, TIMER_ID,
};
pub use solar::{Coordinates, SolarCalculator, SolarEvent, SolarTimes, SunCalc};
pub use timer::{Firing, Handler, ManualTimer, Task, Timer, Trigger};
