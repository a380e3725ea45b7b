// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2026 Vallés Puig, Ramon

//! Error type shared by calendar instants and the solar scheduler.

use crate::solar::SolarEvent;
use chrono::NaiveDate;

/// Errors raised by [`CalendarInstant`](crate::CalendarInstant) and
/// [`SolarScheduler`](crate::SolarScheduler).
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The argument has a shape that is never accepted (number, array,
    /// boolean, or a calendar instant handed to the constructor).
    #[error("invalid argument shape: {0}")]
    InvalidShape(String),

    /// A civil field resolved to something other than a whole number.
    #[error("expected {field} to be an integer")]
    InvalidField { field: &'static str },

    /// The civil fields or an ISO string do not describe a real instant.
    #[error("invalid date: {0}")]
    InvalidDate(String),

    /// The calculator has no instant for this event on this date.
    #[error("no {event} on {date} at the configured coordinates")]
    UnresolvableEvent { event: SolarEvent, date: NaiveDate },

    /// A solar event name that is not one of the fourteen known kinds.
    #[error("unknown solar event `{0}`")]
    UnknownEvent(String),

    #[error("config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
