// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2026 Vallés Puig, Ramon

//! Sources of "now".
//!
//! Every operation that needs the current time takes a [`Clock`] instead of
//! reading the system clock directly.  [`AmbientClock`] is the swappable
//! variant: it reads the system clock until a fixed reference instant is
//! installed, which makes construction of calendar instants deterministic in
//! tests.

use chrono::{DateTime, FixedOffset, Local};
use parking_lot::RwLock;
use std::sync::Arc;

/// A capability that reports the current instant together with the local
/// UTC offset in effect at that instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// The real system clock in the process's local time zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// A clock with a nullable reference override.
///
/// Clones share the same override, so one handle can be given to the
/// components under test while another is kept to move time around.
///
/// ```
/// use chrono::DateTime;
/// use suntimer::{AmbientClock, Clock};
///
/// let clock = AmbientClock::new();
/// let fixed = DateTime::parse_from_rfc3339("2013-12-15T09:30:01-05:00").unwrap();
/// clock.set_reference(fixed);
/// assert_eq!(clock.now(), fixed);
///
/// clock.clear_reference();
/// assert!(clock.reference().is_none());
/// ```
#[derive(Debug, Default, Clone)]
pub struct AmbientClock {
    reference: Arc<RwLock<Option<DateTime<FixedOffset>>>>,
}

impl AmbientClock {
    /// A clock with no reference installed (reads the system clock).
    pub fn new() -> Self {
        Self::default()
    }

    /// A clock pinned to `reference` from the start.
    pub fn fixed(reference: DateTime<FixedOffset>) -> Self {
        let clock = Self::new();
        clock.set_reference(reference);
        clock
    }

    pub fn set_reference(&self, reference: DateTime<FixedOffset>) {
        *self.reference.write() = Some(reference);
    }

    pub fn clear_reference(&self) {
        *self.reference.write() = None;
    }

    pub fn reference(&self) -> Option<DateTime<FixedOffset>> {
        *self.reference.read()
    }
}

impl Clock for AmbientClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.reference().unwrap_or_else(|| SystemClock.now())
    }
}
