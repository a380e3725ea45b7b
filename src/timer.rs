// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2026 Vallés Puig, Ramon

//! Timer substrate.
//!
//! A [`Timer`] registers triggers by id, dispatches firings to handlers and
//! runs deferred continuations.  Registering a trigger under an id that is
//! already pending supersedes the pending one.
//!
//! [`ManualTimer`] is a single-threaded, virtual-time implementation: time
//! only moves when [`advance_to`](ManualTimer::advance_to) or
//! [`advance_by`](ManualTimer::advance_by) is called, and every firing
//! happens in time order on the caller's thread.  It can be driven from a
//! real loop by advancing to the system time, or from tests by advancing to
//! chosen instants.

use crate::clock::{AmbientClock, Clock};
use crate::datetime::CalendarInstant;
use crate::error::{Error, Result};
use chrono::{DateTime, FixedOffset, TimeDelta, TimeZone};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// Called with the firing trigger's id and the virtual time it fired at.
pub type Handler = Arc<dyn Fn(&Firing) + Send + Sync>;

/// A continuation run once by [`Timer::defer`].
pub type Task = Box<dyn FnOnce() + Send>;

/// A trigger registration.
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// Fires at local `hour:minute` every `day_repeat` days.
    Daily {
        id: String,
        hour: u32,
        minute: u32,
        day_repeat: u32,
    },
    /// Fires once at `at`.
    Once { id: String, at: CalendarInstant },
}

impl Trigger {
    pub fn daily(id: impl Into<String>, hour: u32, minute: u32) -> Self {
        Trigger::Daily {
            id: id.into(),
            hour,
            minute,
            day_repeat: 1,
        }
    }

    pub fn once(id: impl Into<String>, at: CalendarInstant) -> Self {
        Trigger::Once { id: id.into(), at }
    }

    pub fn id(&self) -> &str {
        match self {
            Trigger::Daily { id, .. } | Trigger::Once { id, .. } => id,
        }
    }
}

/// What a handler receives.
#[derive(Debug, Clone, PartialEq)]
pub struct Firing {
    pub id: String,
    pub at: DateTime<FixedOffset>,
}

/// Trigger registration and dispatch.
pub trait Timer: Send + Sync {
    /// Registers `trigger`, replacing any pending trigger with the same id.
    fn schedule(&self, trigger: Trigger) -> Result<()>;

    /// Adds a handler for firings of `id`.
    fn on(&self, id: &str, handler: Handler);

    /// Runs `task` once, `delay` after the current time, without blocking.
    fn defer(&self, delay: Duration, task: Task);
}

// ═══════════════════════════════════════════════════════════════════════════
// ManualTimer
// ═══════════════════════════════════════════════════════════════════════════

struct Pending {
    trigger: Trigger,
    next: DateTime<FixedOffset>,
    seq: u64,
}

struct Deferred {
    due: DateTime<FixedOffset>,
    seq: u64,
    task: Task,
}

struct State {
    now: DateTime<FixedOffset>,
    pending: BTreeMap<String, Pending>,
    handlers: HashMap<String, Vec<Handler>>,
    deferred: Vec<Deferred>,
    seq: u64,
}

impl State {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

enum Due {
    Trigger(String),
    Deferred(usize),
}

/// Virtual-time [`Timer`].
///
/// The timer owns the reference of the [`AmbientClock`] it is built with:
/// every step of virtual time is written to it, so components that read
/// "now" from the same clock see the time of the firing they are handling.
///
/// No internal lock is held while a handler or task runs, so handlers may
/// call [`schedule`](Timer::schedule) and [`defer`](Timer::defer) freely.
pub struct ManualTimer {
    clock: AmbientClock,
    state: Mutex<State>,
}

impl ManualTimer {
    /// Starts virtual time at the clock's current time.
    pub fn new(clock: AmbientClock) -> Self {
        let now = clock.now();
        clock.set_reference(now);
        Self {
            clock,
            state: Mutex::new(State {
                now,
                pending: BTreeMap::new(),
                handlers: HashMap::new(),
                deferred: Vec::new(),
                seq: 0,
            }),
        }
    }

    /// Current virtual time.
    pub fn now(&self) -> DateTime<FixedOffset> {
        self.state.lock().now
    }

    /// The clock this timer drives.
    pub fn clock(&self) -> &AmbientClock {
        &self.clock
    }

    /// Next firing time of the trigger registered under `id`.
    pub fn pending(&self, id: &str) -> Option<DateTime<FixedOffset>> {
        self.state.lock().pending.get(id).map(|p| p.next)
    }

    /// Number of deferred tasks not yet run.
    pub fn deferred_count(&self) -> usize {
        self.state.lock().deferred.len()
    }

    /// Advances virtual time by `step`, dispatching everything due.
    pub fn advance_by(&self, step: TimeDelta) -> usize {
        match self.now().checked_add_signed(step) {
            Some(target) => self.advance_to(target),
            None => 0,
        }
    }

    /// Advances virtual time to `target`, dispatching every trigger firing
    /// and deferred task due at or before it, in time order.  Work scheduled
    /// by handlers is dispatched in the same call when it is due in time.
    ///
    /// Returns the number of firings and tasks dispatched.
    pub fn advance_to<Tz: TimeZone>(&self, target: DateTime<Tz>) -> usize {
        let target = target.fixed_offset();
        let mut dispatched = 0;

        loop {
            let mut state = self.state.lock();
            let Some((at, due)) = Self::earliest(&state, &target) else {
                if target > state.now {
                    state.now = target;
                    self.clock.set_reference(target);
                }
                return dispatched;
            };

            state.now = at;
            self.clock.set_reference(at);
            dispatched += 1;

            match due {
                Due::Deferred(index) => {
                    let deferred = state.deferred.swap_remove(index);
                    drop(state);
                    (deferred.task)();
                }
                Due::Trigger(id) => {
                    let repeat = match state.pending.get(&id).map(|p| &p.trigger) {
                        Some(Trigger::Daily { day_repeat, .. }) => Some(*day_repeat),
                        _ => None,
                    };
                    match repeat {
                        Some(days) => {
                            if let Some(pending) = state.pending.get_mut(&id) {
                                pending.next += TimeDelta::days(days.max(1) as i64);
                            }
                        }
                        None => {
                            state.pending.remove(&id);
                        }
                    }

                    let handlers = state.handlers.get(&id).cloned().unwrap_or_default();
                    drop(state);

                    tracing::trace!(id = %id, at = %at, "trigger fired");
                    let firing = Firing { id, at };
                    for handler in handlers {
                        handler(&firing);
                    }
                }
            }
        }
    }

    fn earliest(
        state: &State,
        target: &DateTime<FixedOffset>,
    ) -> Option<(DateTime<FixedOffset>, Due)> {
        let trigger = state
            .pending
            .iter()
            .filter(|(_, p)| p.next <= *target)
            .min_by_key(|(_, p)| (p.next, p.seq))
            .map(|(id, p)| (p.next, p.seq, Due::Trigger(id.clone())));

        let deferred = state
            .deferred
            .iter()
            .enumerate()
            .filter(|(_, d)| d.due <= *target)
            .min_by_key(|(_, d)| (d.due, d.seq))
            .map(|(index, d)| (d.due, d.seq, Due::Deferred(index)));

        let best = match (trigger, deferred) {
            (Some(t), Some(d)) => Some(if (d.0, d.1) < (t.0, t.1) { d } else { t }),
            (t, d) => t.or(d),
        };
        best.map(|(at, _, due)| (at, due))
    }

    fn first_daily(
        now: &DateTime<FixedOffset>,
        hour: u32,
        minute: u32,
    ) -> Option<DateTime<FixedOffset>> {
        let naive = now.date_naive().and_hms_opt(hour, minute, 0)?;
        let today = now.offset().from_local_datetime(&naive).single()?;
        if today > *now {
            Some(today)
        } else {
            today.checked_add_signed(TimeDelta::days(1))
        }
    }
}

impl Timer for ManualTimer {
    fn schedule(&self, trigger: Trigger) -> Result<()> {
        let mut state = self.state.lock();
        let id = trigger.id().to_owned();

        let next = match &trigger {
            Trigger::Daily { hour, minute, .. } => Self::first_daily(&state.now, *hour, *minute)
                .ok_or_else(|| Error::InvalidDate(format!("daily trigger at {hour}:{minute}")))?,
            Trigger::Once { at, .. } => at.to_datetime(),
        };

        if next <= state.now {
            state.pending.remove(&id);
            tracing::debug!(id = %id, at = %next, "one-shot trigger already elapsed; dropped");
            return Ok(());
        }

        let seq = state.next_seq();
        tracing::debug!(id = %id, at = %next, "trigger scheduled");
        state.pending.insert(id, Pending { trigger, next, seq });
        Ok(())
    }

    fn on(&self, id: &str, handler: Handler) {
        self.state
            .lock()
            .handlers
            .entry(id.to_owned())
            .or_default()
            .push(handler);
    }

    fn defer(&self, delay: Duration, task: Task) {
        let mut state = self.state.lock();
        let step = TimeDelta::from_std(delay).unwrap_or(TimeDelta::MAX);
        let due = state.now.checked_add_signed(step).unwrap_or(state.now);
        let seq = state.next_seq();
        state.deferred.push(Deferred { due, seq, task });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn start() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2015-06-01T10:00:00-04:00").unwrap()
    }

    fn timer() -> Arc<ManualTimer> {
        Arc::new(ManualTimer::new(AmbientClock::fixed(start())))
    }

    fn counter(timer: &ManualTimer, id: &str) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        timer.on(id, Arc::new(move |_: &Firing| {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        count
    }

    fn once_at(offset_secs: i64) -> CalendarInstant {
        CalendarInstant::from_datetime(start() + TimeDelta::seconds(offset_secs))
    }

    #[test]
    fn one_shot_fires_once() {
        let timer = timer();
        let fired = counter(&timer, "a");
        timer.schedule(Trigger::once("a", once_at(60))).unwrap();

        timer.advance_by(TimeDelta::seconds(59));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        timer.advance_by(TimeDelta::seconds(1));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        timer.advance_by(TimeDelta::days(2));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(timer.pending("a").is_none());
    }

    #[test]
    fn same_id_supersedes() {
        let timer = timer();
        let fired = counter(&timer, "a");
        timer.schedule(Trigger::once("a", once_at(60))).unwrap();
        timer.schedule(Trigger::once("a", once_at(120))).unwrap();
        assert_eq!(timer.pending("a"), Some(start() + TimeDelta::seconds(120)));

        timer.advance_by(TimeDelta::seconds(90));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        timer.advance_by(TimeDelta::seconds(30));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn elapsed_one_shot_is_dropped_and_supersedes() {
        let timer = timer();
        let fired = counter(&timer, "a");
        timer.schedule(Trigger::once("a", once_at(60))).unwrap();
        timer.schedule(Trigger::once("a", once_at(-60))).unwrap();
        assert!(timer.pending("a").is_none());
        timer.advance_by(TimeDelta::hours(1));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn daily_fires_at_local_midnight_every_day() {
        let timer = timer();
        let fired = counter(&timer, "beat");
        timer.schedule(Trigger::daily("beat", 0, 0)).unwrap();

        let midnight = DateTime::parse_from_rfc3339("2015-06-02T00:00:00-04:00").unwrap();
        assert_eq!(timer.pending("beat"), Some(midnight));

        timer.advance_to(midnight);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        timer.advance_by(TimeDelta::days(3));
        assert_eq!(fired.load(Ordering::SeqCst), 4);
        assert_eq!(timer.pending("beat"), Some(midnight + TimeDelta::days(4)));
    }

    #[test]
    fn invalid_daily_time_is_rejected() {
        let timer = timer();
        assert!(timer.schedule(Trigger::daily("beat", 24, 0)).is_err());
    }

    #[test]
    fn deferred_task_runs_after_delay() {
        let timer = timer();
        let ran = Arc::new(AtomicUsize::new(0));
        let r = ran.clone();
        timer.defer(
            Duration::from_secs(1),
            Box::new(move || {
                r.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(timer.deferred_count(), 1);
        timer.advance_by(TimeDelta::milliseconds(999));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        timer.advance_by(TimeDelta::milliseconds(1));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(timer.deferred_count(), 0);
    }

    #[test]
    fn handlers_may_reschedule_reentrantly() {
        let timer = timer();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        let t = Arc::downgrade(&timer);
        timer.on(
            "a",
            Arc::new(move |firing: &Firing| {
                f.fetch_add(1, Ordering::SeqCst);
                if let Some(timer) = t.upgrade() {
                    let next = CalendarInstant::from_datetime(firing.at + TimeDelta::minutes(10));
                    timer.schedule(Trigger::once("a", next)).unwrap();
                }
            }),
        );
        timer.schedule(Trigger::once("a", once_at(600))).unwrap();

        assert_eq!(timer.advance_by(TimeDelta::hours(1)), 6);
        assert_eq!(fired.load(Ordering::SeqCst), 6);
        assert_eq!(timer.pending("a"), Some(start() + TimeDelta::minutes(70)));
    }

    #[test]
    fn clock_follows_virtual_time() {
        let timer = timer();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let clock = timer.clock().clone();
        timer.on(
            "a",
            Arc::new(move |_: &Firing| {
                s.lock().push(clock.now());
            }),
        );
        timer.schedule(Trigger::once("a", once_at(30))).unwrap();
        timer.advance_by(TimeDelta::minutes(1));

        assert_eq!(*seen.lock(), vec![start() + TimeDelta::seconds(30)]);
        assert_eq!(timer.clock().now(), start() + TimeDelta::minutes(1));
    }
}
