// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2026 Vallés Puig, Ramon

//! Self-rearming solar event scheduler.
//!
//! A [`SolarScheduler`] keeps exactly one one-shot trigger, id
//! [`TIMER_ID`], armed for the next occurrence of its [`SolarEvent`], and
//! one permanent daily heartbeat, id [`HEARTBEAT_ID`], that fires at local
//! midnight and re-arms the one-shot for the new day.
//!
//! ```text
//! setup ──► heartbeat (daily 00:00) ──► on(heartbeat) ──► recompute ──► schedule("timer")
//!              │                                              ▲
//!              └──── fires ──► defer(1 s) ────────────────────┘
//! ```
//!
//! The one-shot re-arms itself as soon as it fires, so a trigger is pending
//! at all times after setup.  The armed instant is the earliest
//! occurrence strictly after now, which may belong to yesterday's solar day
//! (an event or delta past midnight) or to tomorrow's.
//!
//! The heartbeat handler never recomputes inline.  It defers the recompute
//! by a fixed delay so that an event landing on the heartbeat instant
//! itself cannot re-enter the handler it was scheduled from.

use crate::clock::Clock;
use crate::config::Config;
use crate::datetime::CalendarInstant;
use crate::error::{Error, Result};
use crate::fields::{Fields, Snapshot};
use crate::solar::{Coordinates, SolarCalculator, SolarEvent, SunCalc};
use crate::timer::{Firing, Handler, Timer, Trigger};
use chrono::{FixedOffset, NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Id of the one-shot trigger armed for the next solar event.
pub const TIMER_ID: &str = "timer";

/// Id of the daily recompute trigger.
pub const HEARTBEAT_ID: &str = "recalculate-heartbeat";

/// An offset applied to the computed solar instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delta {
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl Delta {
    pub const fn hours(hours: i64) -> Self {
        Self {
            hours,
            minutes: 0,
            seconds: 0,
        }
    }

    pub const fn minutes(minutes: i64) -> Self {
        Self {
            hours: 0,
            minutes,
            seconds: 0,
        }
    }

    pub const fn seconds(seconds: i64) -> Self {
        Self {
            hours: 0,
            minutes: 0,
            seconds,
        }
    }

    pub const fn is_zero(&self) -> bool {
        self.hours == 0 && self.minutes == 0 && self.seconds == 0
    }

    fn as_fields(&self) -> Fields {
        Fields::new()
            .hour_delta(self.hours)
            .minute_delta(self.minutes)
            .second_delta(self.seconds)
    }
}

/// What to schedule: an event kind, where, and with which offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarSchedule {
    pub event: SolarEvent,
    /// `None` uses the configured default coordinate.
    pub coordinates: Option<Coordinates>,
    pub delta: Delta,
}

impl SolarSchedule {
    pub fn new(event: SolarEvent) -> Self {
        Self {
            event,
            coordinates: None,
            delta: Delta::default(),
        }
    }

    pub fn at(mut self, coordinates: Coordinates) -> Self {
        self.coordinates = Some(coordinates);
        self
    }

    pub fn with_delta(mut self, delta: Delta) -> Self {
        self.delta = delta;
        self
    }

    /// Sets up a scheduler for this schedule.
    pub fn start(self, context: SchedulerContext) -> Result<SolarScheduler> {
        SolarScheduler::new(self, context)
    }
}

impl SolarEvent {
    /// A schedule for this event at the default coordinate.
    pub fn schedule(self) -> SolarSchedule {
        SolarSchedule::new(self)
    }

    /// A schedule for this event, shifted by `delta`.
    ///
    /// ```
    /// use suntimer::{Delta, SolarEvent};
    ///
    /// let schedule = SolarEvent::Sunset.delta(Delta::minutes(-30));
    /// assert_eq!(schedule.delta.minutes, -30);
    /// ```
    pub fn delta(self, delta: Delta) -> SolarSchedule {
        SolarSchedule::new(self).with_delta(delta)
    }
}

/// Collaborators a scheduler runs against.
#[derive(Clone)]
pub struct SchedulerContext {
    pub timer: Arc<dyn Timer>,
    pub clock: Arc<dyn Clock>,
    pub calculator: Arc<dyn SolarCalculator>,
    pub config: Config,
}

impl SchedulerContext {
    /// A context using [`SunCalc`] and the default [`Config`].
    pub fn new(timer: Arc<dyn Timer>, clock: Arc<dyn Clock>) -> Self {
        Self {
            timer,
            clock,
            calculator: Arc::new(SunCalc),
            config: Config::default(),
        }
    }

    pub fn with_calculator(mut self, calculator: Arc<dyn SolarCalculator>) -> Self {
        self.calculator = calculator;
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }
}

/// The event, place and offset a scheduler computes.
#[derive(Debug, Clone, Copy)]
struct Target {
    event: SolarEvent,
    coordinates: Coordinates,
    delta: Delta,
}

impl Target {
    /// The earliest event instant strictly after now.
    ///
    /// Yesterday's solar day is searched too, since a late event or a
    /// positive delta can carry it past local midnight, and tomorrow's
    /// covers the hours after today's event has passed.
    fn compute(
        &self,
        clock: &dyn Clock,
        calculator: &dyn SolarCalculator,
    ) -> Result<CalendarInstant> {
        let now = clock.now();
        let today = now.date_naive();
        let mut best: Option<CalendarInstant> = None;

        for date in [today.pred_opt(), Some(today), today.succ_opt()]
            .into_iter()
            .flatten()
        {
            let Some(instant) = self.on_date(date, now.offset(), clock, calculator)? else {
                continue;
            };
            let when = instant.to_datetime();
            if when > now && best.as_ref().map_or(true, |b| when < b.to_datetime()) {
                best = Some(instant);
            }
        }

        best.ok_or(Error::UnresolvableEvent {
            event: self.event,
            date: today,
        })
    }

    /// The shifted event instant for the local `date`, or `None` when the
    /// event does not happen that day.
    fn on_date(
        &self,
        date: NaiveDate,
        offset: &FixedOffset,
        clock: &dyn Clock,
        calculator: &dyn SolarCalculator,
    ) -> Result<Option<CalendarInstant>> {
        let noon = date
            .and_hms_opt(12, 0, 0)
            .and_then(|naive| offset.from_local_datetime(&naive).single())
            .ok_or_else(|| Error::InvalidDate(format!("local noon on {date}")))?;

        let times = calculator.times(noon.with_timezone(&Utc), self.coordinates);
        let Some(when) = times.get(self.event) else {
            return Ok(None);
        };

        let mut instant = CalendarInstant::from_datetime(when.with_timezone(offset));
        if !self.delta.is_zero() {
            instant.set(self.delta.as_fields(), clock)?;
        }
        Ok(Some(instant))
    }
}

struct Inner {
    target: Target,
    recalculate_delay: Duration,
    timer: Arc<dyn Timer>,
    clock: Arc<dyn Clock>,
    calculator: Arc<dyn SolarCalculator>,
    next: Mutex<CalendarInstant>,
}

impl Inner {
    /// Arms `instant` under [`TIMER_ID`], superseding the pending one.
    fn arm(&self, instant: CalendarInstant) -> Result<()> {
        self.timer.schedule(Trigger::once(TIMER_ID, instant.clone()))?;
        tracing::debug!(
            event = %self.target.event,
            id = TIMER_ID,
            at = %instant,
            "solar trigger armed"
        );
        *self.next.lock() = instant;
        Ok(())
    }

    fn do_recalculate(&self) -> Result<()> {
        let instant = self
            .target
            .compute(self.clock.as_ref(), self.calculator.as_ref())?;
        self.arm(instant)
    }

    /// Recomputes and re-arms, keeping the previous trigger on failure.
    fn refresh(&self) {
        if let Err(err) = self.do_recalculate() {
            tracing::warn!(
                event = %self.target.event,
                error = %err,
                "recompute failed; keeping previous trigger"
            );
        }
    }

    /// Heartbeat handler: defers the recompute instead of running it here.
    fn recalculate(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.timer.defer(
            self.recalculate_delay,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.refresh();
                }
            }),
        );
    }
}

/// A recurring trigger for one solar event.
///
/// The scheduler holds no teardown logic: dropping it detaches its handlers
/// (they hold weak references), and the timer keeps whatever it had
/// registered.
#[derive(Clone)]
pub struct SolarScheduler {
    inner: Arc<Inner>,
}

impl SolarScheduler {
    /// Runs the setup protocol: computes the next instant, registers the
    /// heartbeat and the re-arm handlers, then arms the instant.  Fails
    /// without registering anything when the configuration is invalid or
    /// no instant can be computed.
    pub fn new(schedule: SolarSchedule, context: SchedulerContext) -> Result<Self> {
        let SchedulerContext {
            timer,
            clock,
            calculator,
            config,
        } = context;
        config.validate()?;

        let target = Target {
            event: schedule.event,
            coordinates: schedule.coordinates.unwrap_or_else(|| config.coordinates()),
            delta: schedule.delta,
        };
        let first = target.compute(clock.as_ref(), calculator.as_ref())?;

        let inner = Arc::new(Inner {
            target,
            recalculate_delay: config.recalculate_delay(),
            timer,
            clock,
            calculator,
            next: Mutex::new(first.clone()),
        });

        inner.timer.schedule(Trigger::Daily {
            id: HEARTBEAT_ID.to_owned(),
            hour: config.heartbeat_hour,
            minute: config.heartbeat_minute,
            day_repeat: 1,
        })?;

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        inner.timer.on(
            HEARTBEAT_ID,
            Arc::new(move |_: &Firing| {
                if let Some(inner) = weak.upgrade() {
                    inner.recalculate();
                }
            }),
        );

        // The next instant is strictly after the firing, so re-arming inline
        // cannot fire again at the same instant.
        let weak: Weak<Inner> = Arc::downgrade(&inner);
        inner.timer.on(
            TIMER_ID,
            Arc::new(move |_: &Firing| {
                if let Some(inner) = weak.upgrade() {
                    inner.refresh();
                }
            }),
        );

        inner.arm(first)?;
        tracing::info!(
            event = %inner.target.event,
            latitude = inner.target.coordinates.latitude,
            longitude = inner.target.coordinates.longitude,
            "solar scheduler ready"
        );

        Ok(Self { inner })
    }

    pub fn event(&self) -> SolarEvent {
        self.inner.target.event
    }

    pub fn coordinates(&self) -> Coordinates {
        self.inner.target.coordinates
    }

    /// Field mapping of the currently armed instant.
    pub fn next_instant(&self) -> Snapshot {
        self.inner.next.lock().get()
    }

    /// Registers `handler` for firings of the solar trigger.
    pub fn on_event(&self, handler: Handler) {
        self.inner.timer.on(TIMER_ID, handler);
    }

    /// Recomputes and re-arms immediately.
    pub fn recalculate_now(&self) -> Result<()> {
        self.inner.do_recalculate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::AmbientClock;
    use crate::solar::SolarTimes;
    use crate::timer::ManualTimer;
    use chrono::{DateTime, TimeDelta};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Reports `event` at a fixed local time of day, counting calls.
    struct FixedCalculator {
        event: SolarEvent,
        hour: u32,
        calls: AtomicUsize,
        fail_after: Option<usize>,
    }

    impl FixedCalculator {
        fn new(event: SolarEvent, hour: u32) -> Arc<Self> {
            Self::failing_after(event, hour, None)
        }

        fn failing_after(event: SolarEvent, hour: u32, fail_after: Option<usize>) -> Arc<Self> {
            Arc::new(Self {
                event,
                hour,
                calls: AtomicUsize::new(0),
                fail_after,
            })
        }

        /// Number of recomputes; each one asks about three solar days.
        fn computes(&self) -> usize {
            self.calls.load(Ordering::SeqCst) / 3
        }
    }

    impl SolarCalculator for FixedCalculator {
        fn times(&self, date: DateTime<Utc>, _at: Coordinates) -> SolarTimes {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let mut times = SolarTimes::new();
            if self.fail_after.is_some_and(|n| call >= n) {
                return times;
            }
            let local = date.with_timezone(&offset()).date_naive();
            let naive = local.and_hms_opt(self.hour, 0, 0).unwrap();
            let when = offset().from_local_datetime(&naive).unwrap();
            times.insert(self.event, when.with_timezone(&Utc));
            times
        }
    }

    fn offset() -> FixedOffset {
        FixedOffset::west_opt(4 * 3600).unwrap()
    }

    fn at(text: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(text).unwrap()
    }

    fn setup_with(
        start: &str,
        calculator: Arc<dyn SolarCalculator>,
        schedule: SolarSchedule,
        config: Config,
    ) -> (Arc<ManualTimer>, Result<SolarScheduler>) {
        let clock = AmbientClock::fixed(at(start));
        let timer = Arc::new(ManualTimer::new(clock.clone()));
        let context = SchedulerContext::new(timer.clone(), Arc::new(clock))
            .with_calculator(calculator)
            .with_config(config);
        (timer, schedule.start(context))
    }

    fn setup(
        start: &str,
        calculator: Arc<dyn SolarCalculator>,
        schedule: SolarSchedule,
    ) -> (Arc<ManualTimer>, Result<SolarScheduler>) {
        setup_with(start, calculator, schedule, Config::default())
    }

    fn counter(scheduler: &SolarScheduler) -> Arc<Mutex<Vec<DateTime<FixedOffset>>>> {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let f = fired.clone();
        scheduler.on_event(Arc::new(move |firing: &Firing| {
            f.lock().push(firing.at);
        }));
        fired
    }

    #[test]
    fn setup_arms_heartbeat_and_todays_event() {
        let calc = FixedCalculator::new(SolarEvent::Sunset, 20);
        let (timer, scheduler) = setup(
            "2015-06-01T10:00:00-04:00",
            calc.clone(),
            SolarEvent::Sunset.schedule(),
        );
        let scheduler = scheduler.unwrap();

        assert_eq!(calc.computes(), 1);
        assert_eq!(timer.pending(HEARTBEAT_ID), Some(at("2015-06-02T00:00:00-04:00")));
        assert_eq!(timer.pending(TIMER_ID), Some(at("2015-06-01T20:00:00-04:00")));

        let next = scheduler.next_instant();
        assert_eq!((next.year, next.month, next.day, next.hour), (2015, 6, 1, 20));
        assert_eq!(next.tz_offset_minutes, -240);
    }

    #[test]
    fn setup_after_todays_event_arms_tomorrow() {
        let calc = FixedCalculator::new(SolarEvent::Sunset, 20);
        let (timer, scheduler) = setup(
            "2015-06-01T22:00:00-04:00",
            calc,
            SolarEvent::Sunset.schedule(),
        );
        assert_eq!(scheduler.unwrap().next_instant().day, 2);
        assert_eq!(timer.pending(TIMER_ID), Some(at("2015-06-02T20:00:00-04:00")));
    }

    #[test]
    fn firing_rearms_the_next_day_immediately() {
        let calc = FixedCalculator::new(SolarEvent::Sunset, 20);
        let (timer, scheduler) = setup(
            "2015-06-01T10:00:00-04:00",
            calc,
            SolarEvent::Sunset.schedule(),
        );
        let scheduler = scheduler.unwrap();

        timer.advance_to(at("2015-06-01T20:00:00-04:00"));
        assert_eq!(timer.pending(TIMER_ID), Some(at("2015-06-02T20:00:00-04:00")));
        assert_eq!(scheduler.next_instant().day, 2);
    }

    #[test]
    fn heartbeat_recomputes_once_after_delay() {
        let calc = FixedCalculator::new(SolarEvent::Sunrise, 5);
        let (timer, scheduler) = setup(
            "2015-06-01T10:00:00-04:00",
            calc.clone(),
            SolarEvent::Sunrise.schedule(),
        );
        let scheduler = scheduler.unwrap();
        assert_eq!(calc.computes(), 1);
        assert_eq!(timer.pending(TIMER_ID), Some(at("2015-06-02T05:00:00-04:00")));

        timer.advance_to(at("2015-06-01T23:59:59-04:00"));
        assert_eq!(calc.computes(), 1);

        timer.advance_to(at("2015-06-02T00:00:00-04:00"));
        assert_eq!(calc.computes(), 1, "heartbeat must not recompute inline");
        assert_eq!(timer.deferred_count(), 1);

        timer.advance_to(at("2015-06-02T00:00:01-04:00"));
        assert_eq!(calc.computes(), 2);
        assert_eq!(timer.pending(TIMER_ID), Some(at("2015-06-02T05:00:00-04:00")));
        assert_eq!(scheduler.next_instant().day, 2);
    }

    #[test]
    fn event_fires_daily_for_a_week() {
        let calc = FixedCalculator::new(SolarEvent::Dawn, 6);
        let (timer, scheduler) = setup(
            "2015-06-01T01:00:00-04:00",
            calc.clone(),
            SolarEvent::Dawn.schedule(),
        );
        let scheduler = scheduler.unwrap();
        let fired = counter(&scheduler);

        timer.advance_by(TimeDelta::days(7));
        let fired = fired.lock();
        assert_eq!(fired.len(), 7);
        for (day, when) in fired.iter().enumerate() {
            assert_eq!(*when, at("2015-06-01T06:00:00-04:00") + TimeDelta::days(day as i64));
        }
        // Setup, seven firings and seven heartbeats.
        assert_eq!(calc.computes(), 15);
        assert_eq!(timer.pending(TIMER_ID), Some(at("2015-06-08T06:00:00-04:00")));
    }

    #[test]
    fn event_at_midnight_does_not_recurse() {
        let calc = FixedCalculator::new(SolarEvent::Nadir, 0);
        let (timer, scheduler) = setup(
            "2015-06-01T10:00:00-04:00",
            calc,
            SolarEvent::Nadir.schedule(),
        );
        let scheduler = scheduler.unwrap();
        let fired = counter(&scheduler);
        assert_eq!(timer.pending(TIMER_ID), Some(at("2015-06-02T00:00:00-04:00")));

        timer.advance_by(TimeDelta::days(3));
        assert_eq!(fired.lock().len(), 3);
        assert_eq!(scheduler.next_instant().day, 5);
    }

    #[test]
    fn delta_shifts_the_armed_instant() {
        let calc = FixedCalculator::new(SolarEvent::Sunset, 20);
        let (timer, scheduler) = setup(
            "2015-06-01T10:00:00-04:00",
            calc,
            SolarEvent::Sunset.delta(Delta::minutes(-30)),
        );
        let next = scheduler.unwrap().next_instant();
        assert_eq!((next.hour, next.minute, next.minute_delta), (19, 30, 0));
        assert_eq!(timer.pending(TIMER_ID), Some(at("2015-06-01T19:30:00-04:00")));
    }

    #[test]
    fn delta_past_midnight_still_fires_every_day() {
        let calc = FixedCalculator::new(SolarEvent::Sunset, 20);
        let (timer, scheduler) = setup(
            "2015-06-01T10:00:00-04:00",
            calc,
            SolarEvent::Sunset.delta(Delta::hours(5)),
        );
        let scheduler = scheduler.unwrap();
        let fired = counter(&scheduler);
        assert_eq!(timer.pending(TIMER_ID), Some(at("2015-06-02T01:00:00-04:00")));

        // The heartbeat at 00:00 must keep yesterday's shifted sunset armed.
        timer.advance_to(at("2015-06-02T00:00:01-04:00"));
        assert_eq!(timer.pending(TIMER_ID), Some(at("2015-06-02T01:00:00-04:00")));

        timer.advance_to(at("2015-06-08T10:00:00-04:00"));
        let fired = fired.lock();
        assert_eq!(fired.len(), 7);
        for (day, when) in fired.iter().enumerate() {
            assert_eq!(*when, at("2015-06-02T01:00:00-04:00") + TimeDelta::days(day as i64));
        }
    }

    #[test]
    fn setup_fails_on_unresolvable_event() {
        let calc = FixedCalculator::failing_after(SolarEvent::Sunset, 20, Some(0));
        let (timer, scheduler) = setup(
            "2015-06-01T10:00:00-04:00",
            calc,
            SolarEvent::Sunset.schedule(),
        );
        assert!(matches!(
            scheduler,
            Err(Error::UnresolvableEvent {
                event: SolarEvent::Sunset,
                ..
            })
        ));
        assert!(timer.pending(TIMER_ID).is_none());
        assert!(timer.pending(HEARTBEAT_ID).is_none());
    }

    #[test]
    fn setup_rejects_invalid_config() {
        let calc = FixedCalculator::new(SolarEvent::Sunset, 20);
        let config = Config {
            recalculate_delay_ms: 0,
            ..Config::default()
        };
        let (timer, scheduler) = setup_with(
            "2015-06-01T10:00:00-04:00",
            calc.clone(),
            SolarEvent::Sunset.schedule(),
            config,
        );
        assert!(matches!(scheduler, Err(Error::Config(_))));
        assert_eq!(calc.computes(), 0);
        assert!(timer.pending(HEARTBEAT_ID).is_none());
    }

    #[test]
    fn failed_recompute_keeps_previous_trigger() {
        let calc = FixedCalculator::failing_after(SolarEvent::Sunset, 20, Some(3));
        let (timer, scheduler) = setup(
            "2015-06-01T10:00:00-04:00",
            calc,
            SolarEvent::Sunset.schedule(),
        );
        let scheduler = scheduler.unwrap();
        let before = scheduler.next_instant();

        assert!(scheduler.recalculate_now().is_err());
        assert_eq!(scheduler.next_instant(), before);
        assert_eq!(timer.pending(TIMER_ID), Some(at("2015-06-01T20:00:00-04:00")));

        timer.advance_to(at("2015-06-02T00:00:05-04:00"));
        assert_eq!(scheduler.next_instant(), before);
        assert_eq!(timer.pending(HEARTBEAT_ID), Some(at("2015-06-03T00:00:00-04:00")));
    }

    #[test]
    fn explicit_coordinates_override_config() {
        let calc = FixedCalculator::new(SolarEvent::Sunrise, 5);
        let here = Coordinates::new(51.48, 0.0);
        let (_timer, scheduler) = setup(
            "2015-06-01T01:00:00-04:00",
            calc,
            SolarEvent::Sunrise.schedule().at(here),
        );
        assert_eq!(scheduler.unwrap().coordinates(), here);
    }

    #[test]
    fn dropped_scheduler_detaches_from_its_triggers() {
        let calc = FixedCalculator::new(SolarEvent::Sunrise, 5);
        let (timer, scheduler) = setup(
            "2015-06-01T10:00:00-04:00",
            calc.clone(),
            SolarEvent::Sunrise.schedule(),
        );
        drop(scheduler);
        timer.advance_by(TimeDelta::days(2));
        assert_eq!(calc.computes(), 1);
    }

    #[test]
    fn runs_against_suncalc() {
        let clock = AmbientClock::fixed(at("2015-06-01T10:00:00-04:00"));
        let timer = Arc::new(ManualTimer::new(clock.clone()));
        let scheduler = SolarEvent::Sunset
            .schedule()
            .start(SchedulerContext::new(timer.clone(), Arc::new(clock)))
            .unwrap();

        // Toronto sunset in early June is shortly before 21:00 EDT.
        let next = scheduler.next_instant();
        assert_eq!((next.year, next.month, next.day), (2015, 6, 1));
        assert_eq!(next.hour, 20);
        assert_eq!(
            timer.pending(TIMER_ID),
            Some(DateTime::parse_from_rfc3339(&next.iso8601).unwrap())
        );
    }
}
