use chrono::{TimeDelta, Utc};
use std::sync::Arc;
use suntimer::{
    AmbientClock, Firing, ManualTimer, SchedulerContext, SolarCalculator, SolarEvent, SunCalc,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let clock = AmbientClock::new();
    let timer = Arc::new(ManualTimer::new(clock.clone()));
    let context = SchedulerContext::new(timer.clone(), Arc::new(clock));

    let today = SunCalc.times(Utc::now(), context.config.coordinates());
    for (event, when) in today.iter() {
        println!("{event:>14}: {when}");
    }

    let dusk = SolarEvent::Dusk.schedule().start(context)?;
    dusk.on_event(Arc::new(|firing: &Firing| {
        println!("dusk at {}", firing.at);
    }));
    println!("next dusk: {}", dusk.next_instant().iso8601);

    // Run a simulated week.
    timer.advance_by(TimeDelta::days(7));
    println!("after a week: {}", dusk.next_instant().iso8601);
    Ok(())
}
