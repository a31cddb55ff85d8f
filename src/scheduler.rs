use chrono::{Datelike, NaiveDate};
use log::{debug, info, warn};
use rand::{Rng, RngCore};
use std::collections::HashSet;
use thiserror::Error;
use uuid::{Builder, Uuid};

use crate::balance::BalanceTracker;
use crate::calendar::{LiturgicalCalendar, schedule_end, sundays_from};
use crate::config::SchedulerConfig;
use crate::eligibility::EligibilityFilter;
use crate::persistence::{PersistenceError, PsalmCatalog, ReadingHistory};
use crate::psalm::{PlannedReading, Psalm, ReadingRecord};
use crate::psalm_validation::ValidationError;
use crate::rules::{ScheduleContext, apply_chain};

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("months must be positive (got {0})")]
    InvalidMonths(i32),
    #[error("failed to read scheduling inputs: {0}")]
    Source(#[from] PersistenceError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Plans one psalm per Sunday in `[start, start + months)`.
///
/// Catalog and history are read once before the walk. Output is fully
/// determined by the inputs and the state of `rng`.
pub fn generate_schedule<C, H>(
    start: NaiveDate,
    months: i32,
    catalog: &C,
    history: &H,
    config: &SchedulerConfig,
    rng: &mut dyn RngCore,
) -> Result<Vec<PlannedReading>, ScheduleError>
where
    C: PsalmCatalog + ?Sized,
    H: ReadingHistory + ?Sized,
{
    if months <= 0 {
        return Err(ScheduleError::InvalidMonths(months));
    }
    let psalms = catalog.all_psalms()?;
    let readings = history.all_readings()?;
    plan_sundays(start, months, &psalms, &readings, config, rng)
}

/// Same as [`generate_schedule`] over in-memory snapshots.
pub fn plan_sundays(
    start: NaiveDate,
    months: i32,
    psalms: &[Psalm],
    history: &[ReadingRecord],
    config: &SchedulerConfig,
    rng: &mut dyn RngCore,
) -> Result<Vec<PlannedReading>, ScheduleError> {
    let months = u32::try_from(months)
        .ok()
        .filter(|months| *months > 0)
        .ok_or(ScheduleError::InvalidMonths(months))?;

    let end = schedule_end(start, months);
    let eligible = EligibilityFilter::new(config.max_readable_verses).eligible(psalms);
    // Every walked Sunday either takes a fresh psalm or ends the run.
    let sundays: Vec<NaiveDate> = sundays_from(start, end).take(eligible.len()).collect();
    let calendar = occasion_calendar(start, end, sundays.last().copied());
    let mut tracker = BalanceTracker::new(psalms, &eligible, history, config.rolling_window_days);
    let mut used: HashSet<i32> = HashSet::new();
    let mut planned = Vec::with_capacity(sundays.len());

    info!(
        "planning {} Sundays from {} to {} over {} eligible psalms",
        sundays.len(),
        start,
        end,
        eligible.len()
    );

    for sunday in sundays {
        tracker.advance_to(sunday);
        let available: Vec<&Psalm> = eligible
            .iter()
            .filter(|psalm| !used.contains(&psalm.id))
            .collect();
        if available.is_empty() {
            info!("eligible psalms exhausted before {sunday}");
            break;
        }

        let selection = {
            let mut ctx = ScheduleContext {
                sunday,
                available: &available,
                read_counts: tracker.read_counts(),
                type_balances: tracker.type_balances(),
                max_total_readable: tracker.max_total_readable(),
                recent_type_counts: tracker.window().type_counts(),
                recent_total: tracker.window().total(),
                month_type_counts: tracker.month_counts(sunday),
                recent_types: tracker.window().recent_types(),
                occasions: calendar.occasions(sunday),
                config,
                rng: &mut *rng,
            };
            apply_chain(&mut ctx).map(|selection| (selection.psalm.clone(), selection.rule))
        };

        let Some((psalm, rule)) = selection else {
            warn!("no psalm could be selected for {sunday}; skipping");
            continue;
        };

        let id = reading_id(rng);
        planned.push(PlannedReading::new(id, psalm.id, sunday, rule.name())?);
        used.insert(psalm.id);
        tracker.record_selection(sunday, &psalm);
        debug!("{sunday}: psalm {} via {rule}", psalm.id);
    }

    info!("planned {} readings", planned.len());
    Ok(planned)
}

/// Occasions for the walked Sundays. Thanksgiving looks at the whole November
/// of the last walked year, so the calendar runs to that year's end.
fn occasion_calendar(start: NaiveDate, end: NaiveDate, last: Option<NaiveDate>) -> LiturgicalCalendar {
    let Some(last) = last else {
        return LiturgicalCalendar::default();
    };
    let horizon = NaiveDate::from_ymd_opt(last.year() + 1, 1, 1).map_or(end, |next| next.min(end));
    let sundays: Vec<NaiveDate> = sundays_from(start, horizon).collect();
    LiturgicalCalendar::for_sundays(&sundays)
}

/// Ids come from the injected generator so seeded runs stay reproducible.
fn reading_id(rng: &mut dyn RngCore) -> Uuid {
    Builder::from_random_bytes(rng.random()).into_uuid()
}
