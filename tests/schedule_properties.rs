use chrono::{Datelike, Duration, NaiveDate, Weekday};
use proptest::prelude::*;
use psalm_schedule::calendar::schedule_end;
use psalm_schedule::{
    EligibilityFilter, PlannedReading, Psalm, ReadingRecord, ReadingRule, SchedulerConfig,
    plan_sundays,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

const TYPES: [Option<&str>; 6] = [
    Some("alabanza"),
    Some("lamento"),
    Some("sabiduria"),
    Some("real"),
    Some("confianza"),
    None,
];
const THEMES: [&str; 4] = [
    "Días festivos: año nuevo",
    "Días festivos: Agradecimiento",
    "mesiánico",
    "",
];

fn base() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
}

/// Distinct ids with random verse counts, types and themes.
fn catalog() -> impl Strategy<Value = Vec<Psalm>> {
    prop::collection::btree_map(1..=150i32, (1..=40i32, 0..TYPES.len(), 0..THEMES.len()), 0..60)
        .prop_map(|rows: BTreeMap<i32, (i32, usize, usize)>| {
            rows.into_iter()
                .map(|(id, (verses, kind, theme))| {
                    Psalm::new(
                        id,
                        format!("Salmo {id}"),
                        verses,
                        TYPES[kind],
                        [""; 0],
                        [THEMES[theme]],
                    )
                    .unwrap()
                })
                .collect()
        })
}

/// Readings spread over the two years before 2022.
fn history() -> impl Strategy<Value = Vec<ReadingRecord>> {
    prop::collection::vec((1..=150i32, 0..730i64), 0..40).prop_map(|rows| {
        rows.into_iter()
            .map(|(psalm_id, offset)| {
                ReadingRecord::new(Uuid::nil(), psalm_id, base() + Duration::days(offset), None)
                    .unwrap()
            })
            .collect()
    })
}

fn run(
    start: NaiveDate,
    months: i32,
    psalms: &[Psalm],
    history: &[ReadingRecord],
    seed: u64,
) -> Vec<PlannedReading> {
    let mut rng = StdRng::seed_from_u64(seed);
    plan_sundays(start, months, psalms, history, &SchedulerConfig::default(), &mut rng).unwrap()
}

fn known_label(label: &str) -> bool {
    ReadingRule::CHAIN.iter().any(|rule| rule.name() == label)
}

/// Monthly cap of each type under the default configuration.
fn caps(eligible: &[Psalm]) -> HashMap<String, usize> {
    let config = SchedulerConfig::default();
    let mut totals: HashMap<String, usize> = HashMap::new();
    for psalm in eligible {
        if let Some(key) = psalm.type_key() {
            *totals.entry(key).or_default() += 1;
        }
    }
    let largest = totals.values().copied().max().unwrap_or(0);
    totals
        .into_iter()
        .map(|(key, total)| {
            let high_volume = total as f64 >= config.high_volume_share * largest as f64;
            let cap = if high_volume {
                config.high_volume_monthly_cap
            } else {
                config.default_monthly_cap
            };
            (key, cap)
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn plans_are_ordered_unique_eligible_sundays(
        psalms in catalog(),
        history in history(),
        start_offset in 730..4000i64,
        months in 1..=24i32,
        seed in any::<u64>(),
    ) {
        let start = base() + Duration::days(start_offset);
        let end = schedule_end(start, months as u32);
        let plan = run(start, months, &psalms, &history, seed);

        let filter = EligibilityFilter::default();
        let readable: HashSet<i32> = psalms
            .iter()
            .filter(|p| filter.is_readable(p))
            .map(|p| p.id)
            .collect();
        let sundays_in_range = {
            let mut count = 0usize;
            let mut day = start;
            while day < end {
                if day.weekday() == Weekday::Sun {
                    count += 1;
                }
                day += Duration::days(1);
            }
            count
        };
        prop_assert_eq!(plan.len(), readable.len().min(sundays_in_range));

        let mut seen = HashSet::new();
        for reading in &plan {
            prop_assert_eq!(reading.scheduled_date.weekday(), Weekday::Sun);
            prop_assert!(reading.scheduled_date >= start && reading.scheduled_date < end);
            prop_assert!(readable.contains(&reading.psalm_id), "psalm {} is not readable", reading.psalm_id);
            prop_assert!(seen.insert(reading.psalm_id), "psalm {} planned twice", reading.psalm_id);
            prop_assert!(known_label(&reading.rule_applied), "label {}", reading.rule_applied);
        }
        for pair in plan.windows(2) {
            prop_assert_eq!(pair[1].scheduled_date - pair[0].scheduled_date, Duration::days(7));
        }
    }

    #[test]
    fn same_seed_gives_the_same_plan(
        psalms in catalog(),
        history in history(),
        start_offset in 730..4000i64,
        months in 1..=12i32,
        seed in any::<u64>(),
    ) {
        let start = base() + Duration::days(start_offset);
        let first = run(start, months, &psalms, &history, seed);
        let second = run(start, months, &psalms, &history, seed);
        prop_assert_eq!(first, second);
    }

    /// A General pick may only go over its type's monthly cap when every
    /// alternative left after the previous-type exclusion is capped too.
    #[test]
    fn general_exceeds_a_cap_only_without_alternatives(
        psalms in catalog(),
        start_offset in 730..4000i64,
        months in 1..=12i32,
        seed in any::<u64>(),
    ) {
        let start = base() + Duration::days(start_offset);
        let plan = run(start, months, &psalms, &[], seed);
        let eligible = EligibilityFilter::default().eligible(&psalms);
        let caps = caps(&eligible);
        let by_id: HashMap<i32, &Psalm> = psalms.iter().map(|p| (p.id, p)).collect();

        for (index, reading) in plan.iter().enumerate() {
            if reading.rule_applied != ReadingRule::General.name() {
                continue;
            }
            let Some(key) = by_id[&reading.psalm_id].type_key() else {
                continue;
            };
            let date = reading.scheduled_date;
            let earlier = &plan[..index];
            let used_in_month = |key: &str| {
                earlier
                    .iter()
                    .filter(|r| {
                        r.scheduled_date.year() == date.year()
                            && r.scheduled_date.month() == date.month()
                            && by_id[&r.psalm_id].type_key().as_deref() == Some(key)
                    })
                    .count()
            };
            if used_in_month(key.as_str()) < caps[&key] {
                continue;
            }

            let used: HashSet<i32> = earlier.iter().map(|r| r.psalm_id).collect();
            let available: Vec<&Psalm> = eligible.iter().filter(|p| !used.contains(&p.id)).collect();
            let previous = earlier.last().and_then(|r| by_id[&r.psalm_id].type_key());
            let not_previous: Vec<&Psalm> = available
                .iter()
                .copied()
                .filter(|p| previous.is_none() || p.type_key() != previous)
                .collect();
            let pool = if not_previous.is_empty() { available } else { not_previous };
            let alternatives = pool.iter().filter(|p| match p.type_key() {
                Some(other) => used_in_month(other.as_str()) < caps[&other],
                None => true,
            });
            prop_assert_eq!(alternatives.count(), 0, "{} went over its cap on {}", key, date);
        }
    }
}
