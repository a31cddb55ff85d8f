//! Coverage and reading counts over a date range.
//!
//! Readings dated on or before `today` count as actual, later ones as
//! planned. Only readable psalms take part.

use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::eligibility::EligibilityFilter;
use crate::persistence::{PersistenceError, PersistenceResult};
use crate::psalm::{Psalm, ReadingRecord};

pub const UNTYPED_KEY: &str = "untyped";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatsRange {
    All,
    Year { year: i32 },
    Custom { start: NaiveDate, end: NaiveDate },
}

impl StatsRange {
    pub fn parse(
        range: Option<&str>,
        year: Option<i32>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> PersistenceResult<Self> {
        match range.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("all") => Ok(StatsRange::All),
            Some("year") => year
                .map(|year| StatsRange::Year { year })
                .ok_or_else(|| PersistenceError::InvalidData("year is required for range 'year'".into())),
            Some("custom") => match (start, end) {
                (Some(start), Some(end)) if start <= end => Ok(StatsRange::Custom { start, end }),
                (Some(_), Some(_)) => Err(PersistenceError::InvalidData(
                    "custom range start must not be after end".into(),
                )),
                _ => Err(PersistenceError::InvalidData(
                    "start and end are required for range 'custom'".into(),
                )),
            },
            Some(other) => Err(PersistenceError::InvalidData(format!("unknown stats range '{other}'"))),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        match self {
            StatsRange::All => true,
            StatsRange::Year { year } => date.year() == *year,
            StatsRange::Custom { start, end } => date >= *start && date <= *end,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeStats {
    pub type_key: String,
    pub total_readable: usize,
    pub actual_covered: usize,
    pub projected_covered: usize,
    pub actual_readings: usize,
    pub planned_readings: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingStats {
    pub range: StatsRange,
    pub today: NaiveDate,
    pub total_readable: usize,
    pub actual_covered: usize,
    pub projected_covered: usize,
    pub actual_readings: usize,
    pub planned_readings: usize,
    pub by_type: Vec<TypeStats>,
}

pub fn compute_stats(
    psalms: &[Psalm],
    readings: &[ReadingRecord],
    range: StatsRange,
    today: NaiveDate,
    filter: &EligibilityFilter,
) -> PersistenceResult<ReadingStats> {
    let readable: HashMap<i32, String> = psalms
        .iter()
        .filter(|psalm| filter.is_readable(psalm))
        .map(|psalm| {
            let key = psalm.type_key().unwrap_or_else(|| UNTYPED_KEY.to_string());
            (psalm.id, key)
        })
        .collect();

    let mut totals: BTreeMap<String, usize> = BTreeMap::new();
    for key in readable.values() {
        *totals.entry(key.clone()).or_insert(0) += 1;
    }

    let frame = readings_frame(readings, &readable, range, today)?;
    let grouped = aggregate_by_type(frame)?;

    let by_type: Vec<TypeStats> = totals
        .into_iter()
        .map(|(type_key, total_readable)| {
            let counts = grouped.get(&type_key).copied().unwrap_or_default();
            TypeStats {
                type_key,
                total_readable,
                actual_covered: counts.actual_covered,
                projected_covered: counts.projected_covered,
                actual_readings: counts.actual_readings,
                planned_readings: counts.total_readings - counts.actual_readings,
            }
        })
        .collect();

    Ok(ReadingStats {
        range,
        today,
        total_readable: readable.len(),
        actual_covered: by_type.iter().map(|t| t.actual_covered).sum(),
        projected_covered: by_type.iter().map(|t| t.projected_covered).sum(),
        actual_readings: by_type.iter().map(|t| t.actual_readings).sum(),
        planned_readings: by_type.iter().map(|t| t.planned_readings).sum(),
        by_type,
    })
}

fn readings_frame(
    readings: &[ReadingRecord],
    readable: &HashMap<i32, String>,
    range: StatsRange,
    today: NaiveDate,
) -> PolarsResult<DataFrame> {
    let mut ids: Vec<i32> = Vec::new();
    let mut types: Vec<&str> = Vec::new();
    let mut actual: Vec<bool> = Vec::new();
    for reading in readings.iter().filter(|reading| range.contains(reading.date_read)) {
        let Some(key) = readable.get(&reading.psalm_id) else {
            continue;
        };
        ids.push(reading.psalm_id);
        types.push(key.as_str());
        actual.push(reading.date_read <= today);
    }

    DataFrame::new(vec![
        Series::new(PlSmallStr::from_static("psalm_id"), ids).into_column(),
        Series::new(PlSmallStr::from_static("type_key"), types).into_column(),
        Series::new(PlSmallStr::from_static("actual"), actual).into_column(),
    ])
}

#[derive(Debug, Clone, Copy, Default)]
struct GroupCounts {
    actual_covered: usize,
    projected_covered: usize,
    actual_readings: usize,
    total_readings: usize,
}

fn aggregate_by_type(frame: DataFrame) -> PolarsResult<HashMap<String, GroupCounts>> {
    if frame.height() == 0 {
        return Ok(HashMap::new());
    }

    let out = frame
        .lazy()
        .group_by([col("type_key")])
        .agg([
            col("psalm_id")
                .filter(col("actual"))
                .n_unique()
                .cast(DataType::Int64)
                .alias("actual_covered"),
            col("psalm_id")
                .n_unique()
                .cast(DataType::Int64)
                .alias("projected_covered"),
            col("actual")
                .cast(DataType::Int64)
                .sum()
                .alias("actual_readings"),
            col("psalm_id")
                .count()
                .cast(DataType::Int64)
                .alias("total_readings"),
        ])
        .collect()?;

    let keys = out.column("type_key")?.str()?;
    let actual_covered = out.column("actual_covered")?.i64()?;
    let projected_covered = out.column("projected_covered")?.i64()?;
    let actual_readings = out.column("actual_readings")?.i64()?;
    let total_readings = out.column("total_readings")?.i64()?;

    let mut grouped = HashMap::with_capacity(out.height());
    for idx in 0..out.height() {
        let Some(key) = keys.get(idx) else {
            continue;
        };
        let read = |values: &Int64Chunked| values.get(idx).unwrap_or(0).max(0) as usize;
        grouped.insert(
            key.to_string(),
            GroupCounts {
                actual_covered: read(actual_covered),
                projected_covered: read(projected_covered),
                actual_readings: read(actual_readings),
                total_readings: read(total_readings),
            },
        );
    }
    Ok(grouped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn psalm(id: i32, verses: i32, psalm_type: Option<&str>) -> Psalm {
        Psalm::new(id, format!("Psalm {id}"), verses, psalm_type, [""; 0], [""; 0]).unwrap()
    }

    fn reading(psalm_id: i32, date: NaiveDate) -> ReadingRecord {
        ReadingRecord::new(Uuid::new_v4(), psalm_id, date, None).unwrap()
    }

    #[test]
    fn actual_and_planned_split_on_today() {
        let psalms = vec![
            psalm(1, 6, Some("sabiduria")),
            psalm(8, 9, Some("alabanza")),
            psalm(23, 6, None),
            psalm(119, 176, Some("sabiduria")),
            psalm(137, 9, Some("lamento")),
        ];
        let readings = vec![
            reading(1, d(2025, 1, 5)),
            reading(1, d(2025, 3, 2)),
            reading(8, d(2025, 6, 1)),
            reading(119, d(2025, 1, 12)),
            reading(137, d(2025, 1, 19)),
        ];
        let stats = compute_stats(
            &psalms,
            &readings,
            StatsRange::All,
            d(2025, 4, 1),
            &EligibilityFilter::default(),
        )
        .unwrap();

        assert_eq!(stats.total_readable, 3);
        assert_eq!(stats.actual_covered, 1);
        assert_eq!(stats.projected_covered, 2);
        assert_eq!(stats.actual_readings, 2);
        assert_eq!(stats.planned_readings, 1);

        let untyped = stats.by_type.iter().find(|t| t.type_key == UNTYPED_KEY).unwrap();
        assert_eq!(untyped.total_readable, 1);
        assert_eq!(untyped.projected_covered, 0);
        assert!(stats.by_type.iter().all(|t| t.type_key != "lamento"));
    }

    #[test]
    fn year_range_limits_readings() {
        let psalms = vec![psalm(1, 6, Some("sabiduria"))];
        let readings = vec![reading(1, d(2024, 12, 29)), reading(1, d(2025, 1, 5))];
        let stats = compute_stats(
            &psalms,
            &readings,
            StatsRange::Year { year: 2024 },
            d(2025, 6, 1),
            &EligibilityFilter::default(),
        )
        .unwrap();
        assert_eq!(stats.actual_readings, 1);
        assert_eq!(stats.actual_covered, 1);
    }

    #[test]
    fn custom_range_is_validated() {
        assert!(StatsRange::parse(Some("custom"), None, Some(d(2025, 2, 1)), Some(d(2025, 1, 1))).is_err());
        assert!(StatsRange::parse(Some("custom"), None, None, None).is_err());
        assert_eq!(
            StatsRange::parse(Some("year"), Some(2025), None, None).unwrap(),
            StatsRange::Year { year: 2025 }
        );
    }
}
