//! Fairness counters fed to the rule chain.
//!
//! Lifetime read counts and per-type coverage come from the full history.
//! The rolling window, the monthly counters and the last-used types are
//! accumulators advanced Sunday by Sunday as the scheduler walks the range.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::psalm::{Psalm, ReadingRecord};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeBalanceStats {
    pub type_key: String,
    pub total_readable: usize,
    pub covered: usize,
}

impl TypeBalanceStats {
    pub fn remaining_ratio(&self) -> f64 {
        if self.total_readable == 0 {
            return 0.0;
        }
        self.total_readable.saturating_sub(self.covered) as f64 / self.total_readable as f64
    }
}

pub fn read_counts(readings: &[ReadingRecord]) -> HashMap<i32, usize> {
    let mut counts = HashMap::new();
    for reading in readings {
        *counts.entry(reading.psalm_id).or_insert(0) += 1;
    }
    counts
}

pub fn type_balances(
    eligible: &[Psalm],
    read_counts: &HashMap<i32, usize>,
) -> BTreeMap<String, TypeBalanceStats> {
    let mut balances: BTreeMap<String, TypeBalanceStats> = BTreeMap::new();
    for psalm in eligible {
        let Some(key) = psalm.type_key() else {
            continue;
        };
        let stats = balances
            .entry(key.clone())
            .or_insert_with(|| TypeBalanceStats {
                type_key: key,
                total_readable: 0,
                covered: 0,
            });
        stats.total_readable += 1;
        if read_counts.get(&psalm.id).copied().unwrap_or(0) > 0 {
            stats.covered += 1;
        }
    }
    balances
}

/// Trailing window of `length` days ending just before the day being scheduled.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    length: Duration,
    pending: VecDeque<(NaiveDate, Option<String>)>,
    entered: VecDeque<(NaiveDate, Option<String>)>,
    counts: HashMap<String, usize>,
    last_types: VecDeque<Option<String>>,
}

impl RollingWindow {
    const TRACKED_TYPES: usize = 2;

    pub fn new<I>(length_days: i64, events: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, Option<String>)>,
    {
        let mut pending: Vec<(NaiveDate, Option<String>)> = events.into_iter().collect();
        pending.sort_by_key(|(date, _)| *date);
        Self {
            length: Duration::days(length_days.max(0)),
            pending: pending.into(),
            entered: VecDeque::new(),
            counts: HashMap::new(),
            last_types: VecDeque::with_capacity(Self::TRACKED_TYPES),
        }
    }

    /// Moves the window so that it covers `[day - length, day)`.
    pub fn advance_to(&mut self, day: NaiveDate) {
        while self.pending.front().is_some_and(|(date, _)| *date < day) {
            if let Some((date, type_key)) = self.pending.pop_front() {
                if let Some(key) = &type_key {
                    *self.counts.entry(key.clone()).or_insert(0) += 1;
                }
                if self.last_types.len() == Self::TRACKED_TYPES {
                    self.last_types.pop_back();
                }
                self.last_types.push_front(type_key.clone());
                self.entered.push_back((date, type_key));
            }
        }

        let window_start = day - self.length;
        while self.entered.front().is_some_and(|(date, _)| *date < window_start) {
            if let Some((_, Some(key))) = self.entered.pop_front() {
                if let Some(count) = self.counts.get_mut(&key) {
                    *count -= 1;
                    if *count == 0 {
                        self.counts.remove(&key);
                    }
                }
            }
        }
    }

    /// Queues a reading; it enters the window once the walk passes its date.
    pub fn record(&mut self, date: NaiveDate, type_key: Option<String>) {
        let index = self.pending.partition_point(|(pending, _)| *pending <= date);
        self.pending.insert(index, (date, type_key));
    }

    pub fn type_counts(&self) -> &HashMap<String, usize> {
        &self.counts
    }

    pub fn total(&self) -> usize {
        self.entered.len()
    }

    /// Types of the most recent readings before the current day, newest first.
    pub fn recent_types(&self) -> Vec<Option<String>> {
        self.last_types.iter().cloned().collect()
    }
}

/// Per (year, month) type counts across history and this run's selections.
#[derive(Debug, Clone, Default)]
pub struct MonthlyTypeCounts {
    counts: HashMap<(i32, u32), HashMap<String, usize>>,
}

impl MonthlyTypeCounts {
    pub fn new<I>(events: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, Option<String>)>,
    {
        let mut monthly = Self::default();
        for (date, type_key) in events {
            monthly.record(date, type_key.as_deref());
        }
        monthly
    }

    pub fn record(&mut self, date: NaiveDate, type_key: Option<&str>) {
        if let Some(key) = type_key {
            *self
                .counts
                .entry((date.year(), date.month()))
                .or_default()
                .entry(key.to_string())
                .or_insert(0) += 1;
        }
    }

    pub fn for_month(&self, date: NaiveDate) -> HashMap<String, usize> {
        self.counts
            .get(&(date.year(), date.month()))
            .cloned()
            .unwrap_or_default()
    }
}

/// Aggregates every counter the rules consult, for one scheduling run.
#[derive(Debug, Clone)]
pub struct BalanceTracker {
    read_counts: HashMap<i32, usize>,
    type_balances: BTreeMap<String, TypeBalanceStats>,
    max_total_readable: usize,
    window: RollingWindow,
    monthly: MonthlyTypeCounts,
}

impl BalanceTracker {
    /// `catalog` resolves the type of historical readings; `eligible` defines
    /// the readable population for coverage.
    pub fn new(
        catalog: &[Psalm],
        eligible: &[Psalm],
        history: &[ReadingRecord],
        window_days: i64,
    ) -> Self {
        let types: HashMap<i32, Option<String>> = catalog
            .iter()
            .map(|psalm| (psalm.id, psalm.type_key()))
            .collect();
        let events: Vec<(NaiveDate, Option<String>)> = history
            .iter()
            .filter_map(|reading| {
                types
                    .get(&reading.psalm_id)
                    .map(|type_key| (reading.date_read, type_key.clone()))
            })
            .collect();

        let read_counts = read_counts(history);
        let type_balances = type_balances(eligible, &read_counts);
        let max_total_readable = type_balances
            .values()
            .map(|stats| stats.total_readable)
            .max()
            .unwrap_or(0);

        Self {
            read_counts,
            type_balances,
            max_total_readable,
            window: RollingWindow::new(window_days, events.iter().cloned()),
            monthly: MonthlyTypeCounts::new(events),
        }
    }

    pub fn advance_to(&mut self, day: NaiveDate) {
        self.window.advance_to(day);
    }

    /// Folds a selection of this run into every counter.
    pub fn record_selection(&mut self, date: NaiveDate, psalm: &Psalm) {
        let type_key = psalm.type_key();
        let count = self.read_counts.entry(psalm.id).or_insert(0);
        *count += 1;
        if *count == 1 {
            if let Some(stats) = type_key
                .as_ref()
                .and_then(|key| self.type_balances.get_mut(key))
            {
                stats.covered += 1;
            }
        }
        self.monthly.record(date, type_key.as_deref());
        self.window.record(date, type_key);
    }

    pub fn read_counts(&self) -> &HashMap<i32, usize> {
        &self.read_counts
    }

    pub fn type_balances(&self) -> &BTreeMap<String, TypeBalanceStats> {
        &self.type_balances
    }

    pub fn max_total_readable(&self) -> usize {
        self.max_total_readable
    }

    pub fn window(&self) -> &RollingWindow {
        &self.window
    }

    pub fn month_counts(&self, date: NaiveDate) -> HashMap<String, usize> {
        self.monthly.for_month(date)
    }
}
