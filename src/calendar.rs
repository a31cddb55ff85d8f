use chrono::{Datelike, Days, Duration, Months, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Special-occasion categories a Sunday can fall into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occasions {
    pub holy_week: bool,
    pub thanksgiving: bool,
    pub december: bool,
    pub first_sunday_of_month: bool,
    pub first_sunday_of_year: bool,
}

impl Occasions {
    pub fn is_special(&self) -> bool {
        self.holy_week
            || self.thanksgiving
            || self.december
            || self.first_sunday_of_month
            || self.first_sunday_of_year
    }

    pub fn labels(&self) -> Vec<&'static str> {
        let mut labels = Vec::new();
        if self.first_sunday_of_year {
            labels.push("first-sunday-of-year");
        }
        if self.thanksgiving {
            labels.push("thanksgiving");
        }
        if self.holy_week {
            labels.push("holy-week");
        }
        if self.december {
            labels.push("december");
        }
        if self.first_sunday_of_month {
            labels.push("first-sunday-of-month");
        }
        labels
    }
}

/// Special Sundays for a fixed set of target Sundays, computed once per run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiturgicalCalendar {
    holy_week: HashSet<NaiveDate>,
    thanksgiving: HashSet<NaiveDate>,
}

impl LiturgicalCalendar {
    pub fn for_sundays(sundays: &[NaiveDate]) -> Self {
        let mut by_year: BTreeMap<i32, Vec<NaiveDate>> = BTreeMap::new();
        for sunday in sundays {
            by_year.entry(sunday.year()).or_default().push(*sunday);
        }

        let mut holy_week = HashSet::new();
        let mut thanksgiving = HashSet::new();
        for (year, dates) in &by_year {
            let week = holy_week_sundays(*year);
            holy_week.extend(dates.iter().copied().filter(|date| week.contains(date)));

            let mut november: Vec<NaiveDate> = dates
                .iter()
                .copied()
                .filter(|date| date.month() == 11)
                .collect();
            november.sort();
            if november.len() >= 2 {
                thanksgiving.extend(november[november.len() - 2..].iter().copied());
            }
        }

        Self {
            holy_week,
            thanksgiving,
        }
    }

    pub fn occasions(&self, date: NaiveDate) -> Occasions {
        Occasions {
            holy_week: self.holy_week.contains(&date),
            thanksgiving: self.thanksgiving.contains(&date),
            december: date.month() == 12,
            first_sunday_of_month: is_first_sunday_of_month(date),
            first_sunday_of_year: is_first_sunday_of_year(date),
        }
    }

    pub fn is_holy_week(&self, date: NaiveDate) -> bool {
        self.holy_week.contains(&date)
    }

    pub fn is_thanksgiving(&self, date: NaiveDate) -> bool {
        self.thanksgiving.contains(&date)
    }
}

/// Easter Sunday via the Meeus/Jones/Butcher algorithm (Gregorian calendar).
pub fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year.rem_euclid(19);
    let b = year.div_euclid(100);
    let c = year.rem_euclid(100);
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = ((h + l - 7 * m + 114) % 31) + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

/// Palm Sunday, Easter Sunday and the Sunday after Easter.
pub fn holy_week_sundays(year: i32) -> Vec<NaiveDate> {
    let Some(easter) = easter_sunday(year) else {
        return Vec::new();
    };
    [Duration::days(-7), Duration::zero(), Duration::days(7)]
        .into_iter()
        .filter_map(|offset| easter.checked_add_signed(offset))
        .collect()
}

pub fn is_first_sunday_of_month(date: NaiveDate) -> bool {
    date.weekday() == Weekday::Sun && date.day() <= 7
}

pub fn is_first_sunday_of_year(date: NaiveDate) -> bool {
    is_first_sunday_of_month(date) && date.month() == 1
}

/// Exclusive end of a run starting at `start` and spanning `months` calendar months.
pub fn schedule_end(start: NaiveDate, months: u32) -> NaiveDate {
    start
        .checked_add_months(Months::new(months))
        .unwrap_or(NaiveDate::MAX)
}

/// Sundays in `[start, end)`, seven days apart. The walk ends early at the
/// last representable date.
pub fn sundays_from(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    let offset = (7 - start.weekday().num_days_from_sunday()) % 7;
    let first = start.checked_add_days(Days::new(u64::from(offset)));
    std::iter::successors(first, |sunday| sunday.checked_add_days(Days::new(7)))
        .take_while(move |sunday| *sunday < end)
}

pub fn sundays_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    sundays_from(start, end).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn walk_starts_on_the_first_sunday_on_or_after_start() {
        let first = |start| sundays_from(start, d(2026, 1, 1)).next();
        assert_eq!(first(d(2025, 6, 1)), Some(d(2025, 6, 1)));
        assert_eq!(first(d(2025, 6, 2)), Some(d(2025, 6, 8)));
        assert_eq!(first(d(2025, 5, 31)), Some(d(2025, 6, 1)));
    }

    #[test]
    fn thanksgiving_needs_two_november_sundays_in_range() {
        let only_last = vec![d(2025, 11, 30)];
        let calendar = LiturgicalCalendar::for_sundays(&only_last);
        assert!(!calendar.is_thanksgiving(d(2025, 11, 30)));

        let november = sundays_between(d(2025, 11, 1), d(2025, 12, 1));
        let calendar = LiturgicalCalendar::for_sundays(&november);
        assert!(calendar.is_thanksgiving(d(2025, 11, 23)));
        assert!(calendar.is_thanksgiving(d(2025, 11, 30)));
        assert!(!calendar.is_thanksgiving(d(2025, 11, 16)));
    }

    #[test]
    fn sunday_walk_stops_at_the_last_representable_date() {
        let start = NaiveDate::MAX - Duration::days(20);
        let sundays = sundays_between(start, NaiveDate::MAX);
        assert!(!sundays.is_empty() && sundays.len() <= 3);
        assert!(sundays.iter().all(|sunday| sunday.weekday() == Weekday::Sun));
        assert_eq!(sundays_from(d(2025, 6, 1), NaiveDate::MAX).take(2).count(), 2);
    }

    #[test]
    fn first_sunday_flags() {
        let calendar = LiturgicalCalendar::default();
        let jan = calendar.occasions(d(2026, 1, 4));
        assert!(jan.first_sunday_of_year && jan.first_sunday_of_month);
        let feb = calendar.occasions(d(2026, 2, 1));
        assert!(feb.first_sunday_of_month && !feb.first_sunday_of_year);
        let later = calendar.occasions(d(2026, 2, 8));
        assert!(!later.is_special());
    }
}
