use chrono::{Datelike, NaiveDate, Weekday};
use psalm_schedule::calendar::{schedule_end, sundays_between};
use psalm_schedule::{LiturgicalCalendar, easter_sunday, holy_week_sundays};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

#[test]
fn easter_matches_reference_dates() {
    assert_eq!(easter_sunday(2024), Some(d(2024, 3, 31)));
    assert_eq!(easter_sunday(2025), Some(d(2025, 4, 20)));
    assert_eq!(easter_sunday(2026), Some(d(2026, 4, 5)));
    assert_eq!(easter_sunday(2027), Some(d(2027, 3, 28)));
    assert_eq!(easter_sunday(2038), Some(d(2038, 4, 25)));
}

#[test]
fn holy_week_spans_three_sundays() {
    assert_eq!(
        holy_week_sundays(2025),
        vec![d(2025, 4, 13), d(2025, 4, 20), d(2025, 4, 27)]
    );
}

#[test]
fn sundays_start_on_or_after_start_date() {
    // 2025-06-01 is itself a Sunday.
    let sundays = sundays_between(d(2025, 6, 1), schedule_end(d(2025, 6, 1), 1));
    assert_eq!(sundays.first(), Some(&d(2025, 6, 1)));
    assert_eq!(sundays.last(), Some(&d(2025, 6, 29)));
    assert_eq!(sundays.len(), 5);

    let sundays = sundays_between(d(2025, 6, 2), schedule_end(d(2025, 6, 2), 1));
    assert_eq!(sundays.first(), Some(&d(2025, 6, 8)));
    assert!(sundays.iter().all(|s| s.weekday() == Weekday::Sun));
    assert!(sundays.iter().all(|s| *s < d(2025, 7, 2)));
}

#[test]
fn month_end_start_clamps_the_end_date() {
    assert_eq!(schedule_end(d(2025, 1, 31), 1), d(2025, 2, 28));
    assert_eq!(schedule_end(d(2024, 1, 31), 1), d(2024, 2, 29));
}

#[test]
fn thanksgiving_is_the_last_two_november_sundays_in_the_run() {
    let start = d(2025, 10, 1);
    let sundays = sundays_between(start, schedule_end(start, 3));
    let calendar = LiturgicalCalendar::for_sundays(&sundays);

    let marked: Vec<NaiveDate> = sundays
        .iter()
        .copied()
        .filter(|s| calendar.is_thanksgiving(*s))
        .collect();
    assert_eq!(marked, vec![d(2025, 11, 23), d(2025, 11, 30)]);
}

#[test]
fn a_single_november_sunday_is_not_thanksgiving() {
    let start = d(2025, 11, 25);
    let sundays = sundays_between(start, schedule_end(start, 1));
    assert_eq!(sundays[0], d(2025, 11, 30));
    let calendar = LiturgicalCalendar::for_sundays(&sundays);
    assert!(!calendar.is_thanksgiving(d(2025, 11, 30)));
}

#[test]
fn occasions_overlap_on_new_year_sunday() {
    let start = d(2026, 1, 1);
    let sundays = sundays_between(start, schedule_end(start, 1));
    let calendar = LiturgicalCalendar::for_sundays(&sundays);

    let occasions = calendar.occasions(d(2026, 1, 4));
    assert!(occasions.first_sunday_of_year);
    assert!(occasions.first_sunday_of_month);
    assert!(!occasions.december);

    let later = calendar.occasions(d(2026, 1, 11));
    assert!(!later.is_special());
}

#[test]
fn december_sundays_are_flagged() {
    let start = d(2025, 12, 1);
    let sundays = sundays_between(start, schedule_end(start, 1));
    let calendar = LiturgicalCalendar::for_sundays(&sundays);
    assert!(sundays.iter().all(|s| calendar.occasions(*s).december));
    assert!(calendar.occasions(d(2025, 12, 7)).first_sunday_of_month);
}
