use crate::psalm::{Psalm, ReadingRecord};
use chrono::NaiveDate;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("psalm id must be positive (got {0})")]
    InvalidPsalmId(i32),
    #[error("psalm {0} requires a title")]
    MissingTitle(i32),
    #[error("psalm {id} has invalid total_verses {total_verses} (must be positive)")]
    InvalidVerseCount { id: i32, total_verses: i32 },
    #[error("planned reading on {0} requires a rule label")]
    MissingRuleLabel(NaiveDate),
    #[error("duplicate psalm id {0}")]
    DuplicatePsalm(i32),
    #[error("duplicate reading for psalm {psalm_id} on {date}")]
    DuplicateReading { psalm_id: i32, date: NaiveDate },
}

pub fn validate_psalm(psalm: &Psalm) -> Result<(), ValidationError> {
    if psalm.id <= 0 {
        return Err(ValidationError::InvalidPsalmId(psalm.id));
    }
    if psalm.title.trim().is_empty() {
        return Err(ValidationError::MissingTitle(psalm.id));
    }
    if psalm.total_verses <= 0 {
        return Err(ValidationError::InvalidVerseCount {
            id: psalm.id,
            total_verses: psalm.total_verses,
        });
    }
    Ok(())
}

pub fn validate_psalm_collection(psalms: &[Psalm]) -> Result<(), ValidationError> {
    let mut seen_ids = HashSet::with_capacity(psalms.len());
    for psalm in psalms {
        if !seen_ids.insert(psalm.id) {
            return Err(ValidationError::DuplicatePsalm(psalm.id));
        }
        validate_psalm(psalm)?;
    }
    Ok(())
}

/// One record per (psalm, date).
pub fn validate_reading_collection(readings: &[ReadingRecord]) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(readings.len());
    for reading in readings {
        if reading.psalm_id <= 0 {
            return Err(ValidationError::InvalidPsalmId(reading.psalm_id));
        }
        if !seen.insert((reading.psalm_id, reading.date_read)) {
            return Err(ValidationError::DuplicateReading {
                psalm_id: reading.psalm_id,
                date: reading.date_read,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn psalm(id: i32) -> Psalm {
        Psalm::new(id, format!("Psalm {id}"), 10, None, [""; 0], [""; 0]).unwrap()
    }

    #[test]
    fn duplicate_psalm_ids_are_rejected() {
        let psalms = vec![psalm(1), psalm(2), psalm(1)];
        assert_eq!(
            validate_psalm_collection(&psalms),
            Err(ValidationError::DuplicatePsalm(1))
        );
    }

    #[test]
    fn hand_built_psalm_is_checked() {
        let mut bad = psalm(4);
        bad.total_verses = -1;
        assert!(matches!(
            validate_psalm(&bad),
            Err(ValidationError::InvalidVerseCount { id: 4, .. })
        ));
    }

    #[test]
    fn duplicate_readings_on_same_day_are_rejected() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 2).unwrap();
        let readings = vec![
            ReadingRecord::new(Uuid::new_v4(), 8, date, None).unwrap(),
            ReadingRecord::new(Uuid::new_v4(), 8, date, Some("General")).unwrap(),
        ];
        assert_eq!(
            validate_reading_collection(&readings),
            Err(ValidationError::DuplicateReading { psalm_id: 8, date })
        );
    }
}
