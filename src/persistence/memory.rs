use chrono::NaiveDate;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{
    PersistenceError, PersistenceResult, PsalmCatalog, ReadingHistory, ReadingStore, conflict,
};
use crate::psalm::{Psalm, ReadingRecord};
use crate::psalm_validation::validate_psalm_collection;

#[derive(Debug, Default)]
struct StoreState {
    psalms: BTreeMap<i32, Psalm>,
    readings: Vec<ReadingRecord>,
}

impl StoreState {
    fn has_conflict(&self, reading: &ReadingRecord, ignore: Option<Uuid>) -> bool {
        self.readings.iter().any(|existing| {
            Some(existing.id) != ignore
                && existing.psalm_id == reading.psalm_id
                && existing.date_read == reading.date_read
        })
    }

    fn insert(&mut self, reading: &ReadingRecord) -> PersistenceResult<()> {
        if self.readings.iter().any(|existing| existing.id == reading.id) {
            return Err(PersistenceError::Conflict(format!(
                "reading {} already exists",
                reading.id
            )));
        }
        if self.has_conflict(reading, None) {
            return Err(conflict(reading.psalm_id, reading.date_read));
        }
        self.readings.push(reading.clone());
        Ok(())
    }
}

/// Process-local store used when no database is configured, and in tests.
#[derive(Debug, Default)]
pub struct MemoryReadingStore {
    state: RwLock<StoreState>,
}

impl MemoryReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_psalms(psalms: Vec<Psalm>) -> PersistenceResult<Self> {
        let store = Self::new();
        store.replace_psalms(&psalms)?;
        Ok(store)
    }

    /// Drops readings whose date matches `clear`, then inserts `readings`.
    /// Works on a staged copy so a failed insert leaves the store untouched.
    fn replace_matching<F>(&self, clear: F, readings: &[ReadingRecord]) -> PersistenceResult<usize>
    where
        F: Fn(NaiveDate) -> bool,
    {
        let mut state = self.state.write();
        let mut staged = StoreState {
            psalms: BTreeMap::new(),
            readings: state.readings.clone(),
        };
        staged.readings.retain(|reading| !clear(reading.date_read));
        let removed = state.readings.len() - staged.readings.len();
        for reading in readings {
            staged.insert(reading)?;
        }
        state.readings = staged.readings;
        Ok(removed)
    }
}

impl PsalmCatalog for MemoryReadingStore {
    fn all_psalms(&self) -> PersistenceResult<Vec<Psalm>> {
        Ok(self.state.read().psalms.values().cloned().collect())
    }

    fn psalm(&self, id: i32) -> PersistenceResult<Option<Psalm>> {
        Ok(self.state.read().psalms.get(&id).cloned())
    }
}

impl ReadingHistory for MemoryReadingStore {
    fn all_readings(&self) -> PersistenceResult<Vec<ReadingRecord>> {
        let mut readings = self.state.read().readings.clone();
        readings.sort_by_key(|reading| (reading.date_read, reading.psalm_id));
        Ok(readings)
    }
}

impl ReadingStore for MemoryReadingStore {
    fn replace_psalms(&self, psalms: &[Psalm]) -> PersistenceResult<()> {
        validate_psalm_collection(psalms)?;
        let mut state = self.state.write();
        state.psalms = psalms.iter().map(|psalm| (psalm.id, psalm.clone())).collect();
        Ok(())
    }

    fn add_reading(&self, reading: &ReadingRecord) -> PersistenceResult<()> {
        self.state.write().insert(reading)
    }

    fn add_readings(&self, readings: &[ReadingRecord]) -> PersistenceResult<usize> {
        self.replace_matching(|_| false, readings)?;
        Ok(readings.len())
    }

    fn update_reading(&self, reading: &ReadingRecord) -> PersistenceResult<bool> {
        let mut state = self.state.write();
        if state.has_conflict(reading, Some(reading.id)) {
            return Err(conflict(reading.psalm_id, reading.date_read));
        }
        match state.readings.iter_mut().find(|existing| existing.id == reading.id) {
            Some(existing) => {
                *existing = reading.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_reading(&self, id: Uuid) -> PersistenceResult<bool> {
        let mut state = self.state.write();
        let before = state.readings.len();
        state.readings.retain(|reading| reading.id != id);
        Ok(state.readings.len() != before)
    }

    fn clear_range(&self, start: NaiveDate, end: NaiveDate) -> PersistenceResult<usize> {
        let mut state = self.state.write();
        let before = state.readings.len();
        state
            .readings
            .retain(|reading| reading.date_read < start || reading.date_read > end);
        Ok(before - state.readings.len())
    }

    fn replace_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        readings: &[ReadingRecord],
    ) -> PersistenceResult<usize> {
        self.replace_matching(|date| date >= start && date <= end, readings)
    }

    fn replace_dates(
        &self,
        dates: &[NaiveDate],
        readings: &[ReadingRecord],
    ) -> PersistenceResult<usize> {
        self.replace_matching(|date| dates.contains(&date), readings)
    }
}
