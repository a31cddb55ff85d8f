use chrono::NaiveDate;
use polars::prelude::PolarsError;
use serde_json::Error as SerdeJsonError;
use std::io;
use thiserror::Error;
use uuid::Uuid;

use crate::psalm::{Psalm, ReadingRecord};
use crate::psalm_validation::ValidationError;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("serialization error: {0}")]
    Serialization(#[from] SerdeJsonError),
    #[error("dataframe conversion error: {0}")]
    DataFrame(#[from] PolarsError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("record not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<ValidationError> for PersistenceError {
    fn from(value: ValidationError) -> Self {
        Self::InvalidData(value.to_string())
    }
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Read-only view of the psalm catalog.
pub trait PsalmCatalog {
    fn all_psalms(&self) -> PersistenceResult<Vec<Psalm>>;

    fn psalm(&self, id: i32) -> PersistenceResult<Option<Psalm>> {
        Ok(self.all_psalms()?.into_iter().find(|psalm| psalm.id == id))
    }
}

/// Read-only view of past and already planned readings.
pub trait ReadingHistory {
    fn all_readings(&self) -> PersistenceResult<Vec<ReadingRecord>>;

    /// Readings dated within `[start, end]`, ordered by date.
    fn readings_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PersistenceResult<Vec<ReadingRecord>> {
        let mut readings: Vec<ReadingRecord> = self
            .all_readings()?
            .into_iter()
            .filter(|reading| reading.date_read >= start && reading.date_read <= end)
            .collect();
        readings.sort_by_key(|reading| (reading.date_read, reading.psalm_id));
        Ok(readings)
    }
}

/// Owning store for the catalog and every reading.
///
/// A psalm can be read at most once per date; inserts that would break this
/// fail with [`PersistenceError::Conflict`].
pub trait ReadingStore: PsalmCatalog + ReadingHistory + Send + Sync {
    fn replace_psalms(&self, psalms: &[Psalm]) -> PersistenceResult<()>;
    fn add_reading(&self, reading: &ReadingRecord) -> PersistenceResult<()>;
    /// Inserts all readings atomically.
    fn add_readings(&self, readings: &[ReadingRecord]) -> PersistenceResult<usize>;
    /// Returns `false` when no reading has the given id.
    fn update_reading(&self, reading: &ReadingRecord) -> PersistenceResult<bool>;
    fn delete_reading(&self, id: Uuid) -> PersistenceResult<bool>;
    /// Removes readings dated within `[start, end]` and returns how many went.
    fn clear_range(&self, start: NaiveDate, end: NaiveDate) -> PersistenceResult<usize>;
    /// Clears `[start, end]` and inserts `readings` in one atomic step. On
    /// error nothing changes. Returns how many readings were removed.
    fn replace_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        readings: &[ReadingRecord],
    ) -> PersistenceResult<usize>;
    /// [`ReadingStore::replace_range`] over a set of single dates.
    fn replace_dates(
        &self,
        dates: &[NaiveDate],
        readings: &[ReadingRecord],
    ) -> PersistenceResult<usize>;
}

impl PsalmCatalog for [Psalm] {
    fn all_psalms(&self) -> PersistenceResult<Vec<Psalm>> {
        Ok(self.to_vec())
    }
}

impl PsalmCatalog for Vec<Psalm> {
    fn all_psalms(&self) -> PersistenceResult<Vec<Psalm>> {
        Ok(self.clone())
    }
}

impl ReadingHistory for [ReadingRecord] {
    fn all_readings(&self) -> PersistenceResult<Vec<ReadingRecord>> {
        Ok(self.to_vec())
    }
}

impl ReadingHistory for Vec<ReadingRecord> {
    fn all_readings(&self) -> PersistenceResult<Vec<ReadingRecord>> {
        Ok(self.clone())
    }
}

impl<T: PsalmCatalog + ?Sized> PsalmCatalog for Box<T> {
    fn all_psalms(&self) -> PersistenceResult<Vec<Psalm>> {
        (**self).all_psalms()
    }

    fn psalm(&self, id: i32) -> PersistenceResult<Option<Psalm>> {
        (**self).psalm(id)
    }
}

impl<T: ReadingHistory + ?Sized> ReadingHistory for Box<T> {
    fn all_readings(&self) -> PersistenceResult<Vec<ReadingRecord>> {
        (**self).all_readings()
    }

    fn readings_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PersistenceResult<Vec<ReadingRecord>> {
        (**self).readings_between(start, end)
    }
}

impl<T: ReadingStore + ?Sized> ReadingStore for Box<T> {
    fn replace_psalms(&self, psalms: &[Psalm]) -> PersistenceResult<()> {
        (**self).replace_psalms(psalms)
    }

    fn add_reading(&self, reading: &ReadingRecord) -> PersistenceResult<()> {
        (**self).add_reading(reading)
    }

    fn add_readings(&self, readings: &[ReadingRecord]) -> PersistenceResult<usize> {
        (**self).add_readings(readings)
    }

    fn update_reading(&self, reading: &ReadingRecord) -> PersistenceResult<bool> {
        (**self).update_reading(reading)
    }

    fn delete_reading(&self, id: Uuid) -> PersistenceResult<bool> {
        (**self).delete_reading(id)
    }

    fn clear_range(&self, start: NaiveDate, end: NaiveDate) -> PersistenceResult<usize> {
        (**self).clear_range(start, end)
    }

    fn replace_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        readings: &[ReadingRecord],
    ) -> PersistenceResult<usize> {
        (**self).replace_range(start, end, readings)
    }

    fn replace_dates(
        &self,
        dates: &[NaiveDate],
        readings: &[ReadingRecord],
    ) -> PersistenceResult<usize> {
        (**self).replace_dates(dates, readings)
    }
}

/// SQLite store at `database_path` when given, otherwise an in-memory store.
pub fn open_store(database_path: Option<&str>) -> PersistenceResult<Box<dyn ReadingStore>> {
    match database_path {
        #[cfg(feature = "sqlite")]
        Some(path) => Ok(Box::new(sqlite::SqliteReadingStore::new(path)?)),
        #[cfg(not(feature = "sqlite"))]
        Some(path) => Err(PersistenceError::InvalidData(format!(
            "cannot open '{path}': built without the `sqlite` feature"
        ))),
        None => Ok(Box::new(memory::MemoryReadingStore::new())),
    }
}

pub(crate) fn conflict(psalm_id: i32, date: NaiveDate) -> PersistenceError {
    PersistenceError::Conflict(format!("psalm {psalm_id} is already recorded on {date}"))
}

pub mod file;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file::{
    ExportRange, ExportRecord, ImportMode, ImportPlan, ImportPreview, ImportResult,
    ReadingExport, export_readings, format_date, load_psalms_from_csv, load_readings_from_json,
    normalize_import, parse_date, parse_ics_readings, parse_psalms_csv, parse_reading_export,
    plan_import, plan_to_ics, preview_import, save_readings_to_json,
};
pub use memory::MemoryReadingStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteReadingStore;
