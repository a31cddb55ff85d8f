use chrono::NaiveDate;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use std::sync::Mutex;
use uuid::Uuid;

use super::file::{format_date, parse_date};
use super::{
    PersistenceError, PersistenceResult, PsalmCatalog, ReadingHistory, ReadingStore, conflict,
};
use crate::psalm::{Psalm, ReadingRecord};
use crate::psalm_validation::validate_psalm_collection;

pub struct SqliteReadingStore {
    connection: Mutex<Connection>,
}

impl SqliteReadingStore {
    pub fn new<P: AsRef<std::path::Path>>(path: P) -> PersistenceResult<Self> {
        let connection = Connection::open(path)?;
        Self::initialize_schema(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    pub fn in_memory() -> PersistenceResult<Self> {
        let connection = Connection::open_in_memory()?;
        Self::initialize_schema(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn initialize_schema(connection: &Connection) -> PersistenceResult<()> {
        let ddl = r#"
            CREATE TABLE IF NOT EXISTS psalms (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                total_verses INTEGER NOT NULL,
                psalm_type TEXT,
                epigraphs_json TEXT NOT NULL,
                themes_json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS readings (
                id TEXT PRIMARY KEY,
                psalm_id INTEGER NOT NULL,
                date_read TEXT NOT NULL,
                rule_applied TEXT,
                UNIQUE (psalm_id, date_read)
            );
            CREATE INDEX IF NOT EXISTS readings_by_date ON readings (date_read);
        "#;
        connection.execute_batch(ddl)?;
        Ok(())
    }

    fn insert_reading(tx: &rusqlite::Transaction, reading: &ReadingRecord) -> PersistenceResult<()> {
        tx.execute(
            "INSERT INTO readings (id, psalm_id, date_read, rule_applied) VALUES (?1, ?2, ?3, ?4)",
            params![
                reading.id.to_string(),
                reading.psalm_id,
                format_date(reading.date_read),
                reading.rule_applied
            ],
        )
        .map_err(|err| map_constraint(err, reading))?;
        Ok(())
    }

    fn query_readings(
        conn: &Connection,
        sql: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> PersistenceResult<Vec<ReadingRecord>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(args, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i32>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;

        let mut readings = Vec::new();
        for row in rows {
            let (id, psalm_id, date, rule_applied) = row?;
            let id = Uuid::parse_str(&id)
                .map_err(|err| PersistenceError::InvalidData(format!("invalid reading id '{id}': {err}")))?;
            readings.push(ReadingRecord {
                id,
                psalm_id,
                date_read: parse_date(&date)?,
                rule_applied,
            });
        }
        Ok(readings)
    }
}

impl PsalmCatalog for SqliteReadingStore {
    fn all_psalms(&self) -> PersistenceResult<Vec<Psalm>> {
        let conn = self.connection.lock().expect("sqlite mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, title, total_verses, psalm_type, epigraphs_json, themes_json FROM psalms ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], psalm_columns)?;
        let mut psalms = Vec::new();
        for row in rows {
            psalms.push(psalm_from_columns(row?)?);
        }
        Ok(psalms)
    }

    fn psalm(&self, id: i32) -> PersistenceResult<Option<Psalm>> {
        let conn = self.connection.lock().expect("sqlite mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, title, total_verses, psalm_type, epigraphs_json, themes_json FROM psalms WHERE id = ?1",
        )?;
        let columns = stmt.query_row(params![id], psalm_columns).optional()?;
        columns.map(psalm_from_columns).transpose()
    }
}

impl ReadingHistory for SqliteReadingStore {
    fn all_readings(&self) -> PersistenceResult<Vec<ReadingRecord>> {
        let conn = self.connection.lock().expect("sqlite mutex poisoned");
        Self::query_readings(
            &conn,
            "SELECT id, psalm_id, date_read, rule_applied FROM readings ORDER BY date_read, psalm_id",
            params![],
        )
    }

    fn readings_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PersistenceResult<Vec<ReadingRecord>> {
        let conn = self.connection.lock().expect("sqlite mutex poisoned");
        let (start, end) = (range_bound(start), range_bound(end));
        Self::query_readings(
            &conn,
            "SELECT id, psalm_id, date_read, rule_applied FROM readings \
             WHERE date_read >= ?1 AND date_read <= ?2 ORDER BY date_read, psalm_id",
            params![start, end],
        )
    }
}

impl ReadingStore for SqliteReadingStore {
    fn replace_psalms(&self, psalms: &[Psalm]) -> PersistenceResult<()> {
        validate_psalm_collection(psalms)?;
        let mut conn = self.connection.lock().expect("sqlite mutex poisoned");
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM psalms", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO psalms (id, title, total_verses, psalm_type, epigraphs_json, themes_json) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for psalm in psalms {
                stmt.execute(params![
                    psalm.id,
                    psalm.title,
                    psalm.total_verses,
                    psalm.psalm_type,
                    serde_json::to_string(&psalm.epigraphs)?,
                    serde_json::to_string(&psalm.themes)?,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn add_reading(&self, reading: &ReadingRecord) -> PersistenceResult<()> {
        self.add_readings(std::slice::from_ref(reading)).map(|_| ())
    }

    fn add_readings(&self, readings: &[ReadingRecord]) -> PersistenceResult<usize> {
        let mut conn = self.connection.lock().expect("sqlite mutex poisoned");
        let tx = conn.transaction()?;
        for reading in readings {
            Self::insert_reading(&tx, reading)?;
        }
        tx.commit()?;
        Ok(readings.len())
    }

    fn update_reading(&self, reading: &ReadingRecord) -> PersistenceResult<bool> {
        let conn = self.connection.lock().expect("sqlite mutex poisoned");
        let changed = conn
            .execute(
                "UPDATE readings SET psalm_id = ?2, date_read = ?3, rule_applied = ?4 WHERE id = ?1",
                params![
                    reading.id.to_string(),
                    reading.psalm_id,
                    format_date(reading.date_read),
                    reading.rule_applied
                ],
            )
            .map_err(|err| map_constraint(err, reading))?;
        Ok(changed > 0)
    }

    fn delete_reading(&self, id: Uuid) -> PersistenceResult<bool> {
        let conn = self.connection.lock().expect("sqlite mutex poisoned");
        let changed = conn.execute("DELETE FROM readings WHERE id = ?1", params![id.to_string()])?;
        Ok(changed > 0)
    }

    fn clear_range(&self, start: NaiveDate, end: NaiveDate) -> PersistenceResult<usize> {
        let conn = self.connection.lock().expect("sqlite mutex poisoned");
        let removed = conn.execute(
            "DELETE FROM readings WHERE date_read >= ?1 AND date_read <= ?2",
            params![range_bound(start), range_bound(end)],
        )?;
        Ok(removed)
    }

    fn replace_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        readings: &[ReadingRecord],
    ) -> PersistenceResult<usize> {
        let mut conn = self.connection.lock().expect("sqlite mutex poisoned");
        let tx = conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM readings WHERE date_read >= ?1 AND date_read <= ?2",
            params![range_bound(start), range_bound(end)],
        )?;
        for reading in readings {
            Self::insert_reading(&tx, reading)?;
        }
        tx.commit()?;
        Ok(removed)
    }

    fn replace_dates(
        &self,
        dates: &[NaiveDate],
        readings: &[ReadingRecord],
    ) -> PersistenceResult<usize> {
        let mut conn = self.connection.lock().expect("sqlite mutex poisoned");
        let tx = conn.transaction()?;
        let mut removed = 0;
        for date in dates {
            removed += tx.execute(
                "DELETE FROM readings WHERE date_read = ?1",
                params![format_date(*date)],
            )?;
        }
        for reading in readings {
            Self::insert_reading(&tx, reading)?;
        }
        tx.commit()?;
        Ok(removed)
    }
}

/// Stored dates are four-digit `YYYY-MM-DD` text, so range bounds are
/// clamped into that span to keep string comparison ordered.
fn range_bound(date: NaiveDate) -> String {
    let first = NaiveDate::from_ymd_opt(0, 1, 1).unwrap_or(NaiveDate::MIN);
    let last = NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or(NaiveDate::MAX);
    format_date(date.clamp(first, last))
}

type PsalmColumns = (i32, String, i32, Option<String>, String, String);

fn psalm_columns(row: &Row<'_>) -> rusqlite::Result<PsalmColumns> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn psalm_from_columns(columns: PsalmColumns) -> PersistenceResult<Psalm> {
    let (id, title, total_verses, psalm_type, epigraphs, themes) = columns;
    let epigraphs: Vec<String> = serde_json::from_str(&epigraphs)?;
    let themes: Vec<String> = serde_json::from_str(&themes)?;
    Ok(Psalm::new(
        id,
        title,
        total_verses,
        psalm_type.as_deref(),
        epigraphs,
        themes,
    )?)
}

fn map_constraint(err: rusqlite::Error, reading: &ReadingRecord) -> PersistenceError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            conflict(reading.psalm_id, reading.date_read)
        }
        _ => PersistenceError::Sqlite(err),
    }
}
