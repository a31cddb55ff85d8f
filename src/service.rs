use chrono::{DateTime, Days, NaiveDate, Utc};
use log::info;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::io::Read;
use thiserror::Error;
use uuid::Uuid;

use crate::calendar::schedule_end;
use crate::config::SchedulerConfig;
use crate::eligibility::EligibilityFilter;
use crate::persistence::{
    ExportRange, ImportMode, ImportPreview, ImportResult, PersistenceError, PsalmCatalog,
    ReadingExport, ReadingHistory, ReadingStore, export_readings, normalize_import, parse_psalms_csv, plan_import, plan_to_ics,
    preview_import,
};
use crate::psalm::{PlannedReading, Psalm, ReadingRecord};
use crate::psalm_validation::ValidationError;
use crate::scheduler::{ScheduleError, plan_sundays};
use crate::stats::{ReadingStats, StatsRange, compute_stats};

/// Plan lengths offered to users.
pub const ALLOWED_MONTHS: [i32; 5] = [1, 2, 3, 6, 12];

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    NotFound(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

pub fn validate_months(months: i32) -> ServiceResult<()> {
    if ALLOWED_MONTHS.contains(&months) {
        Ok(())
    } else {
        Err(ServiceError::InvalidArgument(format!(
            "months must be one of {ALLOWED_MONTHS:?} (got {months})"
        )))
    }
}

/// Application operations over a [`ReadingStore`].
pub struct ReadingService<S> {
    store: S,
    config: SchedulerConfig,
}

impl<S: ReadingStore> ReadingService<S> {
    pub fn new(store: S, config: SchedulerConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: SchedulerConfig) {
        self.config = config;
    }

    pub fn eligibility(&self) -> EligibilityFilter {
        EligibilityFilter::new(self.config.max_readable_verses)
    }

    pub fn psalms(&self) -> ServiceResult<Vec<Psalm>> {
        Ok(self.store.all_psalms()?)
    }

    pub fn psalm(&self, id: i32) -> ServiceResult<Psalm> {
        self.store
            .psalm(id)?
            .ok_or_else(|| ServiceError::NotFound(format!("psalm {id} not found")))
    }

    /// Replaces the catalog with the rows of a psalm CSV.
    pub fn import_catalog_csv<R: Read>(&self, input: R) -> ServiceResult<usize> {
        let psalms = parse_psalms_csv(input)?;
        self.store.replace_psalms(&psalms)?;
        info!("imported {} psalms", psalms.len());
        Ok(psalms.len())
    }

    /// Seeds the catalog only when it is empty. Returns whether it did.
    pub fn seed_catalog_csv<R: Read>(&self, input: R) -> ServiceResult<bool> {
        if !self.store.all_psalms()?.is_empty() {
            return Ok(false);
        }
        self.import_catalog_csv(input)?;
        Ok(true)
    }

    pub fn readings(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> ServiceResult<Vec<ReadingRecord>> {
        let readings = match (from, to) {
            (Some(from), Some(to)) => self.store.readings_between(from, to)?,
            (from, to) => self
                .store
                .all_readings()?
                .into_iter()
                .filter(|reading| {
                    from.is_none_or(|from| reading.date_read >= from)
                        && to.is_none_or(|to| reading.date_read <= to)
                })
                .collect(),
        };
        Ok(readings)
    }

    pub fn add_reading(
        &self,
        psalm_id: i32,
        date_read: NaiveDate,
        rule_applied: Option<&str>,
    ) -> ServiceResult<ReadingRecord> {
        self.psalm(psalm_id)?;
        let record = ReadingRecord::new(Uuid::new_v4(), psalm_id, date_read, rule_applied)?;
        self.store.add_reading(&record)?;
        Ok(record)
    }

    pub fn update_reading(
        &self,
        id: Uuid,
        psalm_id: i32,
        date_read: NaiveDate,
        rule_applied: Option<&str>,
    ) -> ServiceResult<ReadingRecord> {
        self.psalm(psalm_id)?;
        let record = ReadingRecord::new(id, psalm_id, date_read, rule_applied)?;
        if !self.store.update_reading(&record)? {
            return Err(ServiceError::NotFound(format!("reading {id} not found")));
        }
        Ok(record)
    }

    pub fn delete_reading(&self, id: Uuid) -> ServiceResult<()> {
        if self.store.delete_reading(id)? {
            Ok(())
        } else {
            Err(ServiceError::NotFound(format!("reading {id} not found")))
        }
    }

    /// Plans `[start, start + months)` ignoring readings already stored in
    /// that range, since committing the plan replaces them.
    pub fn preview_schedule(
        &self,
        start: NaiveDate,
        months: i32,
        seed: Option<u64>,
    ) -> ServiceResult<Vec<PlannedReading>> {
        let (plan, _) = self.plan(start, months, seed)?;
        Ok(plan)
    }

    /// Plans the range and swaps it in for what was stored there, atomically.
    pub fn commit_schedule(
        &self,
        start: NaiveDate,
        months: i32,
        seed: Option<u64>,
    ) -> ServiceResult<Vec<PlannedReading>> {
        let (plan, last_day) = self.plan(start, months, seed)?;
        let records: Vec<ReadingRecord> = plan.iter().map(ReadingRecord::from).collect();
        let removed = self.store.replace_range(start, last_day, &records)?;
        info!(
            "committed {} readings from {start} to {last_day}, replacing {removed}",
            records.len()
        );
        Ok(plan)
    }

    pub fn schedule_ics(
        &self,
        start: NaiveDate,
        months: i32,
        seed: Option<u64>,
        stamp: DateTime<Utc>,
    ) -> ServiceResult<String> {
        let plan = self.preview_schedule(start, months, seed)?;
        let psalms = self.store.all_psalms()?;
        Ok(plan_to_ics(&plan, &psalms, stamp))
    }

    fn plan(
        &self,
        start: NaiveDate,
        months: i32,
        seed: Option<u64>,
    ) -> ServiceResult<(Vec<PlannedReading>, NaiveDate)> {
        if months <= 0 {
            return Err(ScheduleError::InvalidMonths(months).into());
        }
        let end = schedule_end(start, months as u32);
        let last_day = end.checked_sub_days(Days::new(1)).unwrap_or(end);

        let psalms = self.store.all_psalms()?;
        let history: Vec<ReadingRecord> = self
            .store
            .all_readings()?
            .into_iter()
            .filter(|reading| reading.date_read < start || reading.date_read >= end)
            .collect();

        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let plan = plan_sundays(start, months, &psalms, &history, &self.config, &mut rng)?;
        Ok((plan, last_day))
    }

    pub fn export(&self, range: ExportRange, exported_at: DateTime<Utc>) -> ServiceResult<ReadingExport> {
        let readings = self.store.all_readings()?;
        Ok(export_readings(&readings, range, exported_at))
    }

    pub fn preview_import(&self, export: &ReadingExport) -> ServiceResult<ImportPreview> {
        let records = normalize_import(export)?;
        let existing = self.existing_for(&records)?;
        Ok(preview_import(&records, &existing))
    }

    pub fn import(&self, export: &ReadingExport, mode: ImportMode) -> ServiceResult<ImportResult> {
        let records = normalize_import(export)?;
        if records.is_empty() {
            return Ok(ImportResult::default());
        }
        let existing = self.store.all_readings()?;
        let plan = plan_import(records, &existing, mode);
        self.store.replace_dates(&plan.clear_dates, &plan.insert)?;
        info!(
            "imported {} readings, skipped {}, replaced {} dates",
            plan.result.imported, plan.result.skipped, plan.result.replaced_dates
        );
        Ok(plan.result)
    }

    pub fn stats(&self, range: StatsRange, today: NaiveDate) -> ServiceResult<ReadingStats> {
        let psalms = self.store.all_psalms()?;
        let readings = self.store.all_readings()?;
        Ok(compute_stats(&psalms, &readings, range, today, &self.eligibility())?)
    }

    fn existing_for(&self, records: &[ReadingRecord]) -> ServiceResult<Vec<ReadingRecord>> {
        let (Some(min), Some(max)) = (
            records.iter().map(|r| r.date_read).min(),
            records.iter().map(|r| r.date_read).max(),
        ) else {
            return Ok(Vec::new());
        };
        Ok(self.store.readings_between(min, max)?)
    }
}
