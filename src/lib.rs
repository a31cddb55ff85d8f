pub mod balance;
pub mod calendar;
pub mod config;
pub mod eligibility;
#[cfg(feature = "http_api")]
pub mod http_api;
pub mod persistence;
pub mod psalm;
pub(crate) mod psalm_validation;
pub mod rules;
pub mod scheduler;
pub mod service;
pub mod stats;

pub use balance::{BalanceTracker, TypeBalanceStats};
pub use calendar::{LiturgicalCalendar, Occasions, easter_sunday, holy_week_sundays};
pub use config::{AppConfig, SchedulerConfig};
pub use eligibility::{EligibilityFilter, IMPRECATORY_PSALMS};
#[cfg(feature = "sqlite")]
pub use persistence::SqliteReadingStore;
pub use persistence::{
    ExportRange, ImportMode, MemoryReadingStore, PersistenceError, PsalmCatalog, ReadingExport,
    ReadingHistory, ReadingStore,
};
pub use psalm::{PlannedReading, Psalm, ReadingRecord};
pub use psalm_validation::{
    ValidationError, validate_psalm, validate_psalm_collection, validate_reading_collection,
};
pub use rules::ReadingRule;
pub use scheduler::{ScheduleError, generate_schedule, plan_sundays};
pub use service::{ALLOWED_MONTHS, ReadingService, ServiceError};
pub use stats::{ReadingStats, StatsRange, TypeStats};
