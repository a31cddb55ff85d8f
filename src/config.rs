use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;

use crate::persistence::PersistenceResult;

pub const DEFAULT_MAX_READABLE_VERSES: i32 = 30;
/// Six weeks.
pub const DEFAULT_ROLLING_WINDOW_DAYS: i64 = 42;
/// Share of the largest type's readable count at which a type counts as high volume.
pub const DEFAULT_HIGH_VOLUME_SHARE: f64 = 0.6;
pub const DEFAULT_HIGH_VOLUME_MONTHLY_CAP: usize = 2;
pub const DEFAULT_MONTHLY_CAP: usize = 1;
pub const HOLY_WEEK_PSALMS: [i32; 6] = [113, 114, 115, 116, 117, 118];

/// Tunable knobs of the scheduling run. The window length and the monthly cap
/// threshold were tuned by hand and are not known to be optimal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub max_readable_verses: i32,
    pub rolling_window_days: i64,
    pub high_volume_share: f64,
    pub high_volume_monthly_cap: usize,
    pub default_monthly_cap: usize,
    pub priority_types: Vec<String>,
    pub new_year_theme: String,
    pub thanksgiving_theme: String,
    pub december_tag: String,
    pub praise_tag: String,
    pub holy_week_psalms: BTreeSet<i32>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_readable_verses: DEFAULT_MAX_READABLE_VERSES,
            rolling_window_days: DEFAULT_ROLLING_WINDOW_DAYS,
            high_volume_share: DEFAULT_HIGH_VOLUME_SHARE,
            high_volume_monthly_cap: DEFAULT_HIGH_VOLUME_MONTHLY_CAP,
            default_monthly_cap: DEFAULT_MONTHLY_CAP,
            priority_types: vec!["alabanza".to_string(), "lamento".to_string()],
            new_year_theme: "Días festivos: año nuevo".to_string(),
            thanksgiving_theme: "Días festivos: Agradecimiento".to_string(),
            december_tag: "mesiánico".to_string(),
            praise_tag: "alabanza".to_string(),
            holy_week_psalms: HOLY_WEEK_PSALMS.into_iter().collect(),
        }
    }
}

impl SchedulerConfig {
    pub fn load_json<P: AsRef<Path>>(path: P) -> PersistenceResult<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> PersistenceResult<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

/// Settings for the binaries, read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub http_addr: String,
    pub database_path: Option<String>,
    pub catalog_csv: Option<String>,
    pub scheduler_config: Option<String>,
}

impl AppConfig {
    pub const HTTP_ADDR_VAR: &'static str = "PSALM_SCHEDULE_HTTP_ADDR";
    pub const DATABASE_VAR: &'static str = "PSALM_SCHEDULE_DB";
    pub const CATALOG_VAR: &'static str = "PSALM_SCHEDULE_CATALOG";
    pub const CONFIG_VAR: &'static str = "PSALM_SCHEDULE_CONFIG";

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            http_addr: non_blank(Self::HTTP_ADDR_VAR).unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            database_path: non_blank(Self::DATABASE_VAR),
            catalog_csv: non_blank(Self::CATALOG_VAR),
            scheduler_config: non_blank(Self::CONFIG_VAR),
        }
    }

    pub fn load_scheduler_config(&self) -> PersistenceResult<SchedulerConfig> {
        match &self.scheduler_config {
            Some(path) => SchedulerConfig::load_json(path),
            None => Ok(SchedulerConfig::default()),
        }
    }
}
