use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;
use uuid::Uuid;

use crate::psalm_validation::ValidationError;

/// Catalog entry for a single psalm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Psalm {
    pub id: i32,
    pub title: String,
    pub total_verses: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub psalm_type: Option<String>,
    #[serde(default)]
    pub epigraphs: Vec<String>,
    #[serde(default)]
    pub themes: Vec<String>,
}

impl Psalm {
    pub fn new<E, T>(
        id: i32,
        title: impl Into<String>,
        total_verses: i32,
        psalm_type: Option<&str>,
        epigraphs: E,
        themes: T,
    ) -> Result<Self, ValidationError>
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        T: IntoIterator,
        T::Item: AsRef<str>,
    {
        if id <= 0 {
            return Err(ValidationError::InvalidPsalmId(id));
        }
        let title = title.into().trim().to_string();
        if title.is_empty() {
            return Err(ValidationError::MissingTitle(id));
        }
        if total_verses <= 0 {
            return Err(ValidationError::InvalidVerseCount { id, total_verses });
        }

        let psalm_type = psalm_type
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        Ok(Self {
            id,
            title,
            total_verses,
            psalm_type,
            epigraphs: clean_tags(epigraphs),
            themes: clean_tags(themes),
        })
    }

    /// Lowercased, trimmed type used as the balancing key. Untyped psalms have none.
    pub fn type_key(&self) -> Option<String> {
        self.psalm_type.as_deref().map(type_key)
    }

    pub fn has_type(&self, value: &str) -> bool {
        self.psalm_type
            .as_deref()
            .is_some_and(|psalm_type| tags_match(psalm_type, value))
    }

    pub fn has_theme(&self, value: &str) -> bool {
        self.themes.iter().any(|theme| tags_match(theme, value))
    }

    pub fn has_epigraph(&self, value: &str) -> bool {
        self.epigraphs.iter().any(|epigraph| tags_match(epigraph, value))
    }
}

/// A past or already scheduled reading of a psalm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingRecord {
    pub id: Uuid,
    pub psalm_id: i32,
    pub date_read: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_applied: Option<String>,
}

impl ReadingRecord {
    pub fn new(
        id: Uuid,
        psalm_id: i32,
        date_read: NaiveDate,
        rule_applied: Option<&str>,
    ) -> Result<Self, ValidationError> {
        if psalm_id <= 0 {
            return Err(ValidationError::InvalidPsalmId(psalm_id));
        }
        let id = if id.is_nil() { Uuid::new_v4() } else { id };
        let rule_applied = rule_applied
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        Ok(Self {
            id,
            psalm_id,
            date_read,
            rule_applied,
        })
    }
}

/// Output of a scheduling run: one psalm assigned to one Sunday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedReading {
    pub id: Uuid,
    pub psalm_id: i32,
    pub scheduled_date: NaiveDate,
    pub rule_applied: String,
}

impl PlannedReading {
    pub fn new(
        id: Uuid,
        psalm_id: i32,
        scheduled_date: NaiveDate,
        rule_applied: &str,
    ) -> Result<Self, ValidationError> {
        if psalm_id <= 0 {
            return Err(ValidationError::InvalidPsalmId(psalm_id));
        }
        let rule_applied = rule_applied.trim();
        if rule_applied.is_empty() {
            return Err(ValidationError::MissingRuleLabel(scheduled_date));
        }
        Ok(Self {
            id,
            psalm_id,
            scheduled_date,
            rule_applied: rule_applied.to_string(),
        })
    }
}

impl From<&PlannedReading> for ReadingRecord {
    fn from(planned: &PlannedReading) -> Self {
        Self {
            id: planned.id,
            psalm_id: planned.psalm_id,
            date_read: planned.scheduled_date,
            rule_applied: Some(planned.rule_applied.clone()),
        }
    }
}

/// Canonical decomposition, combining marks stripped, lowercased and trimmed.
pub fn normalize_tag(value: &str) -> String {
    value
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .trim()
        .to_string()
}

/// Diacritic and case insensitive comparison. Blank sources never match.
pub fn tags_match(source: &str, target: &str) -> bool {
    if source.trim().is_empty() {
        return false;
    }
    normalize_tag(source) == normalize_tag(target)
}

pub fn type_key(value: &str) -> String {
    value.trim().to_lowercase()
}

fn clean_tags<I>(values: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut seen = std::collections::HashSet::new();
    let mut cleaned = Vec::new();
    for value in values {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_lowercase()) {
            cleaned.push(trimmed.to_string());
        }
    }
    cleaned
}
