use chrono::{DateTime, Datelike, NaiveDate, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use uuid::Uuid;

use super::{PersistenceError, PersistenceResult};
use crate::psalm::{PlannedReading, Psalm, ReadingRecord};
use crate::psalm_validation::validate_psalm_collection;

pub const READING_EXPORT_SCHEMA_VERSION: u32 = 1;
const DATE_FORMAT: &str = "%Y-%m-%d";
const ICS_LINE_OCTETS: usize = 75;

// ---------------------------------------------------------------------------
// Psalm catalog CSV

const CSV_COLUMNS: [&str; 6] = ["capitulo", "titulo", "total_verses", "tipo", "epigrafes", "temas"];

pub fn load_psalms_from_csv<P: AsRef<Path>>(path: P) -> PersistenceResult<Vec<Psalm>> {
    let file = File::open(path)?;
    parse_psalms_csv(file)
}

/// Reads a catalog with columns `capitulo, titulo, total_verses, tipo,
/// epigrafes, temas`. Header names are matched case-insensitively; list
/// columns hold comma-separated values.
pub fn parse_psalms_csv<R: Read>(input: R) -> PersistenceResult<Vec<Psalm>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(input);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|header| header.trim().to_lowercase())
        .collect();
    let mut positions = HashMap::new();
    for column in CSV_COLUMNS {
        if let Some(index) = headers.iter().position(|header| header == column) {
            positions.insert(column, index);
        }
    }
    for required in ["capitulo", "titulo", "total_verses"] {
        if !positions.contains_key(required) {
            return Err(PersistenceError::InvalidData(format!(
                "psalm CSV is missing column '{required}'"
            )));
        }
    }

    let mut psalms = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let row = index + 2;
        let field = |column: &str| {
            positions
                .get(column)
                .and_then(|position| record.get(*position))
                .unwrap_or("")
        };

        let id = parse_row_i32(field("capitulo"), "capitulo", row)?;
        let total_verses = parse_row_i32(field("total_verses"), "total_verses", row)?;
        let psalm_type = Some(field("tipo")).filter(|value| !value.is_empty());
        let psalm = Psalm::new(
            id,
            field("titulo"),
            total_verses,
            psalm_type,
            split_list(field("epigrafes")),
            split_list(field("temas")),
        )
        .map_err(|err| PersistenceError::InvalidData(format!("row {row}: {err}")))?;
        psalms.push(psalm);
    }

    validate_psalm_collection(&psalms)?;
    Ok(psalms)
}

fn parse_row_i32(value: &str, column: &str, row: usize) -> PersistenceResult<i32> {
    value.parse::<i32>().map_err(|e| {
        PersistenceError::InvalidData(format!("row {row}: invalid {column} '{value}': {e}"))
    })
}

fn split_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Reading export / import

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportRange {
    All,
    Year(i32),
}

impl ExportRange {
    pub fn parse(range: Option<&str>, year: Option<i32>) -> PersistenceResult<Self> {
        match range.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("all") => Ok(ExportRange::All),
            Some("year") => year.map(ExportRange::Year).ok_or_else(|| {
                PersistenceError::InvalidData("year is required when range is 'year'".into())
            }),
            Some(other) => Err(PersistenceError::InvalidData(format!(
                "unknown export range '{other}'"
            ))),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExportRange::All => "all",
            ExportRange::Year(_) => "year",
        }
    }

    pub fn year(&self) -> Option<i32> {
        match self {
            ExportRange::All => None,
            ExportRange::Year(year) => Some(*year),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        match self {
            ExportRange::All => true,
            ExportRange::Year(year) => date.year() == *year,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRecord {
    #[serde(default)]
    pub id: Uuid,
    pub psalm_id: i32,
    pub date_read: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_applied: Option<String>,
}

impl From<&ReadingRecord> for ExportRecord {
    fn from(reading: &ReadingRecord) -> Self {
        Self {
            id: reading.id,
            psalm_id: reading.psalm_id,
            date_read: reading.date_read,
            rule_applied: reading.rule_applied.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingExport {
    pub schema_version: u32,
    pub exported_at: DateTime<Utc>,
    pub range: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    pub records: Vec<ExportRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    /// Existing readings on conflicting dates are removed first.
    ReplaceConflicts,
    /// Incoming records on conflicting dates are dropped.
    IgnoreConflicts,
}

impl ImportMode {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "replace" | "replace_conflicts" | "replaceconflicts" => Some(ImportMode::ReplaceConflicts),
            "ignore" | "ignore_conflicts" | "ignoreconflicts" => Some(ImportMode::IgnoreConflicts),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportPreview {
    pub total_records: usize,
    pub conflict_count: usize,
    pub conflict_dates: Vec<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImportResult {
    pub imported: usize,
    pub skipped: usize,
    pub replaced_dates: usize,
}

/// What an import must do to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportPlan {
    pub clear_dates: Vec<NaiveDate>,
    pub insert: Vec<ReadingRecord>,
    pub result: ImportResult,
}

pub fn export_readings(
    readings: &[ReadingRecord],
    range: ExportRange,
    exported_at: DateTime<Utc>,
) -> ReadingExport {
    let mut records: Vec<ExportRecord> = readings
        .iter()
        .filter(|reading| range.contains(reading.date_read))
        .map(ExportRecord::from)
        .collect();
    records.sort_by_key(|record| (record.date_read, record.psalm_id));
    ReadingExport {
        schema_version: READING_EXPORT_SCHEMA_VERSION,
        exported_at,
        range: range.label().to_string(),
        year: range.year(),
        records,
    }
}

pub fn save_readings_to_json<P: AsRef<Path>>(
    export: &ReadingExport,
    path: P,
) -> PersistenceResult<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, export)?;
    Ok(())
}

pub fn load_readings_from_json<P: AsRef<Path>>(path: P) -> PersistenceResult<ReadingExport> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(file)?)
}

pub fn parse_reading_export(json: &str) -> PersistenceResult<ReadingExport> {
    Ok(serde_json::from_str(json)?)
}

/// Validates an export and collapses duplicate (psalm, date) pairs, keeping
/// the last occurrence. Output is ordered by date.
pub fn normalize_import(export: &ReadingExport) -> PersistenceResult<Vec<ReadingRecord>> {
    if export.schema_version != READING_EXPORT_SCHEMA_VERSION {
        return Err(PersistenceError::InvalidData(format!(
            "unsupported schema version {}",
            export.schema_version
        )));
    }

    let mut unique: BTreeMap<(NaiveDate, i32), &ExportRecord> = BTreeMap::new();
    for record in &export.records {
        if record.psalm_id <= 0 {
            return Err(PersistenceError::InvalidData(format!(
                "psalm_id must be positive (got {})",
                record.psalm_id
            )));
        }
        unique.insert((record.date_read, record.psalm_id), record);
    }

    unique
        .into_values()
        .map(|record| {
            ReadingRecord::new(
                record.id,
                record.psalm_id,
                record.date_read,
                record.rule_applied.as_deref(),
            )
            .map_err(PersistenceError::from)
        })
        .collect()
}

/// Dates among `records` that already hold any reading.
pub fn conflict_dates(records: &[ReadingRecord], existing: &[ReadingRecord]) -> Vec<NaiveDate> {
    let taken: HashSet<NaiveDate> = existing.iter().map(|reading| reading.date_read).collect();
    records
        .iter()
        .map(|record| record.date_read)
        .filter(|date| taken.contains(date))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn preview_import(records: &[ReadingRecord], existing: &[ReadingRecord]) -> ImportPreview {
    let conflicts = conflict_dates(records, existing);
    ImportPreview {
        total_records: records.len(),
        conflict_count: conflicts.len(),
        conflict_dates: conflicts,
    }
}

pub fn plan_import(
    records: Vec<ReadingRecord>,
    existing: &[ReadingRecord],
    mode: ImportMode,
) -> ImportPlan {
    let conflicts = conflict_dates(&records, existing);
    let conflict_set: HashSet<NaiveDate> = conflicts.iter().copied().collect();
    let total = records.len();

    let (clear_dates, insert) = match mode {
        ImportMode::ReplaceConflicts => (conflicts, records),
        ImportMode::IgnoreConflicts => {
            let kept: Vec<ReadingRecord> = records
                .into_iter()
                .filter(|record| !conflict_set.contains(&record.date_read))
                .collect();
            (Vec::new(), kept)
        }
    };

    // Ids that survive on untouched dates cannot be reused.
    let kept_ids: HashSet<Uuid> = existing
        .iter()
        .filter(|reading| !clear_dates.contains(&reading.date_read))
        .map(|reading| reading.id)
        .collect();
    let insert: Vec<ReadingRecord> = insert
        .into_iter()
        .map(|mut record| {
            if kept_ids.contains(&record.id) {
                record.id = Uuid::new_v4();
            }
            record
        })
        .collect();

    let result = ImportResult {
        imported: insert.len(),
        skipped: total - insert.len(),
        replaced_dates: clear_dates.len(),
    };
    ImportPlan {
        clear_dates,
        insert,
        result,
    }
}

// ---------------------------------------------------------------------------
// iCalendar

/// One all-day event per planned reading whose psalm is in `psalms`.
/// Returns an empty string when there is nothing to export.
pub fn plan_to_ics(plan: &[PlannedReading], psalms: &[Psalm], stamp: DateTime<Utc>) -> String {
    let by_id: HashMap<i32, &Psalm> = psalms.iter().map(|psalm| (psalm.id, psalm)).collect();
    let mut ordered: Vec<&PlannedReading> = plan.iter().collect();
    ordered.sort_by_key(|reading| reading.scheduled_date);

    let events: Vec<(&PlannedReading, &Psalm)> = ordered
        .into_iter()
        .filter_map(|reading| by_id.get(&reading.psalm_id).map(|psalm| (reading, *psalm)))
        .collect();
    if events.is_empty() {
        return String::new();
    }

    let mut lines = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        "PRODID:-//psalm-schedule//EN".to_string(),
        "METHOD:PUBLISH".to_string(),
    ];
    let stamp = stamp.format("%Y%m%dT%H%M%SZ").to_string();
    for (reading, psalm) in events {
        let start = reading.scheduled_date;
        let end = start.succ_opt().unwrap_or(start);
        let summary = format!("Salmo {} - {}", psalm.id, psalm.title);
        let description = format!(
            "{summary}\nCategoria: {}\nLink: https://www.bible.com/bible/103/PSA.{}.NBLA",
            psalm.psalm_type.as_deref().unwrap_or("Sin categoria"),
            psalm.id
        );
        lines.push("BEGIN:VEVENT".to_string());
        lines.push(format!("UID:{}@psalm-schedule", reading.id));
        lines.push(format!("DTSTAMP:{stamp}"));
        lines.push(format!("DTSTART;VALUE=DATE:{}", start.format("%Y%m%d")));
        lines.push(format!("DTEND;VALUE=DATE:{}", end.format("%Y%m%d")));
        lines.push(format!("SUMMARY:{}", escape_text(&summary)));
        lines.push(format!("DESCRIPTION:{}", escape_text(&description)));
        lines.push("END:VEVENT".to_string());
    }
    lines.push("END:VCALENDAR".to_string());

    let mut output = String::new();
    for line in lines {
        output.push_str(&fold_line(&line));
        output.push_str("\r\n");
    }
    output
}

/// Reads psalm readings back out of an iCalendar feed, such as one exported
/// by a calendar app. Each event must name its psalm as `Salmo N`, `Psalm N`
/// or through a `PSA.N.` link.
pub fn parse_ics_readings(ics: &str) -> PersistenceResult<ReadingExport> {
    if ics.trim().is_empty() {
        return Err(PersistenceError::InvalidData("ICS content is required".into()));
    }

    let mut records = Vec::new();
    let mut event: Option<HashMap<String, String>> = None;
    let mut saw_event = false;
    for line in unfold_lines(ics) {
        match line.as_str() {
            "BEGIN:VEVENT" => {
                event = Some(HashMap::new());
                saw_event = true;
            }
            "END:VEVENT" => {
                if let Some(fields) = event.take() {
                    if let Some(record) = event_to_record(&fields)? {
                        records.push(record);
                    }
                }
            }
            _ => {
                if let (Some(fields), Some((name, value))) = (event.as_mut(), line.split_once(':')) {
                    let name = name.split(';').next().unwrap_or(name).to_ascii_uppercase();
                    fields.insert(name, unescape_text(value));
                }
            }
        }
    }

    if !saw_event {
        return Err(PersistenceError::InvalidData("no calendar events found in ICS".into()));
    }
    Ok(ReadingExport {
        schema_version: READING_EXPORT_SCHEMA_VERSION,
        exported_at: Utc::now(),
        range: ExportRange::All.label().to_string(),
        year: None,
        records,
    })
}

fn event_to_record(fields: &HashMap<String, String>) -> PersistenceResult<Option<ExportRecord>> {
    let Some(start) = fields.get("DTSTART") else {
        warn!("skipping ICS event without DTSTART");
        return Ok(None);
    };
    let digits: String = start.chars().take(8).collect();
    let date_read = NaiveDate::parse_from_str(&digits, "%Y%m%d").map_err(|e| {
        PersistenceError::InvalidData(format!("invalid DTSTART '{start}': {e}"))
    })?;

    let summary = fields.get("SUMMARY").map(String::as_str).unwrap_or("");
    let description = fields.get("DESCRIPTION").map(String::as_str).unwrap_or("");
    let psalm_id = number_after(summary, "salmo")
        .or_else(|| number_after(summary, "psalm"))
        .or_else(|| number_after(description, "salmo"))
        .or_else(|| number_after(description, "psalm"))
        .or_else(|| number_after(description, "psa."))
        .filter(|id| *id > 0)
        .ok_or_else(|| {
            PersistenceError::InvalidData(format!(
                "unable to read a psalm number from ICS event on {date_read}"
            ))
        })?;

    Ok(Some(ExportRecord {
        id: Uuid::nil(),
        psalm_id,
        date_read,
        rule_applied: None,
    }))
}

/// First integer following `keyword` (ASCII case-insensitive) in `text`.
fn number_after(text: &str, keyword: &str) -> Option<i32> {
    let lower = text.to_ascii_lowercase();
    let mut offset = 0;
    while let Some(found) = lower[offset..].find(keyword) {
        let rest = lower[offset + found + keyword.len()..].trim_start();
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if let Ok(value) = digits.parse() {
            return Some(value);
        }
        offset += found + keyword.len();
    }
    None
}

fn escape_text(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}

fn unescape_text(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            output.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => output.push('\n'),
            Some(other) => output.push(other),
            None => output.push('\\'),
        }
    }
    output
}

/// Splits a content line into chunks of at most 75 octets, never inside a
/// UTF-8 sequence. Continuation lines start with a single space.
fn fold_line(line: &str) -> String {
    let mut folded = String::with_capacity(line.len() + line.len() / ICS_LINE_OCTETS * 3);
    let mut width = 0;
    let mut limit = ICS_LINE_OCTETS;
    for c in line.chars() {
        let len = c.len_utf8();
        if width + len > limit {
            folded.push_str("\r\n ");
            width = 0;
            limit = ICS_LINE_OCTETS - 1;
        }
        folded.push(c);
        width += len;
    }
    folded
}

fn unfold_lines(ics: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in ics.lines() {
        let raw = raw.trim_end_matches('\r');
        if let Some(continuation) = raw.strip_prefix(' ').or_else(|| raw.strip_prefix('\t')) {
            if let Some(last) = lines.last_mut() {
                last.push_str(continuation);
                continue;
            }
        }
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            lines.push(trimmed.to_string());
        }
    }
    lines
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(input: &str) -> PersistenceResult<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), DATE_FORMAT)
        .map_err(|e| PersistenceError::InvalidData(format!("invalid date '{input}': {e}")))
}
