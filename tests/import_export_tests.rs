use chrono::{NaiveDate, TimeZone, Utc};
use psalm_schedule::persistence::{
    ExportRecord, load_psalms_from_csv, load_readings_from_json, parse_ics_readings,
    parse_psalms_csv, plan_to_ics, save_readings_to_json,
};
use psalm_schedule::{
    ExportRange, ImportMode, MemoryReadingStore, PersistenceError, PlannedReading, Psalm,
    ReadingExport, ReadingHistory, ReadingService, SchedulerConfig, ServiceError,
};
use std::io::Write;
use tempfile::NamedTempFile;
use uuid::Uuid;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn catalog() -> Vec<Psalm> {
    vec![
        Psalm::new(1, "Los dos caminos", 6, Some("sabiduria"), [""; 0], [""; 0]).unwrap(),
        Psalm::new(8, "La gloria de Dios", 9, Some("alabanza"), [""; 0], [""; 0]).unwrap(),
        Psalm::new(23, "El buen pastor", 6, None, [""; 0], [""; 0]).unwrap(),
    ]
}

fn service() -> ReadingService<MemoryReadingStore> {
    let store = MemoryReadingStore::with_psalms(catalog()).unwrap();
    ReadingService::new(store, SchedulerConfig::default())
}

fn export_of(records: Vec<(i32, NaiveDate, Option<&str>)>) -> ReadingExport {
    ReadingExport {
        schema_version: 1,
        exported_at: Utc.with_ymd_and_hms(2025, 2, 1, 12, 0, 0).unwrap(),
        range: "all".into(),
        year: None,
        records: records
            .into_iter()
            .map(|(psalm_id, date_read, rule)| ExportRecord {
                id: Uuid::nil(),
                psalm_id,
                date_read,
                rule_applied: rule.map(str::to_string),
            })
            .collect(),
    }
}

#[test]
fn csv_catalog_loads_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "Capitulo,Titulo,Total_Verses,Tipo,Epigrafes,Temas\n\
         1,Los dos caminos,6,Sabiduria,,\n\
         100,Canto de alabanza,5,alabanza,\"Salmo de acción de gracias\",\"Días festivos: Agradecimiento, gozo\"\n\
         119,La ley del Señor,176,sabiduria,,"
    )
    .unwrap();

    let psalms = load_psalms_from_csv(file.path()).unwrap();
    assert_eq!(psalms.len(), 3);
    assert_eq!(psalms[0].type_key().as_deref(), Some("sabiduria"));
    assert!(psalms[0].themes.is_empty());
    assert_eq!(psalms[1].themes.len(), 2);
    assert!(psalms[1].has_theme("dias festivos: agradecimiento"));
    assert_eq!(psalms[2].total_verses, 176);
}

#[test]
fn csv_without_required_column_is_rejected() {
    let err = parse_psalms_csv("capitulo,titulo\n1,Uno\n".as_bytes()).unwrap_err();
    assert!(err.to_string().contains("total_verses"), "{err}");
}

#[test]
fn csv_errors_name_the_row() {
    let input = "capitulo,titulo,total_verses\n1,Uno,6\n2,Dos,many\n";
    let err = parse_psalms_csv(input.as_bytes()).unwrap_err();
    assert!(matches!(err, PersistenceError::InvalidData(_)));
    assert!(err.to_string().contains("row 3"), "{err}");

    let duplicate = "capitulo,titulo,total_verses\n1,Uno,6\n1,Otra vez,6\n";
    assert!(parse_psalms_csv(duplicate.as_bytes()).is_err());
}

#[test]
fn json_export_moves_readings_between_stores() {
    let source = service();
    source.add_reading(1, d(2024, 12, 29), None).unwrap();
    source.add_reading(8, d(2025, 1, 5), Some("First Sunday new year")).unwrap();
    source.add_reading(23, d(2025, 1, 12), None).unwrap();

    let export = source
        .export(ExportRange::Year(2025), Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap())
        .unwrap();
    assert_eq!(export.range, "year");
    assert_eq!(export.year, Some(2025));
    assert_eq!(export.records.len(), 2);

    let file = NamedTempFile::new().unwrap();
    save_readings_to_json(&export, file.path()).unwrap();
    let loaded = load_readings_from_json(file.path()).unwrap();
    assert_eq!(loaded, export);

    let target = service();
    let result = target.import(&loaded, ImportMode::ReplaceConflicts).unwrap();
    assert_eq!(result.imported, 2);
    assert_eq!(result.skipped, 0);

    let stored = target.readings(None, None).unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].rule_applied.as_deref(), Some("First Sunday new year"));
}

#[test]
fn replace_mode_clears_conflicting_dates() {
    let service = service();
    service.add_reading(1, d(2025, 1, 5), None).unwrap();
    service.add_reading(23, d(2025, 1, 19), None).unwrap();

    let export = export_of(vec![
        (8, d(2025, 1, 5), None),
        (23, d(2025, 1, 12), Some("first")),
        (23, d(2025, 1, 12), Some("second")),
    ]);

    let preview = service.preview_import(&export).unwrap();
    assert_eq!(preview.total_records, 2);
    assert_eq!(preview.conflict_dates, vec![d(2025, 1, 5)]);

    let result = service.import(&export, ImportMode::ReplaceConflicts).unwrap();
    assert_eq!((result.imported, result.skipped, result.replaced_dates), (2, 0, 1));

    let stored = service.readings(None, None).unwrap();
    let on_fifth: Vec<i32> = stored
        .iter()
        .filter(|r| r.date_read == d(2025, 1, 5))
        .map(|r| r.psalm_id)
        .collect();
    assert_eq!(on_fifth, vec![8]);
    let twelfth = stored.iter().find(|r| r.date_read == d(2025, 1, 12)).unwrap();
    assert_eq!(twelfth.rule_applied.as_deref(), Some("second"));
    assert!(stored.iter().any(|r| r.date_read == d(2025, 1, 19)));
}

#[test]
fn ignore_mode_skips_conflicting_records() {
    let service = service();
    service.add_reading(1, d(2025, 1, 5), None).unwrap();

    let export = export_of(vec![(8, d(2025, 1, 5), None), (23, d(2025, 1, 12), None)]);
    let result = service.import(&export, ImportMode::IgnoreConflicts).unwrap();
    assert_eq!((result.imported, result.skipped, result.replaced_dates), (1, 1, 0));

    let stored = service.readings(Some(d(2025, 1, 5)), Some(d(2025, 1, 5))).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].psalm_id, 1);
}

#[test]
fn unsupported_schema_version_is_rejected() {
    let service = service();
    let mut export = export_of(vec![(8, d(2025, 1, 5), None)]);
    export.schema_version = 2;
    let err = service.import(&export, ImportMode::ReplaceConflicts).unwrap_err();
    assert!(matches!(err, ServiceError::Persistence(PersistenceError::InvalidData(_))));
    assert!(service.store().all_readings().unwrap().is_empty());

    let empty = export_of(Vec::new());
    let result = service.import(&empty, ImportMode::IgnoreConflicts).unwrap();
    assert_eq!(result.imported, 0);
}

#[test]
fn ics_feed_reads_back_as_readings() {
    let plan = vec![
        PlannedReading::new(Uuid::new_v4(), 8, d(2025, 6, 1), "First Sunday of worship").unwrap(),
        PlannedReading::new(Uuid::new_v4(), 23, d(2025, 6, 8), "General").unwrap(),
        PlannedReading::new(Uuid::new_v4(), 99, d(2025, 6, 15), "General").unwrap(),
    ];
    let stamp = Utc.with_ymd_and_hms(2025, 5, 20, 8, 30, 0).unwrap();
    let ics = plan_to_ics(&plan, &catalog(), stamp);

    assert!(ics.starts_with("BEGIN:VCALENDAR\r\n"));
    assert!(ics.ends_with("END:VCALENDAR\r\n"));
    assert!(ics.contains("DTSTART;VALUE=DATE:20250601\r\n"));
    assert!(ics.contains("DTEND;VALUE=DATE:20250602\r\n"));
    assert!(ics.contains("SUMMARY:Salmo 8 - La gloria de Dios\r\n"));
    assert!(ics.contains("DTSTAMP:20250520T083000Z"));
    assert_eq!(ics.matches("BEGIN:VEVENT").count(), 2);
    assert!(ics.lines().all(|line| line.len() <= 75));

    let export = parse_ics_readings(&ics).unwrap();
    let read_back: Vec<(i32, NaiveDate)> = export
        .records
        .iter()
        .map(|r| (r.psalm_id, r.date_read))
        .collect();
    assert_eq!(read_back, vec![(8, d(2025, 6, 1)), (23, d(2025, 6, 8))]);
}

#[test]
fn ics_without_events_is_rejected() {
    assert!(plan_to_ics(&[], &catalog(), Utc::now()).is_empty());
    assert!(parse_ics_readings("").is_err());
    assert!(parse_ics_readings("BEGIN:VCALENDAR\r\nEND:VCALENDAR\r\n").is_err());
}
