use std::fs::{self, File};
use std::io::{self, Write};

use chrono::{Local, NaiveDate, Utc};
use polars::prelude::*;
use psalm_schedule::persistence::{
    ImportMode, ReadingExport, load_readings_from_json, open_store, parse_date, parse_ics_readings,
    save_readings_to_json,
};
use psalm_schedule::service::validate_months;
use psalm_schedule::{
    AppConfig, ExportRange, PlannedReading, Psalm, ReadingRecord, ReadingService, ReadingStore,
    SchedulerConfig, StatsRange,
};
use uuid::Uuid;

type Service = ReadingService<Box<dyn ReadingStore>>;

fn render_df_as_text_table(df: &DataFrame) -> String {
    let columns = df.get_columns();
    let col_names: Vec<String> = columns.iter().map(|c| c.name().to_string()).collect();

    let cell = |col: &Column, row_idx: usize| -> String {
        match col.get(row_idx) {
            Ok(AnyValue::Null) | Err(_) => String::new(),
            Ok(AnyValue::String(s)) => s.to_string(),
            Ok(av) => av.to_string(),
        }
    };

    let mut widths: Vec<usize> = col_names.iter().map(|n| n.chars().count()).collect();
    for (ci, col) in columns.iter().enumerate() {
        for row_idx in 0..df.height() {
            widths[ci] = widths[ci].max(cell(col, row_idx).chars().count());
        }
    }

    let mut sep = String::from("+");
    for w in &widths {
        sep.push_str(&"-".repeat(*w + 2));
        sep.push('+');
    }

    let push_row = |out: &mut String, values: &[String]| {
        out.push('|');
        for (i, value) in values.iter().enumerate() {
            out.push(' ');
            out.push_str(value);
            out.push_str(&" ".repeat(widths[i].saturating_sub(value.chars().count())));
            out.push_str(" |");
        }
        out.push('\n');
    };

    let mut out = String::new();
    out.push_str(&sep);
    out.push('\n');
    push_row(&mut out, &col_names);
    out.push_str(&sep);
    out.push('\n');
    for row_idx in 0..df.height() {
        let values: Vec<String> = columns.iter().map(|col| cell(col, row_idx)).collect();
        push_row(&mut out, &values);
    }
    out.push_str(&sep);
    out.push('\n');
    out
}

fn text_column(name: &'static str, values: Vec<String>) -> Column {
    Series::new(PlSmallStr::from_static(name), values).into_column()
}

fn psalms_table(psalms: &[Psalm], service: &Service) -> PolarsResult<DataFrame> {
    let filter = service.eligibility();
    DataFrame::new(vec![
        Series::new(
            PlSmallStr::from_static("id"),
            psalms.iter().map(|p| p.id).collect::<Vec<_>>(),
        )
        .into_column(),
        text_column("title", psalms.iter().map(|p| p.title.clone()).collect()),
        Series::new(
            PlSmallStr::from_static("verses"),
            psalms.iter().map(|p| p.total_verses).collect::<Vec<_>>(),
        )
        .into_column(),
        text_column(
            "type",
            psalms.iter().map(|p| p.psalm_type.clone().unwrap_or_default()).collect(),
        ),
        text_column(
            "readable",
            psalms
                .iter()
                .map(|p| if filter.is_readable(p) { "yes" } else { "no" }.to_string())
                .collect(),
        ),
    ])
}

fn readings_table(readings: &[ReadingRecord]) -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        text_column("id", readings.iter().map(|r| r.id.to_string()).collect()),
        text_column("date", readings.iter().map(|r| r.date_read.to_string()).collect()),
        Series::new(
            PlSmallStr::from_static("psalm"),
            readings.iter().map(|r| r.psalm_id).collect::<Vec<_>>(),
        )
        .into_column(),
        text_column(
            "rule",
            readings.iter().map(|r| r.rule_applied.clone().unwrap_or_default()).collect(),
        ),
    ])
}

fn plan_table(plan: &[PlannedReading], psalms: &[Psalm]) -> PolarsResult<DataFrame> {
    let title = |id: i32| {
        psalms
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.title.clone())
            .unwrap_or_default()
    };
    DataFrame::new(vec![
        text_column("date", plan.iter().map(|r| r.scheduled_date.to_string()).collect()),
        Series::new(
            PlSmallStr::from_static("psalm"),
            plan.iter().map(|r| r.psalm_id).collect::<Vec<_>>(),
        )
        .into_column(),
        text_column("title", plan.iter().map(|r| title(r.psalm_id)).collect()),
        text_column("rule", plan.iter().map(|r| r.rule_applied.clone()).collect()),
    ])
}

fn print_table(table: PolarsResult<DataFrame>) {
    match table {
        Ok(df) => println!("{}", render_df_as_text_table(&df)),
        Err(e) => println!("Error: {}", e),
    }
}

fn print_help() {
    println!(
        "Commands:\n  help                                     Show this help\n  load <csv_path>                          Replace the psalm catalog from CSV\n  psalms                                   List the catalog\n  readings [from] [to]                     List stored readings (YYYY-MM-DD)\n  add <psalm_id> <YYYY-MM-DD>              Record a reading\n  delete <reading_id>                      Delete a reading\n  plan <YYYY-MM-DD> <months> [seed]        Preview a schedule (months: 1,2,3,6,12)\n  commit <YYYY-MM-DD> <months> [seed]      Generate and store a schedule\n  ics <YYYY-MM-DD> <months> <path> [seed]  Write a schedule preview as iCalendar\n  export <path> [year]                     Write readings as JSON\n  preview <path>                           Show conflicts a JSON or ICS import would hit\n  import <path> [replace|ignore]           Import readings from JSON or ICS\n  stats [year]                             Coverage by psalm type\n  config show                              Print scheduler settings\n  config load <json_path>                  Load scheduler settings\n  config save <json_path>                  Save scheduler settings\n  quit|exit                                Exit"
    );
}

fn read_import(path: &str) -> Result<ReadingExport, Box<dyn std::error::Error>> {
    if path.to_ascii_lowercase().ends_with(".ics") {
        let ics = fs::read_to_string(path)?;
        Ok(parse_ics_readings(&ics)?)
    } else {
        Ok(load_readings_from_json(path)?)
    }
}

fn parse_plan_args<'a, I>(mut parts: I) -> Option<Result<(NaiveDate, i32, Option<u64>), String>>
where
    I: Iterator<Item = &'a str>,
{
    let (start_s, months_s) = (parts.next()?, parts.next()?);
    let start = match parse_date(start_s) {
        Ok(d) => d,
        Err(_) => return Some(Err("Invalid date (YYYY-MM-DD)".to_string())),
    };
    let months: i32 = match months_s.parse() {
        Ok(v) => v,
        Err(_) => return Some(Err("Invalid months".to_string())),
    };
    if let Err(e) = validate_months(months) {
        return Some(Err(format!("Error: {}", e)));
    }
    let seed = match parts.next().map(str::parse::<u64>) {
        None => None,
        Some(Ok(v)) => Some(v),
        Some(Err(_)) => return Some(Err("Invalid seed".to_string())),
    };
    Some(Ok((start, months, seed)))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let config = AppConfig::from_env();
    let store = open_store(config.database_path.as_deref())?;
    let mut service = ReadingService::new(store, config.load_scheduler_config()?);
    if let Some(path) = &config.catalog_csv {
        service.seed_catalog_csv(File::open(path)?)?;
    }

    println!("Psalm Schedule (CLI) - type 'help' for commands\n");

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        line.clear();
        match stdin.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let mut parts = input.split_whitespace();
        let cmd = parts.next().unwrap_or("");

        match cmd {
            "help" => print_help(),
            "quit" | "exit" => break,
            "load" => match parts.next() {
                Some(path) => {
                    let file = match File::open(path) {
                        Ok(f) => f,
                        Err(e) => {
                            println!("Error: {}", e);
                            continue;
                        }
                    };
                    match service.import_catalog_csv(file) {
                        Ok(count) => println!("Loaded {} psalms from {}.", count, path),
                        Err(e) => println!("Error: {}", e),
                    }
                }
                None => println!("Usage: load <csv_path>"),
            },
            "psalms" => match service.psalms() {
                Ok(psalms) => print_table(psalms_table(&psalms, &service)),
                Err(e) => println!("Error: {}", e),
            },
            "readings" => {
                let mut bounds = [None, None];
                let mut bad = false;
                for slot in bounds.iter_mut() {
                    if let Some(s) = parts.next() {
                        match parse_date(s) {
                            Ok(d) => *slot = Some(d),
                            Err(_) => bad = true,
                        }
                    }
                }
                if bad {
                    println!("Invalid date (YYYY-MM-DD)");
                    continue;
                }
                match service.readings(bounds[0], bounds[1]) {
                    Ok(readings) => print_table(readings_table(&readings)),
                    Err(e) => println!("Error: {}", e),
                }
            }
            "add" => match (parts.next(), parts.next()) {
                (Some(id_s), Some(date_s)) => {
                    let psalm_id: i32 = match id_s.parse() {
                        Ok(v) => v,
                        Err(_) => {
                            println!("Invalid psalm_id");
                            continue;
                        }
                    };
                    let date = match parse_date(date_s) {
                        Ok(d) => d,
                        Err(_) => {
                            println!("Invalid date (YYYY-MM-DD)");
                            continue;
                        }
                    };
                    match service.add_reading(psalm_id, date, None) {
                        Ok(record) => println!("Added reading {} (psalm {} on {}).", record.id, psalm_id, date),
                        Err(e) => println!("Error: {}", e),
                    }
                }
                _ => println!("Usage: add <psalm_id> <YYYY-MM-DD>"),
            },
            "delete" => match parts.next() {
                Some(id_s) => {
                    let id = match Uuid::parse_str(id_s) {
                        Ok(v) => v,
                        Err(_) => {
                            println!("Invalid reading id");
                            continue;
                        }
                    };
                    match service.delete_reading(id) {
                        Ok(()) => println!("Deleted reading {}.", id),
                        Err(e) => println!("Error: {}", e),
                    }
                }
                None => println!("Usage: delete <reading_id>"),
            },
            "plan" | "commit" => {
                let (start, months, seed) = match parse_plan_args(&mut parts) {
                    Some(Ok(args)) => args,
                    Some(Err(message)) => {
                        println!("{}", message);
                        continue;
                    }
                    None => {
                        println!("Usage: {} <YYYY-MM-DD> <months> [seed]", cmd);
                        continue;
                    }
                };
                let result = if cmd == "plan" {
                    service.preview_schedule(start, months, seed)
                } else {
                    service.commit_schedule(start, months, seed)
                };
                match (result, service.psalms()) {
                    (Ok(plan), Ok(psalms)) => {
                        let verb = if cmd == "plan" { "Planned" } else { "Committed" };
                        println!("{} {} Sundays.", verb, plan.len());
                        print_table(plan_table(&plan, &psalms));
                    }
                    (Err(e), _) => println!("Error: {}", e),
                    (_, Err(e)) => println!("Error: {}", e),
                }
            }
            "ics" => {
                let (start_s, months_s, path, seed_s) =
                    (parts.next(), parts.next(), parts.next(), parts.next());
                let (Some(start_s), Some(months_s), Some(path)) = (start_s, months_s, path) else {
                    println!("Usage: ics <YYYY-MM-DD> <months> <path> [seed]");
                    continue;
                };
                let args = [Some(start_s), Some(months_s), seed_s];
                let (start, months, seed) = match parse_plan_args(args.into_iter().flatten()) {
                    Some(Ok(args)) => args,
                    Some(Err(message)) => {
                        println!("{}", message);
                        continue;
                    }
                    None => continue,
                };
                match service.schedule_ics(start, months, seed, Utc::now()) {
                    Ok(ics) if ics.is_empty() => println!("Nothing to export."),
                    Ok(ics) => match fs::write(path, ics) {
                        Ok(()) => println!("Calendar written to {}", path),
                        Err(e) => println!("Error: {}", e),
                    },
                    Err(e) => println!("Error: {}", e),
                }
            }
            "export" => match parts.next() {
                Some(path) => {
                    let range = match parts.next() {
                        None => ExportRange::All,
                        Some(year_s) => match year_s.parse() {
                            Ok(year) => ExportRange::Year(year),
                            Err(_) => {
                                println!("Invalid year");
                                continue;
                            }
                        },
                    };
                    let saved = service
                        .export(range, Utc::now())
                        .map_err(|e| e.to_string())
                        .and_then(|export| {
                            save_readings_to_json(&export, path)
                                .map(|()| export.records.len())
                                .map_err(|e| e.to_string())
                        });
                    match saved {
                        Ok(count) => println!("Exported {} readings to {}", count, path),
                        Err(e) => println!("Error: {}", e),
                    }
                }
                None => println!("Usage: export <path> [year]"),
            },
            "preview" => match parts.next() {
                Some(path) => {
                    let preview = read_import(path)
                        .and_then(|export| Ok(service.preview_import(&export)?));
                    match preview {
                        Ok(p) => {
                            println!("{} records, {} conflicting dates", p.total_records, p.conflict_count);
                            for date in p.conflict_dates {
                                println!("  {}", date);
                            }
                        }
                        Err(e) => println!("Error: {}", e),
                    }
                }
                None => println!("Usage: preview <path>"),
            },
            "import" => match parts.next() {
                Some(path) => {
                    let mode = match parts.next() {
                        None => ImportMode::ReplaceConflicts,
                        Some(s) => match ImportMode::parse(s) {
                            Some(mode) => mode,
                            None => {
                                println!("Invalid mode (replace|ignore)");
                                continue;
                            }
                        },
                    };
                    let result = read_import(path).and_then(|export| Ok(service.import(&export, mode)?));
                    match result {
                        Ok(r) => println!(
                            "Imported {} readings, skipped {}, replaced {} dates.",
                            r.imported, r.skipped, r.replaced_dates
                        ),
                        Err(e) => println!("Error: {}", e),
                    }
                }
                None => println!("Usage: import <path> [replace|ignore]"),
            },
            "stats" => {
                let range = match parts.next() {
                    None => StatsRange::All,
                    Some(year_s) => match year_s.parse() {
                        Ok(year) => StatsRange::Year { year },
                        Err(_) => {
                            println!("Invalid year");
                            continue;
                        }
                    },
                };
                match service.stats(range, Local::now().date_naive()) {
                    Ok(stats) => {
                        println!(
                            "Readable: {}  covered: {}  projected: {}  readings: {} done / {} planned",
                            stats.total_readable,
                            stats.actual_covered,
                            stats.projected_covered,
                            stats.actual_readings,
                            stats.planned_readings
                        );
                        let rows = &stats.by_type;
                        let count = |f: fn(&psalm_schedule::TypeStats) -> usize| {
                            rows.iter().map(|t| f(t) as u64).collect::<Vec<_>>()
                        };
                        print_table(DataFrame::new(vec![
                            text_column("type", rows.iter().map(|t| t.type_key.clone()).collect()),
                            Series::new(PlSmallStr::from_static("readable"), count(|t| t.total_readable)).into_column(),
                            Series::new(PlSmallStr::from_static("covered"), count(|t| t.actual_covered)).into_column(),
                            Series::new(PlSmallStr::from_static("projected"), count(|t| t.projected_covered)).into_column(),
                        ]));
                    }
                    Err(e) => println!("Error: {}", e),
                }
            }
            "config" => match (parts.next(), parts.next()) {
                (Some("show"), _) => match serde_json::to_string_pretty(service.config()) {
                    Ok(json) => println!("{}", json),
                    Err(e) => println!("Error: {}", e),
                },
                (Some("load"), Some(path)) => match SchedulerConfig::load_json(path) {
                    Ok(loaded) => {
                        service.set_config(loaded);
                        println!("Scheduler settings loaded from {}", path);
                    }
                    Err(e) => println!("Error: {}", e),
                },
                (Some("save"), Some(path)) => match service.config().save_json(path) {
                    Ok(()) => println!("Scheduler settings saved to {}", path),
                    Err(e) => println!("Error: {}", e),
                },
                _ => println!("Usage: config show | config load <json_path> | config save <json_path>"),
            },
            _ => {
                println!("Unknown command. Type 'help'.");
            }
        }
    }
    Ok(())
}
