//! `plantwatch history`: browse stored readings over whole calendar days.

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use plantwatch_core::{
    DisplayRange, HistoryQuery, HttpPlantApi, MetricRecord, PlantConfig, estimate_range,
    normalize_series,
};

use super::{SECTIONS, fmt_value, report_error};

#[derive(Serialize)]
struct HistoryReport<'a> {
    from: String,
    to: String,
    limit: usize,
    count: usize,
    ranges: BTreeMap<&'static str, DisplayRange>,
    records: &'a [MetricRecord],
}

/// Run the history command.
pub fn run(
    config: &PlantConfig,
    token: Option<String>,
    from: Option<&str>,
    to: Option<&str>,
    limit: usize,
    output: Option<&str>,
) {
    let (from, to) = match resolve_days(from, to, Utc::now().date_naive()) {
        Ok(days) => days,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    let query = HistoryQuery::for_days(from, to, limit);
    let api = HttpPlantApi::new(config.base_url.clone(), token);

    let rt = super::runtime();
    let records = match rt.block_on(api.history(&query)) {
        Ok(records) => normalize_series(records),
        Err(e) => {
            report_error("fetching history", &e);
            std::process::exit(1);
        }
    };

    println!("History {from} .. {to} (limit {limit})");
    println!("  Records: {}", records.len());
    if let (Some(first), Some(last)) = (records.first(), records.last()) {
        println!("  Span:    {} .. {}", first.ts.to_rfc3339(), last.ts.to_rfc3339());
    }
    println!();

    let ranges = chart_ranges(&records);
    for section in SECTIONS {
        println!("  {}", section.title);
        for m in section.metrics {
            match ranges.get(m.key) {
                Some(r) => println!(
                    "    {:<14} {:>10} .. {:<10} {}",
                    m.label,
                    fmt_value(Some(r.min), 1),
                    fmt_value(Some(r.max), 1),
                    m.unit
                ),
                None => println!("    {:<14} {:>10}", m.label, "—"),
            }
        }
    }

    if let Some(path) = output {
        let report = HistoryReport {
            from: query.from.to_rfc3339(),
            to: query.to.to_rfc3339(),
            limit,
            count: records.len(),
            ranges,
            records: &records,
        };
        match serde_json::to_string_pretty(&report) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    eprintln!("Error writing {path}: {e}");
                    std::process::exit(1);
                }
                println!("\nWrote {path}");
            }
            Err(e) => {
                eprintln!("Error serializing report: {e}");
                std::process::exit(1);
            }
        }
    }
}

/// Display range for every charted metric present in `records`.
fn chart_ranges(records: &[MetricRecord]) -> BTreeMap<&'static str, DisplayRange> {
    SECTIONS
        .iter()
        .flat_map(|s| s.metrics.iter())
        .filter_map(|m| estimate_range(records, m.key).map(|r| (m.key, r)))
        .collect()
}

/// Parse `--from` / `--to`; defaults are yesterday and today.
fn resolve_days(
    from: Option<&str>,
    to: Option<&str>,
    today: NaiveDate,
) -> Result<(NaiveDate, NaiveDate), String> {
    let parse = |s: &str| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|e| format!("invalid date {s:?} (expected YYYY-MM-DD): {e}"))
    };
    let to = to.map(parse).transpose()?.unwrap_or(today);
    let from = match from {
        Some(s) => parse(s)?,
        None => today.pred_opt().unwrap_or(today),
    };
    if from > to {
        return Err(format!("--from {from} is after --to {to}"));
    }
    Ok((from, to))
}
