use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use bakeplan_core::models::{AggregatedTotal, TagFilter, round_for_display};

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// Split a comma-separated flag value ("gluten, dairy") into its entries.
pub(crate) fn parse_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn tag_filter(allergens: Option<&str>, dietary: Option<&str>) -> TagFilter {
    TagFilter {
        allergen_tags: parse_list(allergens),
        dietary_tags: parse_list(dietary),
    }
}

/// Quantity as shown to a user: at most three decimals, no trailing zeros.
pub(crate) fn format_qty(v: f64) -> String {
    format!("{}", round_for_display(v))
}

pub(crate) fn print_totals_table(totals: &[AggregatedTotal]) {
    #[derive(Tabled)]
    struct TotalRow {
        #[tabled(rename = "Ingredient")]
        name: String,
        #[tabled(rename = "Total")]
        total: String,
        #[tabled(rename = "Unit")]
        unit: String,
        #[tabled(rename = "Missing lines")]
        missing: usize,
    }

    let rows: Vec<TotalRow> = totals
        .iter()
        .map(|t| TotalRow {
            name: truncate(&t.ingredient_name, 35),
            total: format_qty(t.total_qty),
            unit: t.canonical_unit.clone(),
            missing: t.missing_line_count,
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(1)).with(Alignment::right()))
        .with(Modify::new(Columns::single(3)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    let missing: usize = totals.iter().map(|t| t.missing_line_count).sum();
    if missing > 0 {
        eprintln!(
            "{missing} line(s) had no conversion and are not counted. See: bakeplan conversion missing"
        );
    }
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

/// Report a missing record and exit with status 2.
pub(crate) fn exit_not_found(message: &str, json: bool) -> ! {
    if json {
        println!("{}", json_error(message));
    } else {
        eprintln!("{message}");
    }
    process::exit(2);
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max.saturating_sub(3)).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
