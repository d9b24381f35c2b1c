//! Purpose: Derive the filtered, sorted view of a row set and format row fields for display.
//! Exports: `project`, `format_created_at`, `EMPTY_TIMESTAMP`.
//! Role: Pure projection pulled on every render; nothing here is cached.
//! Invariants: Output is ordered by lower-cased name, then id; equal keys keep input order.
//! Invariants: The input row set is never mutated.
use super::row::Row;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

pub const EMPTY_TIMESTAMP: &str = "—";

pub fn project(rows: &[Row], filter: &str) -> Vec<Row> {
    let needle = filter.to_lowercase();
    let mut view: Vec<Row> = rows
        .iter()
        .filter(|row| needle.is_empty() || row.name.to_lowercase().contains(&needle))
        .cloned()
        .collect();
    view.sort_by_cached_key(|row| (row.name.to_lowercase(), row.id.clone()));
    view
}

pub fn format_created_at(value: Option<&str>) -> String {
    let Some(raw) = value.filter(|raw| !raw.is_empty()) else {
        return EMPTY_TIMESTAMP.to_string();
    };
    let human = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    OffsetDateTime::parse(raw, &Rfc3339)
        .ok()
        .and_then(|ts| ts.format(&human).ok())
        .unwrap_or_else(|| raw.to_string())
}
