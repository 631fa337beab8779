//! Typed column reads. A value that does not decode is reported as a
//! corrupt row naming its table and column, never as a generic SQL error.

use std::fmt::Display;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::types::FromSql;
use rusqlite::Row;

use crate::error::StoreError;

fn corrupt(table: &'static str, column: &'static str, detail: impl Display) -> StoreError {
    StoreError::CorruptRow {
        table,
        column,
        detail: detail.to_string(),
    }
}

pub fn get<T: FromSql>(row: &Row<'_>, idx: usize, table: &'static str, column: &'static str) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| corrupt(table, column, e))
}

/// Nullable column.
pub fn get_opt<T: FromSql>(
    row: &Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<Option<T>, StoreError> {
    get(row, idx, table, column)
}

/// Denormalized counter; stored as INTEGER, never negative.
pub fn get_count(row: &Row<'_>, idx: usize, table: &'static str, column: &'static str) -> Result<u64, StoreError> {
    let n: i64 = get(row, idx, table, column)?;
    u64::try_from(n).map_err(|_| corrupt(table, column, format!("negative counter: {n}")))
}

/// JSON array of strings, as the tag columns are stored.
pub fn parse_string_list(raw: &str, table: &'static str, column: &'static str) -> Result<Vec<String>, StoreError> {
    serde_json::from_str(raw).map_err(|e| corrupt(table, column, format!("invalid JSON: {e}")))
}

/// Text column holding an enum token (`ExamId`, `Difficulty`, ...).
pub fn parse_enum<T: std::str::FromStr>(raw: &str, table: &'static str, column: &'static str) -> Result<T, StoreError> {
    raw.parse()
        .map_err(|_| corrupt(table, column, format!("unknown variant: {raw}")))
}

/// Escape LIKE special characters for safe pattern matching.
pub fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Timestamp format shared by every table; sorts lexicographically.
pub fn now() -> String {
    format_ts(Utc::now())
}

/// `now() + ttl`, in the same format, for expiry columns.
pub fn expires_in(ttl: Duration) -> String {
    format_ts(Utc::now() + ttl)
}

fn format_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
