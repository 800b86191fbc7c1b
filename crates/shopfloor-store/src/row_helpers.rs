use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::StoreError;

/// Get a required column value from a row, returning CorruptRow on failure.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Get an optional column value.
pub fn get_opt<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<Option<T>, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Canonical text form for stored timestamps. Fixed width and UTC, so the
/// column sorts chronologically under plain string comparison.
pub fn ts(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn ts_opt(value: Option<&DateTime<Utc>>) -> Option<String> {
    value.map(ts)
}

/// Parse a timestamp column, returning CorruptRow on parse failure.
pub fn parse_ts(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRow {
            table,
            column,
            detail: format!("invalid timestamp {raw:?}: {e}"),
        })
}

/// Read a required timestamp column.
pub fn get_ts(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<DateTime<Utc>, StoreError> {
    let raw: String = get(row, idx, table, column)?;
    parse_ts(&raw, table, column)
}

/// Read a nullable timestamp column.
pub fn get_opt_ts(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    get_opt::<String>(row, idx, table, column)?
        .map(|raw| parse_ts(&raw, table, column))
        .transpose()
}

/// Parse a string into an enum, returning CorruptRow on failure.
pub fn parse_enum<T: std::str::FromStr>(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    raw.parse().map_err(|_| StoreError::CorruptRow {
        table,
        column,
        detail: format!("unknown variant: {raw}"),
    })
}

/// Escape LIKE special characters for safe pattern matching.
pub fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use shopfloor_core::{DeviationKind, Role};

    #[test]
    fn escape_like_special_chars() {
        assert_eq!(escape_like("hello"), "hello");
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("foo_bar"), "foo\\_bar");
        assert_eq!(escape_like("back\\slash"), "back\\\\slash");
    }

    #[test]
    fn timestamps_sort_as_text() {
        let early = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 11, 2, 3, 4, 5).unwrap();
        assert!(ts(&early) < ts(&late));
        assert_eq!(ts(&early), "2024-01-02T03:04:05.000000Z");
    }

    #[test]
    fn parse_ts_accepts_offsets() {
        let parsed = parse_ts("2024-01-02T05:04:05+02:00", "operations", "actual_start").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
    }

    #[test]
    fn parse_ts_failure_is_corrupt_row() {
        let result = parse_ts("yesterday", "operations", "predict_end");
        assert!(matches!(
            result,
            Err(StoreError::CorruptRow { table: "operations", column: "predict_end", .. })
        ));
    }

    #[test]
    fn parse_enum_success_and_failure() {
        let role: Role = parse_enum("master", "users", "role").unwrap();
        assert_eq!(role, Role::Master);

        let result: Result<DeviationKind, _> = parse_enum("INVALID", "deviations", "kind");
        assert!(matches!(
            result,
            Err(StoreError::CorruptRow { table: "deviations", column: "kind", .. })
        ));
    }
}
