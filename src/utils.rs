/// Utility functions for timestamps and formatting
use time::{format_description, OffsetDateTime};

/// Format a timestamp for human-readable logging
///
/// Converts an OffsetDateTime to DD.MM.YYYY - HH:MM:SS format
/// Falls back to default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    match format_description::parse("[day].[month].[year] - [hour]:[minute]:[second]") {
        Ok(format) => dt.format(&format).unwrap_or_else(|_| dt.to_string()),
        Err(_) => dt.to_string(),
    }
}

/// Format a unix timestamp (seconds) for logging
pub fn format_timestamp(timestamp: i64) -> String {
    OffsetDateTime::from_unix_timestamp(timestamp)
        .map(|dt| format_datetime(&dt))
        .unwrap_or_else(|_| timestamp.to_string())
}

/// Current wall clock time as unix seconds
pub fn unix_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Default history file name, `data_YYYYMMDD_HHMMSS.csv` in local time
///
/// Uses UTC when the local offset cannot be determined.
pub fn default_data_file() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    data_file_name(&now)
}

fn data_file_name(dt: &OffsetDateTime) -> String {
    format_description::parse("data_[year][month][day]_[hour][minute][second].csv")
        .ok()
        .and_then(|format| dt.format(&format).ok())
        .unwrap_or_else(|| format!("data_{}.csv", dt.unix_timestamp()))
}
