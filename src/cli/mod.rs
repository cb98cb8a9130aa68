//! CLI module for seatgrab - command-line interface and subcommands.
//!
//! Provides the parsed command line plus parsing of the wall-clock start
//! time accepted by `run --at`.

pub mod commands;

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use eyre::{Result, eyre};

pub use commands::Cli;

const TIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parse a local wall-clock time in the given offset.
pub fn parse_start_time(input: &str, offset: FixedOffset) -> Result<DateTime<FixedOffset>> {
    let input = input.trim();
    let naive = TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(input, format).ok())
        .ok_or_else(|| eyre!("Invalid start time '{}', expected YYYY-MM-DD HH:MM[:SS]", input))?;

    naive
        .and_local_timezone(offset)
        .single()
        .ok_or_else(|| eyre!("Ambiguous start time '{}'", input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Timelike, Utc};

    fn offset(hours: i32) -> FixedOffset {
        FixedOffset::east_opt(hours * 3600).unwrap()
    }

    #[test]
    fn test_parse_with_seconds() {
        let at = parse_start_time("2026-09-01 12:30:15", offset(8)).unwrap();
        assert_eq!(at.hour(), 12);
        assert_eq!(at.second(), 15);
        assert_eq!(at.with_timezone(&Utc).hour(), 4);
    }

    #[test]
    fn test_parse_without_seconds() {
        let at = parse_start_time(" 2026-09-01 08:00 ", offset(0)).unwrap();
        assert_eq!(at.minute(), 0);
        assert_eq!(at.second(), 0);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_start_time("tomorrow noon", offset(8)).is_err());
        assert!(parse_start_time("2026-13-01 08:00", offset(8)).is_err());
    }
}
